//! Periodic cleanup of records that outlive their session.
//!
//! Session expiry drops the session, its uploads and its audio clips. The
//! sweep then removes analyses and conversations whose session is gone,
//! synthesized replies older than a session lifetime, expired fact packs
//! and incidents past the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use curio_core::analysis::AnalysisResult;
use curio_core::conversation::ConversationState;
use curio_core::moderation::IncidentItem;

use crate::config::AppConfig;
use crate::research::FactCacheEntry;
use crate::sessions::{SessionStore, remove_file_quietly};
use crate::store::Stores;
use crate::voice::AudioAsset;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions, uploads and user audio clips.
    pub session_records: usize,
    pub analyses: usize,
    pub conversations: usize,
    pub audio_assets: usize,
    pub fact_packs: usize,
    pub incidents: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.session_records
            + self.analyses
            + self.conversations
            + self.audio_assets
            + self.fact_packs
            + self.incidents
    }
}

pub struct RetentionSweeper {
    sessions: Arc<SessionStore>,
    stores: Stores,
    audio_ttl: chrono::Duration,
    incident_retention: chrono::Duration,
}

impl RetentionSweeper {
    pub fn new(config: &AppConfig, stores: Stores, sessions: Arc<SessionStore>) -> Self {
        Self {
            sessions,
            stores,
            audio_ttl: config.session_ttl,
            incident_retention: config.incident_retention,
        }
    }

    pub async fn sweep(&self) -> SweepReport {
        let now = Utc::now();
        let session_records = self.sessions.sweep_expired().await;

        let live_sessions = &self.stores.sessions;
        let analyses = self
            .stores
            .analyses
            .retain(&mut |record: &AnalysisResult| live_sessions.get(&record.session_id).is_some());
        let conversations = self
            .stores
            .conversations
            .retain(&mut |state: &ConversationState| live_sessions.get(&state.session_id).is_some());

        let audio_ttl = self.audio_ttl;
        let assets = self
            .stores
            .audio_assets
            .retain(&mut |asset: &AudioAsset| asset.created_at + audio_ttl > now);
        for asset in &assets {
            remove_file_quietly(&asset.path).await;
        }

        let fact_packs = self
            .stores
            .fact_cache
            .retain(&mut |entry: &FactCacheEntry| entry.expires_at > now);
        let incident_retention = self.incident_retention;
        let incidents = self
            .stores
            .incidents
            .retain(&mut |incident: &IncidentItem| incident.created_at + incident_retention > now);

        let report = SweepReport {
            session_records,
            analyses: analyses.len(),
            conversations: conversations.len(),
            audio_assets: assets.len(),
            fact_packs: fact_packs.len(),
            incidents: incidents.len(),
        };
        if report.total() > 0 {
            tracing::info!(
                session_records = report.session_records,
                analyses = report.analyses,
                conversations = report.conversations,
                audio_assets = report.audio_assets,
                fact_packs = report.fact_packs,
                incidents = report.incidents,
                "retention sweep"
            );
        }
        report
    }
}

/// Run the sweep on a fixed interval for the lifetime of the process.
pub fn spawn_sweeper(sweeper: Arc<RetentionSweeper>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweeper.sweep().await;
        }
    })
}
