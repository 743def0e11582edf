//! Anonymous sessions, uploaded images and recorded user audio.
//!
//! Sessions are identified by a UUID and authenticated with an opaque token
//! that is only kept as a SHA-256 hash. Uploads and audio clips belong to the
//! session that created them and expire on their own TTL.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use curio_core::auth::{digests_match, generate_session_token, hash_token};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::ingest::{
    ALLOWED_AUDIO_TYPES, ALLOWED_IMAGE_TYPES, IngestError, MalwareScanner, preprocess_image,
    validate_mime_type, validate_size,
};
use crate::store::SharedStore;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub upload_id: Uuid,
    pub session_id: String,
    pub file_path: PathBuf,
    pub mime_type: String,
    pub original_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UserAudioRecord {
    pub audio_ref: String,
    pub session_id: String,
    pub file_path: PathBuf,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Returned once at creation. The plain token is never stored.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: String,
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub file_path: PathBuf,
    pub mime_type: String,
    pub session_id: String,
    pub original_name: Option<String>,
}

#[derive(Debug, Clone)]
struct Limits {
    session_ttl: chrono::Duration,
    upload_ttl: chrono::Duration,
    max_upload_bytes: usize,
    max_audio_bytes: usize,
    max_image_dimension: u32,
}

pub struct SessionStore {
    sessions: SharedStore<SessionRecord>,
    uploads: SharedStore<UploadRecord>,
    user_audio: SharedStore<UserAudioRecord>,
    scanner: Arc<dyn MalwareScanner>,
    uploads_dir: PathBuf,
    user_audio_dir: PathBuf,
    limits: Limits,
}

impl SessionStore {
    pub fn new(
        config: &AppConfig,
        sessions: SharedStore<SessionRecord>,
        uploads: SharedStore<UploadRecord>,
        user_audio: SharedStore<UserAudioRecord>,
        scanner: Arc<dyn MalwareScanner>,
    ) -> Self {
        Self {
            sessions,
            uploads,
            user_audio,
            scanner,
            uploads_dir: config.uploads_dir(),
            user_audio_dir: config.data_dir.join("user_audio"),
            limits: Limits {
                session_ttl: config.session_ttl,
                upload_ttl: config.upload_ttl,
                max_upload_bytes: config.max_upload_bytes,
                max_audio_bytes: config.max_audio_bytes,
                max_image_dimension: config.max_image_dimension,
            },
        }
    }

    pub fn create_session(&self) -> IssuedSession {
        let session_id = Uuid::now_v7().to_string();
        let (session_token, token_hash) = generate_session_token();
        let now = Utc::now();
        let expires_at = now + self.limits.session_ttl;
        self.sessions.put(
            &session_id,
            SessionRecord {
                session_id: session_id.clone(),
                token_hash,
                created_at: now,
                expires_at,
            },
        );
        tracing::info!(session_id = %session_id, "session created");
        IssuedSession {
            session_id,
            session_token,
            expires_at,
        }
    }

    /// `None` for unknown, expired or wrong-token sessions.
    pub fn validate_session(&self, session_id: &str, token: &str) -> Option<SessionRecord> {
        let record = self.sessions.get(session_id)?;
        if record.expires_at <= Utc::now() {
            return None;
        }
        digests_match(&hash_token(token), &record.token_hash).then_some(record)
    }

    /// Validate, scan and normalize an uploaded image.
    pub async fn store_image(
        &self,
        session_id: &str,
        original_name: Option<String>,
        declared_mime: &str,
        bytes: &[u8],
    ) -> Result<UploadRecord, IngestError> {
        validate_mime_type(declared_mime, ALLOWED_IMAGE_TYPES)?;
        validate_size(bytes.len(), self.limits.max_upload_bytes)?;

        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        let upload_id = Uuid::now_v7();
        let raw_path = self.uploads_dir.join(format!("{upload_id}.upload"));
        tokio::fs::write(&raw_path, bytes).await?;

        let normalized = match self.scan_and_preprocess(&raw_path).await {
            Ok(path) => path,
            Err(err) => {
                remove_file_quietly(&raw_path).await;
                return Err(err);
            }
        };
        remove_file_quietly(&raw_path).await;

        let now = Utc::now();
        let record = UploadRecord {
            upload_id,
            session_id: session_id.to_string(),
            file_path: normalized,
            mime_type: "image/jpeg".to_string(),
            original_name,
            created_at: now,
            expires_at: now + self.limits.upload_ttl,
        };
        self.uploads.put(&upload_id.to_string(), record.clone());
        tracing::info!(upload_id = %upload_id, session_id = %session_id, "image upload stored");
        Ok(record)
    }

    async fn scan_and_preprocess(&self, raw_path: &Path) -> Result<PathBuf, IngestError> {
        self.scanner.scan(raw_path).await?;
        preprocess_image(raw_path, self.limits.max_image_dimension).await
    }

    /// Unexpired upload by id.
    pub fn resolve_image(&self, upload_id: &str) -> Option<ResolvedImage> {
        let record = self.uploads.get(upload_id)?;
        if record.expires_at <= Utc::now() {
            return None;
        }
        Some(ResolvedImage {
            file_path: record.file_path,
            mime_type: record.mime_type,
            session_id: record.session_id,
            original_name: record.original_name,
        })
    }

    pub async fn store_user_audio(
        &self,
        session_id: &str,
        declared_mime: &str,
        bytes: &[u8],
    ) -> Result<UserAudioRecord, IngestError> {
        let mime_type = validate_mime_type(declared_mime, ALLOWED_AUDIO_TYPES)?;
        validate_size(bytes.len(), self.limits.max_audio_bytes)?;

        tokio::fs::create_dir_all(&self.user_audio_dir).await?;
        let audio_ref = Uuid::now_v7().to_string();
        let file_path = self.user_audio_dir.join(format!("{audio_ref}.audio"));
        tokio::fs::write(&file_path, bytes).await?;
        if let Err(err) = self.scanner.scan(&file_path).await {
            remove_file_quietly(&file_path).await;
            return Err(err);
        }

        let now = Utc::now();
        let record = UserAudioRecord {
            audio_ref: audio_ref.clone(),
            session_id: session_id.to_string(),
            file_path,
            mime_type,
            created_at: now,
            expires_at: now + self.limits.upload_ttl,
        };
        self.user_audio.put(&audio_ref, record.clone());
        Ok(record)
    }

    pub fn resolve_user_audio(&self, audio_ref: &str) -> Option<UserAudioRecord> {
        self.user_audio
            .get(audio_ref)
            .filter(|record| record.expires_at > Utc::now())
    }

    /// Drop expired sessions, uploads and audio clips. Returns how many
    /// records were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let sessions = self.sessions.retain(&mut |record: &SessionRecord| record.expires_at > now);
        let uploads = self.uploads.retain(&mut |record: &UploadRecord| record.expires_at > now);
        let clips = self
            .user_audio
            .retain(&mut |record: &UserAudioRecord| record.expires_at > now);

        for path in uploads
            .iter()
            .map(|record| &record.file_path)
            .chain(clips.iter().map(|record| &record.file_path))
        {
            remove_file_quietly(path).await;
        }

        let removed = sessions.len() + uploads.len() + clips.len();
        if removed > 0 {
            tracing::info!(
                sessions = sessions.len(),
                uploads = uploads.len(),
                audio_clips = clips.len(),
                "expired records swept"
            );
        }
        removed
    }
}

pub(crate) async fn remove_file_quietly(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove file");
        }
    }
}
