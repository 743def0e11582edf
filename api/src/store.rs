//! Key-value store abstraction backing every shared table.
//!
//! Components receive `Arc<dyn KeyValueStore<V>>` handles instead of reaching
//! for global maps, so a durable backend can replace `MemoryStore` without
//! touching pipeline code.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use curio_core::analysis::AnalysisResult;
use curio_core::conversation::ConversationState;
use curio_core::moderation::IncidentItem;

use crate::research::FactCacheEntry;
use crate::sessions::{SessionRecord, UploadRecord, UserAudioRecord};
use crate::voice::AudioAsset;

pub trait KeyValueStore<V>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;

    fn put(&self, key: &str, value: V);

    fn remove(&self, key: &str) -> Option<V>;

    /// Apply `mutate` to the value under `key` while holding the store lock.
    /// Returns the updated value, or `None` when the key is absent.
    fn update(&self, key: &str, mutate: &mut dyn FnMut(&mut V)) -> Option<V>;

    fn values(&self) -> Vec<V>;

    /// Keep only entries for which `keep` returns true. Returns removed values.
    fn retain(&self, keep: &mut dyn FnMut(&V) -> bool) -> Vec<V>;
}

pub type SharedStore<V> = Arc<dyn KeyValueStore<V>>;

/// Process-local store. Contents are lost on restart.
pub struct MemoryStore<V> {
    entries: RwLock<HashMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync> KeyValueStore<V> for MemoryStore<V> {
    fn get(&self, key: &str) -> Option<V> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &str, value: V) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<V> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    fn update(&self, key: &str, mutate: &mut dyn FnMut(&mut V)) -> Option<V> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let value = entries.get_mut(key)?;
        mutate(value);
        Some(value.clone())
    }

    fn values(&self) -> Vec<V> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn retain(&self, keep: &mut dyn FnMut(&V) -> bool) -> Vec<V> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(_, value)| !keep(value))
            .map(|(key, _)| key.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| entries.remove(&key))
            .collect()
    }
}

/// Every table the service keeps, injected as one bundle.
#[derive(Clone)]
pub struct Stores {
    pub sessions: SharedStore<SessionRecord>,
    pub uploads: SharedStore<UploadRecord>,
    pub user_audio: SharedStore<UserAudioRecord>,
    pub fact_cache: SharedStore<FactCacheEntry>,
    pub analyses: SharedStore<AnalysisResult>,
    pub conversations: SharedStore<ConversationState>,
    pub incidents: SharedStore<IncidentItem>,
    pub audio_assets: SharedStore<AudioAsset>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            sessions: Arc::new(MemoryStore::new()),
            uploads: Arc::new(MemoryStore::new()),
            user_audio: Arc::new(MemoryStore::new()),
            fact_cache: Arc::new(MemoryStore::new()),
            analyses: Arc::new(MemoryStore::new()),
            conversations: Arc::new(MemoryStore::new()),
            incidents: Arc::new(MemoryStore::new()),
            audio_assets: Arc::new(MemoryStore::new()),
        }
    }
}
