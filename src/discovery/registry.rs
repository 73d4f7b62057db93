use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A deduplicated configuration found on some pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryEntry {
    pub hash: String,
    pub input: String,
    pub namespace: String,
    pub pod_name: String,
    pub instances: usize,
    pub registered_at: DateTime<Utc>,
}

/// Configuration hashes that already have running inputs
///
/// Entries are never evicted: a configuration stays registered for the life
/// of the process even after its pod is gone.
#[derive(Debug, Default, Clone)]
pub struct DiscoveryRegistry {
    entries: Arc<Mutex<HashMap<String, DiscoveryEntry>>>,
}

impl DiscoveryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DiscoveryEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `entry` unless its hash is already present
    ///
    /// The presence check and the insert happen under one lock, so exactly
    /// one of several concurrent callers with the same hash gets `true`.
    pub fn try_register(&self, entry: DiscoveryEntry) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&entry.hash) {
            return false;
        }
        entries.insert(entry.hash.clone(), entry);
        true
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.lock().contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<DiscoveryEntry> {
        self.lock().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<DiscoveryEntry> {
        let mut all: Vec<_> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.hash.cmp(&b.hash)));
        all
    }
}
