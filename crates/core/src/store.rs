//! In-process coordination store.
//!
//! Used by the paper-trading binary and every test. Each call takes the lock
//! once, so `hdel` is an atomic compare-and-delete exactly like a server-side
//! `HDEL`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StoreError;
use crate::traits::CoordinationStore;

#[derive(Debug, Default)]
pub struct MemoryStore {
    hashes: RwLock<HashMap<String, HashMap<String, String>>>,
    scalars: RwLock<HashMap<String, String>>,
    offline: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage: every call fails with [`StoreError::Unavailable`]
    /// until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.ensure_online()?;
        Ok(self
            .hashes
            .read()
            .get(hash)
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        self.ensure_online()?;
        Ok(self.hashes.read().get(hash).cloned().unwrap_or_default())
    }

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.hashes
            .write()
            .entry(hash.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hset_many(&self, hash: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
        self.ensure_online()?;
        let mut hashes = self.hashes.write();
        let entry = hashes.entry(hash.to_string()).or_default();
        for (field, value) in fields {
            entry.insert((*field).to_string(), (*value).to_string());
        }
        Ok(())
    }

    async fn hdel(&self, hash: &str, fields: &[&str]) -> Result<usize, StoreError> {
        self.ensure_online()?;
        let mut hashes = self.hashes.write();
        let Some(entry) = hashes.get_mut(hash) else {
            return Ok(0);
        };
        let removed = fields
            .iter()
            .filter(|field| entry.remove(**field).is_some())
            .count();
        if entry.is_empty() {
            hashes.remove(hash);
        }
        Ok(removed)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_online()?;
        Ok(self.scalars.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.scalars
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
