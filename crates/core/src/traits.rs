use std::collections::HashMap;

use async_trait::async_trait;

use crate::alert::Alert;
use crate::error::{NotifyError, StoreError};
use crate::types::LegKey;

/// Shared blackboard every actor coordinates through.
///
/// Hash operations address a per-owner field map; `get`/`set` address global
/// scalar keys such as live spot prices. Atomicity is per call only: a
/// multi-field `hset_many` may be observed half-applied by another reader.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn hgetall(&self, hash: &str) -> Result<HashMap<String, String>, StoreError>;

    async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError>;

    async fn hset_many(&self, hash: &str, fields: &[(&str, &str)]) -> Result<(), StoreError>;

    /// Deletes fields and returns how many actually existed.
    async fn hdel(&self, hash: &str, fields: &[&str]) -> Result<usize, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Maps an option contract to the broker's tradable symbol.
#[async_trait]
pub trait InstrumentResolver: Send + Sync {
    async fn resolve(&self, key: &LegKey) -> Result<Option<String>, StoreError>;
}

/// Fire-and-forget alert delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}
