//! Instrument master lookups backed by the coordination store.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::traits::{CoordinationStore, InstrumentResolver};
use crate::types::LegKey;

/// Resolves symbols from a hash keyed `INDEX_YYYY-MM-DD_CE_STRIKE`.
///
/// The hash is populated by the reference-data builder before any leg that
/// refers to it is submitted.
pub struct StoreResolver {
    store: Arc<dyn CoordinationStore>,
    hash: String,
}

impl StoreResolver {
    pub fn new(store: Arc<dyn CoordinationStore>, hash: impl Into<String>) -> Self {
        Self {
            store,
            hash: hash.into(),
        }
    }
}

#[async_trait]
impl InstrumentResolver for StoreResolver {
    async fn resolve(&self, key: &LegKey) -> Result<Option<String>, StoreError> {
        self.store.hget(&self.hash, &key.to_string()).await
    }
}
