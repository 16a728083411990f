//! Request channels: the claim protocol that hands one intent from a producer
//! to a consumer through the coordination store.
//!
//! A channel is five fields on the owner's hash:
//!
//! | field       | written by | values                               |
//! |-------------|------------|--------------------------------------|
//! | flag        | both       | `requested` → `processing` → `fetched` |
//! |             |            | or `failed_no_payload` (exclusive claim) |
//! | payload     | producer   | JSON, deleted once the intent is done |
//! | status      | both       | [`IntentStatus`]                     |
//! | message     | consumer   | human-readable outcome               |
//! | correlation | producer   | UUID identifying this submission     |
//!
//! The default claim is check-then-set on the flag. Two dispatchers polling the
//! same owner can both observe `requested` before either writes `processing`;
//! run one dispatcher per owner. [`RequestChannel::claim_exclusive`] closes that
//! gap with a compare-and-delete on the payload.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use optdesk_core::{CoordinationStore, EngineError, IntentStatus, RequestFlag, StoreError};

use crate::types::Outcome;

/// Field names of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelKeys {
    pub name: String,
    pub flag: String,
    pub payload: String,
    pub status: String,
    pub message: String,
    pub correlation: String,
}

impl ChannelKeys {
    fn named(name: &str, payload: &str) -> Self {
        Self {
            name: name.to_string(),
            flag: format!("PLACE_{name}"),
            payload: payload.to_string(),
            status: format!("STATUS_{name}"),
            message: format!("MSG_{name}"),
            correlation: format!("ID_{name}"),
        }
    }

    #[must_use]
    pub fn single() -> Self {
        Self::named("SINGLE", "SINGLE_LEG")
    }

    #[must_use]
    pub fn multi() -> Self {
        Self::named("MULTI", "MULTI_LEGS")
    }

    #[must_use]
    pub fn level_ce() -> Self {
        Self::named("LEVEL_CE", "LEVEL_CE")
    }

    #[must_use]
    pub fn level_pe() -> Self {
        Self::named("LEVEL_PE", "LEVEL_PE")
    }

    #[must_use]
    pub fn equity() -> Self {
        Self::named("EQUITY", "EQUITY_ORDER")
    }

    /// Per-index crossover channel, e.g. `PLACE_BN_OI_CROSSOVER` for prefix `BN_`.
    #[must_use]
    pub fn crossover(prefix: &str) -> Self {
        Self::named(
            &format!("{prefix}OI_CROSSOVER"),
            &format!("{prefix}OI_CROSSOVER_ORDER"),
        )
    }
}

/// What a consumer gets after winning a claim.
#[derive(Debug, Clone)]
pub struct Claim {
    pub payload: Option<String>,
    pub correlation: Option<Uuid>,
}

/// Terminal status observed by a waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminal {
    pub status: IntentStatus,
    pub message: String,
}

#[derive(Clone)]
pub struct RequestChannel {
    store: Arc<dyn CoordinationStore>,
    owner: String,
    keys: ChannelKeys,
}

impl RequestChannel {
    pub fn new(store: Arc<dyn CoordinationStore>, owner: impl Into<String>, keys: ChannelKeys) -> Self {
        Self {
            store,
            owner: owner.into(),
            keys,
        }
    }

    #[must_use]
    pub fn keys(&self) -> &ChannelKeys {
        &self.keys
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.keys.name
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    // ========================================================================
    // Producer side
    // ========================================================================

    /// Publishes `payload` and requests processing in one write.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    pub async fn submit(&self, payload: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let id_text = id.to_string();
        self.store
            .hset_many(
                &self.owner,
                &[
                    (self.keys.payload.as_str(), payload),
                    (self.keys.status.as_str(), IntentStatus::Processing.as_str()),
                    (self.keys.message.as_str(), ""),
                    (self.keys.correlation.as_str(), id_text.as_str()),
                    (self.keys.flag.as_str(), RequestFlag::Requested.as_str()),
                ],
            )
            .await?;

        debug!(channel = %self.keys.name, owner = %self.owner, id = %id, "Intent submitted");
        Ok(id)
    }

    /// Stores `payload` as WAITING without requesting processing; a later
    /// [`RequestChannel::release`] hands it to the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    pub async fn stage(&self, payload: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        let id_text = id.to_string();
        self.store
            .hset_many(
                &self.owner,
                &[
                    (self.keys.payload.as_str(), payload),
                    (self.keys.status.as_str(), IntentStatus::Waiting.as_str()),
                    (self.keys.message.as_str(), ""),
                    (self.keys.correlation.as_str(), id_text.as_str()),
                ],
            )
            .await?;
        Ok(id)
    }

    /// Requests processing of an already staged payload.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    pub async fn release(&self) -> Result<(), StoreError> {
        self.store
            .hset_many(
                &self.owner,
                &[
                    (self.keys.status.as_str(), IntentStatus::Processing.as_str()),
                    (self.keys.flag.as_str(), RequestFlag::Requested.as_str()),
                ],
            )
            .await
    }

    /// Drops a staged payload and marks the channel CANCELLED.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store call fails.
    pub async fn withdraw(&self) -> Result<(), StoreError> {
        self.record(IntentStatus::Cancelled, "Cancelled by user").await?;
        self.store
            .hdel(&self.owner, &[self.keys.payload.as_str()])
            .await?;
        Ok(())
    }

    // ========================================================================
    // Observation
    // ========================================================================

    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    pub async fn flag(&self) -> Result<Option<RequestFlag>, StoreError> {
        Ok(self
            .store
            .hget(&self.owner, &self.keys.flag)
            .await?
            .as_deref()
            .and_then(RequestFlag::parse))
    }

    /// True while an intent is requested or being processed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    pub async fn is_busy(&self) -> Result<bool, StoreError> {
        Ok(matches!(
            self.flag().await?,
            Some(RequestFlag::Requested | RequestFlag::Processing)
        ))
    }

    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    pub async fn status(&self) -> Result<Option<IntentStatus>, StoreError> {
        Ok(self
            .store
            .hget(&self.owner, &self.keys.status)
            .await?
            .and_then(|raw| raw.parse().ok()))
    }

    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    pub async fn message(&self) -> Result<Option<String>, StoreError> {
        self.store.hget(&self.owner, &self.keys.message).await
    }

    /// Polls until the submission `id` reaches a terminal status.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Consistency`] if the deadline passes or another
    /// submission overwrote the channel, and [`EngineError::Store`] on read
    /// failures.
    pub async fn wait_terminal(
        &self,
        id: Uuid,
        deadline: Duration,
        poll: Duration,
    ) -> Result<Terminal, EngineError> {
        match tokio::time::timeout(deadline, self.poll_terminal(id, poll)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::consistency(format!(
                "{} intent {id} not confirmed within {}ms",
                self.keys.name,
                deadline.as_millis()
            ))),
        }
    }

    async fn poll_terminal(&self, id: Uuid, poll: Duration) -> Result<Terminal, EngineError> {
        let expected = id.to_string();
        loop {
            let current = self.store.hget(&self.owner, &self.keys.correlation).await?;
            if current.as_deref() != Some(expected.as_str()) {
                return Err(EngineError::consistency(format!(
                    "{} intent {id} was superseded",
                    self.keys.name
                )));
            }

            if let Some(status) = self.status().await? {
                if status.is_terminal() {
                    let message = self.message().await?.unwrap_or_default();
                    return Ok(Terminal { status, message });
                }
            }

            tokio::time::sleep(poll).await;
        }
    }

    // ========================================================================
    // Consumer side
    // ========================================================================

    /// Check-then-set claim: `requested` → `processing`, then read the payload.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if any store call fails.
    pub async fn claim(&self) -> Result<Option<Claim>, StoreError> {
        if self.flag().await? != Some(RequestFlag::Requested) {
            return Ok(None);
        }

        self.store
            .hset_many(
                &self.owner,
                &[
                    (self.keys.flag.as_str(), RequestFlag::Processing.as_str()),
                    (self.keys.status.as_str(), IntentStatus::Processing.as_str()),
                ],
            )
            .await?;

        let payload = self.store.hget(&self.owner, &self.keys.payload).await?;
        let correlation = self.correlation().await?;
        Ok(Some(Claim {
            payload,
            correlation,
        }))
    }

    /// Compare-and-delete claim: whoever deletes the payload field owns it.
    ///
    /// A consumer whose delete removes nothing lost the race (or the producer
    /// never wrote a payload) and walks away without touching the channel. A
    /// deleted but blank payload marks the flag `failed_no_payload`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if any store call fails.
    pub async fn claim_exclusive(&self) -> Result<Option<Claim>, StoreError> {
        if self.flag().await? != Some(RequestFlag::Requested) {
            return Ok(None);
        }

        let payload = self.store.hget(&self.owner, &self.keys.payload).await?;
        let removed = self
            .store
            .hdel(&self.owner, &[self.keys.payload.as_str()])
            .await?;
        if removed == 0 {
            debug!(channel = %self.keys.name, owner = %self.owner, "No payload to claim");
            return Ok(None);
        }

        let Some(payload) = payload.filter(|raw| !raw.trim().is_empty()) else {
            error!(channel = %self.keys.name, owner = %self.owner, "Claimed an empty payload");
            let message = format!("No {} found", self.keys.payload);
            self.store
                .hset_many(
                    &self.owner,
                    &[
                        (self.keys.flag.as_str(), RequestFlag::FailedNoPayload.as_str()),
                        (self.keys.status.as_str(), IntentStatus::Failed.as_str()),
                        (self.keys.message.as_str(), message.as_str()),
                    ],
                )
                .await?;
            return Ok(None);
        };

        self.store
            .hset(&self.owner, &self.keys.flag, RequestFlag::Processing.as_str())
            .await?;
        let correlation = self.correlation().await?;
        Ok(Some(Claim {
            payload: Some(payload),
            correlation,
        }))
    }

    /// Takes back submission `id` if no exclusive consumer has claimed it yet.
    ///
    /// Returns `true` when the payload was deleted here; the channel is then
    /// CANCELLED and `fetched`. Returns `false` when a consumer already owns
    /// the payload or the channel now carries another submission.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if any store call fails.
    pub async fn withdraw_unclaimed(&self, id: Uuid) -> Result<bool, StoreError> {
        if self.flag().await? != Some(RequestFlag::Requested) || self.correlation().await? != Some(id) {
            return Ok(false);
        }

        let removed = self
            .store
            .hdel(&self.owner, &[self.keys.payload.as_str()])
            .await?;
        if removed == 0 {
            return Ok(false);
        }

        self.record(IntentStatus::Cancelled, "Withdrawn before processing")
            .await?;
        self.store
            .hset(&self.owner, &self.keys.flag, RequestFlag::Fetched.as_str())
            .await?;
        info!(channel = %self.keys.name, owner = %self.owner, id = %id, "Unclaimed intent withdrawn");
        Ok(true)
    }

    /// Writes the status and message pair.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    pub async fn record(&self, status: IntentStatus, message: &str) -> Result<(), StoreError> {
        self.store
            .hset_many(
                &self.owner,
                &[
                    (self.keys.status.as_str(), status.as_str()),
                    (self.keys.message.as_str(), message),
                ],
            )
            .await
    }

    /// Advances the flag to `fetched` and deletes the payload so a restart
    /// cannot replay it.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if either write fails.
    pub async fn finish(&self) -> Result<(), StoreError> {
        self.store
            .hset(&self.owner, &self.keys.flag, RequestFlag::Fetched.as_str())
            .await?;
        self.store
            .hdel(&self.owner, &[self.keys.payload.as_str()])
            .await?;
        Ok(())
    }

    /// Claims (check-then-set) and runs `handler` to completion.
    ///
    /// Returns `Ok(None)` when nothing was requested.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if claiming or cleanup fails, or if the handler
    /// itself failed on the store. The flag is advanced to `fetched` first
    /// whenever the store allows it.
    pub async fn process<F, Fut>(&self, handler: F) -> Result<Option<Outcome>, StoreError>
    where
        F: FnOnce(Claim) -> Fut,
        Fut: Future<Output = Result<Outcome, EngineError>>,
    {
        match self.claim().await? {
            Some(claim) => self.run(claim, handler).await.map(Some),
            None => Ok(None),
        }
    }

    /// Same as [`RequestChannel::process`] with a compare-and-delete claim.
    ///
    /// # Errors
    ///
    /// See [`RequestChannel::process`].
    pub async fn process_exclusive<F, Fut>(&self, handler: F) -> Result<Option<Outcome>, StoreError>
    where
        F: FnOnce(Claim) -> Fut,
        Fut: Future<Output = Result<Outcome, EngineError>>,
    {
        match self.claim_exclusive().await? {
            Some(claim) => self.run(claim, handler).await.map(Some),
            None => Ok(None),
        }
    }

    async fn run<F, Fut>(&self, claim: Claim, handler: F) -> Result<Outcome, StoreError>
    where
        F: FnOnce(Claim) -> Fut,
        Fut: Future<Output = Result<Outcome, EngineError>>,
    {
        let correlation = claim.correlation;
        info!(channel = %self.keys.name, owner = %self.owner, id = ?correlation, "Processing intent");

        let mut store_failure = None;
        let outcome = match AssertUnwindSafe(handler(claim)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(EngineError::Store(e))) => {
                let outcome = Outcome::failed(e.to_string());
                store_failure = Some(e);
                outcome
            }
            Ok(Err(e)) => Outcome::failed(e.to_string()),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                error!(channel = %self.keys.name, reason = %reason, "Intent handler panicked");
                Outcome::failed(format!("Internal error: {reason}"))
            }
        };

        let recorded = self.record(outcome.status, &outcome.message).await;
        let finished = self.finish().await;

        match outcome.status {
            IntentStatus::Success => {
                info!(channel = %self.keys.name, id = ?correlation, message = %outcome.message, "Intent succeeded");
            }
            status => {
                warn!(channel = %self.keys.name, id = ?correlation, status = %status, message = %outcome.message, "Intent did not succeed");
            }
        }

        recorded?;
        finished?;
        match store_failure {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Id of the submission the channel currently carries.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    pub async fn correlation(&self) -> Result<Option<Uuid>, StoreError> {
        Ok(self
            .store
            .hget(&self.owner, &self.keys.correlation)
            .await?
            .and_then(|raw| Uuid::parse_str(&raw).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optdesk_core::MemoryStore;

    const OWNER: &str = "AB1234";

    fn channel(store: &Arc<MemoryStore>, keys: ChannelKeys) -> RequestChannel {
        RequestChannel::new(store.clone(), OWNER, keys)
    }

    #[test]
    fn test_crossover_keys_carry_prefix() {
        let keys = ChannelKeys::crossover("BN_");
        assert_eq!(keys.flag, "PLACE_BN_OI_CROSSOVER");
        assert_eq!(keys.payload, "BN_OI_CROSSOVER_ORDER");
        assert_eq!(keys.status, "STATUS_BN_OI_CROSSOVER");
        assert_eq!(keys.message, "MSG_BN_OI_CROSSOVER");

        let nifty = ChannelKeys::crossover("");
        assert_eq!(nifty.flag, "PLACE_OI_CROSSOVER");
    }

    #[tokio::test]
    async fn test_submit_writes_request_fields() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());

        let id = multi.submit("[]").await.unwrap();

        assert_eq!(multi.flag().await.unwrap(), Some(RequestFlag::Requested));
        assert_eq!(multi.status().await.unwrap(), Some(IntentStatus::Processing));
        assert_eq!(
            store.hget(OWNER, "ID_MULTI").await.unwrap(),
            Some(id.to_string())
        );
        assert!(multi.is_busy().await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_requires_requested_flag() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());

        assert!(multi.claim().await.unwrap().is_none());

        multi.submit("[1]").await.unwrap();
        let claim = multi.claim().await.unwrap().unwrap();
        assert_eq!(claim.payload.as_deref(), Some("[1]"));
        assert_eq!(multi.flag().await.unwrap(), Some(RequestFlag::Processing));

        assert!(multi.claim().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_process_success_cleans_up() {
        let store = Arc::new(MemoryStore::new());
        let single = channel(&store, ChannelKeys::single());
        single.submit("payload").await.unwrap();

        let outcome = single
            .process(|claim| async move {
                assert_eq!(claim.payload.as_deref(), Some("payload"));
                Ok(Outcome::success("Order Placed: 1"))
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.status, IntentStatus::Success);
        assert_eq!(single.flag().await.unwrap(), Some(RequestFlag::Fetched));
        assert_eq!(single.status().await.unwrap(), Some(IntentStatus::Success));
        assert_eq!(
            single.message().await.unwrap().as_deref(),
            Some("Order Placed: 1")
        );
        assert!(store.hget(OWNER, "SINGLE_LEG").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_process_error_becomes_failed_status() {
        let store = Arc::new(MemoryStore::new());
        let single = channel(&store, ChannelKeys::single());
        single.submit("payload").await.unwrap();

        let outcome = single
            .process(|_| async { Err(EngineError::validation("No leg found")) })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome, Outcome::failed("No leg found"));
        assert_eq!(single.flag().await.unwrap(), Some(RequestFlag::Fetched));
        assert!(store.hget(OWNER, "SINGLE_LEG").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_process_panic_still_advances_flag() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());
        multi.submit("payload").await.unwrap();

        let outcome = multi
            .process(|_| async {
                if true {
                    panic!("boom");
                }
                Ok(Outcome::success("unreachable"))
            })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(outcome.status, IntentStatus::Failed);
        assert!(outcome.message.contains("boom"));
        assert_eq!(multi.flag().await.unwrap(), Some(RequestFlag::Fetched));
    }

    /// Answers flag reads late, widening the gap between a consumer's flag
    /// check and its claim.
    struct LaggingFlags {
        inner: MemoryStore,
        lag: Duration,
    }

    #[async_trait::async_trait]
    impl CoordinationStore for LaggingFlags {
        async fn hget(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
            let value = self.inner.hget(hash, field).await;
            if field.starts_with("PLACE_") {
                tokio::time::sleep(self.lag).await;
            }
            value
        }

        async fn hgetall(
            &self,
            hash: &str,
        ) -> Result<std::collections::HashMap<String, String>, StoreError> {
            self.inner.hgetall(hash).await
        }

        async fn hset(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
            self.inner.hset(hash, field, value).await
        }

        async fn hset_many(&self, hash: &str, fields: &[(&str, &str)]) -> Result<(), StoreError> {
            self.inner.hset_many(hash, fields).await
        }

        async fn hdel(&self, hash: &str, fields: &[&str]) -> Result<usize, StoreError> {
            self.inner.hdel(hash, fields).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value).await
        }
    }

    #[tokio::test]
    async fn test_exclusive_claim_wins_once() {
        let store = Arc::new(LaggingFlags {
            inner: MemoryStore::new(),
            lag: Duration::from_millis(50),
        });
        let equity = RequestChannel::new(store.clone(), OWNER, ChannelKeys::equity());
        equity.submit(r#"{"x":1}"#).await.unwrap();

        let first = {
            let equity = equity.clone();
            tokio::spawn(async move {
                equity
                    .process_exclusive(|claim| async move {
                        assert_eq!(claim.payload.as_deref(), Some(r#"{"x":1}"#));
                        Ok(Outcome::success("Order Placed: 1"))
                    })
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Reads `requested` before the first consumer finishes.
        let second = {
            let equity = equity.clone();
            tokio::spawn(async move {
                equity
                    .process_exclusive(|_| async { Ok(Outcome::failed("ran twice")) })
                    .await
                    .unwrap()
            })
        };

        let first = first.await.unwrap();
        let second = second.await.unwrap();

        assert_eq!(first, Some(Outcome::success("Order Placed: 1")));
        assert_eq!(second, None);
        assert_eq!(equity.status().await.unwrap(), Some(IntentStatus::Success));
        assert_eq!(
            equity.message().await.unwrap().as_deref(),
            Some("Order Placed: 1")
        );
        assert_eq!(equity.flag().await.unwrap(), Some(RequestFlag::Fetched));
    }

    #[tokio::test]
    async fn test_exclusive_claim_without_payload_leaves_channel() {
        let store = Arc::new(MemoryStore::new());
        let equity = channel(&store, ChannelKeys::equity());
        store.hset(OWNER, "PLACE_EQUITY", "requested").await.unwrap();

        assert!(equity.claim_exclusive().await.unwrap().is_none());
        assert_eq!(equity.flag().await.unwrap(), Some(RequestFlag::Requested));
        assert!(equity.status().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exclusive_claim_of_blank_payload_fails() {
        let store = Arc::new(MemoryStore::new());
        let equity = channel(&store, ChannelKeys::equity());
        equity.submit("  ").await.unwrap();

        assert!(equity.claim_exclusive().await.unwrap().is_none());
        assert_eq!(equity.flag().await.unwrap(), Some(RequestFlag::FailedNoPayload));
        assert_eq!(equity.status().await.unwrap(), Some(IntentStatus::Failed));
        assert!(store.hget(OWNER, "EQUITY_ORDER").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_withdraw_unclaimed_takes_back_request() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());
        let id = multi.submit("[]").await.unwrap();

        assert!(multi.withdraw_unclaimed(id).await.unwrap());
        assert_eq!(multi.flag().await.unwrap(), Some(RequestFlag::Fetched));
        assert_eq!(multi.status().await.unwrap(), Some(IntentStatus::Cancelled));
        assert!(multi.claim_exclusive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_withdraw_after_claim_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());
        let id = multi.submit("[]").await.unwrap();
        multi.claim_exclusive().await.unwrap().unwrap();

        assert!(!multi.withdraw_unclaimed(id).await.unwrap());
        assert_eq!(multi.flag().await.unwrap(), Some(RequestFlag::Processing));
        assert_eq!(multi.status().await.unwrap(), Some(IntentStatus::Processing));
    }

    #[tokio::test]
    async fn test_withdraw_ignores_other_submission() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());
        let first = multi.submit("[]").await.unwrap();
        multi.submit("[1]").await.unwrap();

        assert!(!multi.withdraw_unclaimed(first).await.unwrap());
        assert_eq!(
            store.hget(OWNER, "MULTI_LEGS").await.unwrap().as_deref(),
            Some("[1]")
        );
    }

    #[tokio::test]
    async fn test_wait_terminal_sees_own_status() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());
        let id = multi.submit("[]").await.unwrap();

        let consumer = multi.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            consumer
                .process(|_| async { Ok(Outcome::success("All legs placed successfully")) })
                .await
                .unwrap();
        });

        let terminal = multi
            .wait_terminal(id, Duration::from_secs(2), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(terminal.status, IntentStatus::Success);
        assert_eq!(terminal.message, "All legs placed successfully");
    }

    #[tokio::test]
    async fn test_wait_terminal_times_out() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());
        let id = multi.submit("[]").await.unwrap();

        let err = multi
            .wait_terminal(id, Duration::from_millis(50), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Consistency(_)));
    }

    #[tokio::test]
    async fn test_wait_terminal_rejects_superseded_intent() {
        let store = Arc::new(MemoryStore::new());
        let multi = channel(&store, ChannelKeys::multi());
        let first = multi.submit("[]").await.unwrap();
        multi.submit("[]").await.unwrap();

        let err = multi
            .wait_terminal(first, Duration::from_secs(1), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("superseded"));
    }
}
