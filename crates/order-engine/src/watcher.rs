//! Edge-triggered level watchers.
//!
//! A watcher is armed with a level, an index and a staged leg list. Every tick
//! it samples the index spot, compares it with the previous sample, and on a
//! crossing releases the staged intent to the dispatcher exactly once.
//! Sampling happens at the polling cadence, so a spike that crosses and
//! recrosses between two ticks is not seen.

use std::marker::PhantomData;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use uuid::Uuid;

use optdesk_core::{
    Alert, CoordinationStore, EngineError, InstrumentIndex, Leg, NotificationSink, StoreError,
};

use crate::channel::{ChannelKeys, RequestChannel};
use crate::notify::notify_quietly;

/// Crossing rule plus the store names of one watcher polarity.
pub trait EdgeCondition: Send + Sync + 'static {
    /// Field-name stem, e.g. `LEVEL_CE`.
    const NAME: &'static str;

    fn crossed(previous: Decimal, current: Decimal, level: Decimal) -> bool;

    fn channel_keys() -> ChannelKeys;
}

/// Fires when spot moves from below the level to at or above it.
#[derive(Debug, Clone, Copy)]
pub struct Rising;

impl EdgeCondition for Rising {
    const NAME: &'static str = "LEVEL_CE";

    fn crossed(previous: Decimal, current: Decimal, level: Decimal) -> bool {
        previous < level && current >= level
    }

    fn channel_keys() -> ChannelKeys {
        ChannelKeys::level_ce()
    }
}

/// Fires when spot moves from above the level to at or below it.
#[derive(Debug, Clone, Copy)]
pub struct Falling;

impl EdgeCondition for Falling {
    const NAME: &'static str = "LEVEL_PE";

    fn crossed(previous: Decimal, current: Decimal, level: Decimal) -> bool {
        previous > level && current <= level
    }

    fn channel_keys() -> ChannelKeys {
        ChannelKeys::level_pe()
    }
}

pub type BreakoutWatcher = LevelWatcher<Rising>;
pub type BreakdownWatcher = LevelWatcher<Falling>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Waiting,
    Triggered,
    Cancelled,
}

impl TriggerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Triggered => "triggered",
            Self::Cancelled => "cancelled",
        }
    }

    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("waiting") => Self::Waiting,
            Some("triggered") => Self::Triggered,
            Some("cancelled") => Self::Cancelled,
            _ => Self::Idle,
        }
    }
}

/// Owner-hash fields holding a watcher's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherKeys {
    pub trigger: String,
    pub level: String,
    pub index: String,
    pub previous_spot: String,
}

impl WatcherKeys {
    #[must_use]
    pub fn for_edge<E: EdgeCondition>() -> Self {
        Self {
            trigger: format!("{}_TRIGGER", E::NAME),
            level: format!("{}_LEVEL", E::NAME),
            index: format!("{}_INDEX", E::NAME),
            previous_spot: format!("{}_PREV_SPOT", E::NAME),
        }
    }

    /// Returns the watcher to idle; it stays idle until rearmed.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the delete fails.
    pub async fn reset(&self, store: &dyn CoordinationStore, owner: &str) -> Result<(), StoreError> {
        store
            .hdel(
                owner,
                &[
                    self.trigger.as_str(),
                    self.level.as_str(),
                    self.index.as_str(),
                    self.previous_spot.as_str(),
                ],
            )
            .await?;
        Ok(())
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not armed.
    Inactive,
    /// Armed on an index without a spot feed.
    UnknownIndex,
    /// No usable spot sample this tick.
    NoSpot,
    /// First sample since arming; stored, nothing compared.
    Primed { spot: Decimal },
    /// Compared, no crossing.
    Holding { previous: Decimal, spot: Decimal },
    Triggered { previous: Decimal, spot: Decimal },
}

pub struct LevelWatcher<E: EdgeCondition> {
    store: Arc<dyn CoordinationStore>,
    owner: String,
    keys: WatcherKeys,
    channel: RequestChannel,
    notifier: Arc<dyn NotificationSink>,
    _edge: PhantomData<E>,
}

impl<E: EdgeCondition> LevelWatcher<E> {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        owner: impl Into<String>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let owner = owner.into();
        let channel = RequestChannel::new(store.clone(), owner.clone(), E::channel_keys());
        Self {
            store,
            owner,
            keys: WatcherKeys::for_edge::<E>(),
            channel,
            notifier,
            _edge: PhantomData,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        E::NAME
    }

    #[must_use]
    pub fn keys(&self) -> &WatcherKeys {
        &self.keys
    }

    /// # Errors
    ///
    /// Returns a [`StoreError`] if the read fails.
    pub async fn state(&self) -> Result<TriggerState, StoreError> {
        let raw = self.store.hget(&self.owner, &self.keys.trigger).await?;
        Ok(TriggerState::parse(raw.as_deref()))
    }

    /// Stages `legs` and arms the watcher at `level` on `index`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an empty leg list and
    /// [`EngineError::Store`] on write failures.
    pub async fn arm(
        &self,
        level: Decimal,
        index: InstrumentIndex,
        legs: &[Leg],
    ) -> Result<Uuid, EngineError> {
        if legs.is_empty() {
            return Err(EngineError::validation("No legs to arm"));
        }

        let payload = serde_json::to_string(legs)?;
        let id = self.channel.stage(&payload).await?;

        self.store
            .hdel(&self.owner, &[self.keys.previous_spot.as_str()])
            .await?;
        let level_text = level.to_string();
        self.store
            .hset_many(
                &self.owner,
                &[
                    (self.keys.level.as_str(), level_text.as_str()),
                    (self.keys.index.as_str(), index.as_str()),
                    (self.keys.trigger.as_str(), TriggerState::Waiting.as_str()),
                ],
            )
            .await?;

        info!(watcher = E::NAME, owner = %self.owner, %index, %level, legs = legs.len(), "Watcher armed");
        notify_quietly(
            self.notifier.as_ref(),
            Alert::Armed {
                watcher: E::NAME.to_string(),
                index,
                level,
            },
        )
        .await;
        Ok(id)
    }

    /// Disarms the watcher and drops its staged legs.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if any store call fails.
    pub async fn cancel(&self) -> Result<(), StoreError> {
        self.store
            .hset(&self.owner, &self.keys.trigger, TriggerState::Cancelled.as_str())
            .await?;
        self.channel.withdraw().await?;
        self.store
            .hdel(
                &self.owner,
                &[
                    self.keys.level.as_str(),
                    self.keys.index.as_str(),
                    self.keys.previous_spot.as_str(),
                ],
            )
            .await?;
        info!(watcher = E::NAME, owner = %self.owner, "Watcher cancelled");
        Ok(())
    }

    /// One polling step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] if the armed level is unreadable and
    /// [`EngineError::Store`] on store failures.
    pub async fn tick(&self) -> Result<TickOutcome, EngineError> {
        if self.state().await? != TriggerState::Waiting {
            return Ok(TickOutcome::Inactive);
        }

        let level = self.read_level().await?;
        let raw_index = self
            .store
            .hget(&self.owner, &self.keys.index)
            .await?
            .unwrap_or_default();
        let index = match raw_index.parse::<InstrumentIndex>() {
            Ok(index) => index,
            Err(_) => {
                warn!(watcher = E::NAME, index = %raw_index, "Unknown index; skipping");
                return Ok(TickOutcome::UnknownIndex);
            }
        };

        let Some(spot) = self.read_spot(index).await? else {
            return Ok(TickOutcome::NoSpot);
        };

        let previous = self
            .store
            .hget(&self.owner, &self.keys.previous_spot)
            .await?
            .and_then(|raw| raw.trim().parse::<Decimal>().ok());
        self.store
            .hset(&self.owner, &self.keys.previous_spot, &spot.to_string())
            .await?;

        let Some(previous) = previous else {
            debug!(watcher = E::NAME, %index, %spot, "First sample since arming");
            return Ok(TickOutcome::Primed { spot });
        };

        if !E::crossed(previous, spot, level) {
            return Ok(TickOutcome::Holding { previous, spot });
        }

        // Leave `waiting` before handing off: the dispatcher resets these
        // fields once the intent is done and must not find them rewritten.
        self.store
            .hset(&self.owner, &self.keys.trigger, TriggerState::Triggered.as_str())
            .await?;
        self.channel.release().await?;

        info!(watcher = E::NAME, %index, %previous, %spot, %level, "Level crossed, intent released");
        notify_quietly(
            self.notifier.as_ref(),
            Alert::Triggered {
                watcher: E::NAME.to_string(),
                index,
                level,
                spot,
            },
        )
        .await;

        Ok(TickOutcome::Triggered { previous, spot })
    }

    async fn read_level(&self) -> Result<Decimal, EngineError> {
        let raw = self
            .store
            .hget(&self.owner, &self.keys.level)
            .await?
            .unwrap_or_default();
        raw.trim()
            .parse::<Decimal>()
            .map_err(|_| EngineError::validation(format!("{} has bad level '{raw}'", E::NAME)))
    }

    async fn read_spot(&self, index: InstrumentIndex) -> Result<Option<Decimal>, StoreError> {
        let Some(raw) = self.store.get(index.spot_key()).await? else {
            debug!(watcher = E::NAME, %index, "No spot data; skipping");
            return Ok(None);
        };
        match raw.trim().parse::<Decimal>() {
            Ok(spot) => Ok(Some(spot)),
            Err(e) => {
                warn!(watcher = E::NAME, %index, raw = %raw, error = %e, "Unparsable spot; skipping");
                Ok(None)
            }
        }
    }
}
