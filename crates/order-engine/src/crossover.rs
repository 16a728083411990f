//! Open-interest crossover auto-trading.
//!
//! Two halves per index profile, talking only through the store:
//!
//! - [`SignalEngine`] turns a fresh upstream signal into a SELL entry intent
//!   on the profile's crossover channel.
//! - [`CrossoverReconciler`] claims that intent and enforces exit-before-entry:
//!   an opposite-direction position is closed through the multi-leg channel
//!   and confirmed before the new leg is sold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use optdesk_core::{
    Alert, CoordinationStore, CrossoverProfileConfig, Direction, EngineError, InstrumentIndex,
    IntentStatus, Leg, NotificationSink, OptionType, Side, Signal, SignalStatus, StoreError,
};

use crate::channel::{ChannelKeys, Claim, RequestChannel, Terminal};
use crate::ledger::PositionLedger;
use crate::notify::notify_quietly;
use crate::sequencer::LegSequencer;
use crate::types::{CrossoverOrder, Outcome, Position};

const STRATEGY: &str = "OI_CROSSOVER";

/// Per-index parameters and the store names derived from them.
#[derive(Debug, Clone)]
pub struct CrossoverProfile {
    pub index: InstrumentIndex,
    pub lot_size: u32,
    pub signal_key: String,
    pub expiry: NaiveDate,
    pub strike_step: Decimal,
    pub key_prefix: String,
}

impl From<CrossoverProfileConfig> for CrossoverProfile {
    fn from(config: CrossoverProfileConfig) -> Self {
        Self {
            index: config.index,
            lot_size: config.lot_size,
            signal_key: config.signal_key,
            expiry: config.expiry,
            strike_step: config.strike_step,
            key_prefix: config.key_prefix,
        }
    }
}

impl CrossoverProfile {
    #[must_use]
    pub fn enabled_key(&self) -> String {
        format!("{}OI_ENGINE_ENABLED", self.key_prefix)
    }

    #[must_use]
    pub fn engine_status_key(&self) -> String {
        format!("{}OI_ENGINE_STATUS", self.key_prefix)
    }

    #[must_use]
    pub fn last_signal_key(&self) -> String {
        format!("{}OI_ENGINE_LAST_SIGNAL", self.key_prefix)
    }

    #[must_use]
    pub fn last_order_key(&self) -> String {
        format!("{}OI_ENGINE_LAST_ORDER", self.key_prefix)
    }

    /// Correlation id of an exit submitted but not yet confirmed.
    #[must_use]
    pub fn pending_exit_key(&self) -> String {
        format!("{}OI_PENDING_EXIT", self.key_prefix)
    }

    /// Lot multiplier field, e.g. `OI_BANKNIFTY_LOTS`.
    #[must_use]
    pub fn lots_key(&self) -> String {
        format!("OI_{}_LOTS", self.index)
    }

    #[must_use]
    pub fn channel_keys(&self) -> ChannelKeys {
        ChannelKeys::crossover(&self.key_prefix)
    }

    /// Strike and right to sell for `direction`.
    ///
    /// BULLISH sells a put at spot rounded down to the step; BEARISH sells a
    /// call at spot rounded up. Both are out of the money.
    #[must_use]
    pub fn entry_strike(&self, spot: Decimal, direction: Direction) -> (Decimal, OptionType) {
        let steps = spot / self.strike_step;
        match direction {
            Direction::Bullish => (steps.floor() * self.strike_step, OptionType::Put),
            Direction::Bearish => (steps.ceil() * self.strike_step, OptionType::Call),
        }
    }
}

// ============================================================================
// Signal engine
// ============================================================================

/// What one signal-engine tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalTick {
    Disabled,
    NoSignal,
    /// A previous entry intent for this index is still being handled.
    InFlight,
    NoSpot,
    Published { id: Uuid, order: CrossoverOrder },
}

pub struct SignalEngine {
    profile: CrossoverProfile,
    store: Arc<dyn CoordinationStore>,
    owner: String,
    channel: RequestChannel,
}

impl SignalEngine {
    pub fn new(
        profile: CrossoverProfile,
        store: Arc<dyn CoordinationStore>,
        owner: impl Into<String>,
    ) -> Self {
        let owner = owner.into();
        let channel = RequestChannel::new(store.clone(), owner.clone(), profile.channel_keys());
        Self {
            profile,
            store,
            owner,
            channel,
        }
    }

    #[must_use]
    pub fn profile(&self) -> &CrossoverProfile {
        &self.profile
    }

    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for a malformed signal hash (engine
    /// status is set to `ERROR`) and [`EngineError::Store`] on store failures.
    pub async fn tick(&self) -> Result<SignalTick, EngineError> {
        match self.evaluate().await {
            Err(e) if !e.is_store() => {
                self.set_engine_status("ERROR").await?;
                Err(e)
            }
            other => other,
        }
    }

    async fn evaluate(&self) -> Result<SignalTick, EngineError> {
        let enabled = self.store.hget(&self.owner, &self.profile.enabled_key()).await?;
        if enabled.as_deref() != Some("ON") {
            self.set_engine_status("IDLE").await?;
            return Ok(SignalTick::Disabled);
        }
        self.set_engine_status("RUNNING").await?;

        let fields = self.store.hgetall(&self.profile.signal_key).await?;
        let signal = match Signal::from_fields(&fields)? {
            Some(signal) if signal.status.is_actionable() => signal,
            _ => return Ok(SignalTick::NoSignal),
        };

        if self.channel.is_busy().await? {
            return Ok(SignalTick::InFlight);
        }

        let index = self.profile.index;
        let spot_key = index.spot_key();
        let spot = self
            .store
            .get(spot_key)
            .await?
            .and_then(|raw| raw.trim().parse::<Decimal>().ok());
        let Some(spot) = spot else {
            warn!(%index, spot_key, "Spot unavailable, failing signal");
            self.store
                .hset(&self.profile.signal_key, "status", SignalStatus::FailedNoSpot.as_str())
                .await?;
            self.set_engine_status("ERROR").await?;
            self.channel
                .record(IntentStatus::Failed, &format!("{spot_key} not available"))
                .await?;
            return Ok(SignalTick::NoSpot);
        };

        let (strike, option_type) = self.profile.entry_strike(spot, signal.direction);
        let lots = self.lots().await?;
        let quantity = lots.checked_mul(self.profile.lot_size).ok_or_else(|| {
            EngineError::validation(format!(
                "{lots} lots of {} overflows the order quantity",
                self.profile.lot_size
            ))
        })?;
        let order = CrossoverOrder {
            leg: Leg::market(
                index,
                self.profile.expiry,
                option_type,
                strike,
                Side::Sell,
                quantity,
            ),
            direction: signal.direction,
            spot,
            ratio: signal.ratio,
            strategy: STRATEGY.to_string(),
        };

        let payload = serde_json::to_string(&order)?;
        let id = self.channel.submit(&payload).await?;

        let last_signal = serde_json::to_string(&fields)?;
        self.store
            .hset_many(
                &self.owner,
                &[
                    (self.profile.last_signal_key().as_str(), last_signal.as_str()),
                    (self.profile.last_order_key().as_str(), payload.as_str()),
                ],
            )
            .await?;

        info!(
            %index,
            direction = %signal.direction,
            strike = %strike.normalize(),
            option_type = %option_type,
            %spot,
            quantity = order.leg.quantity,
            "Crossover entry published"
        );
        Ok(SignalTick::Published { id, order })
    }

    async fn lots(&self) -> Result<u32, StoreError> {
        let raw = self.store.hget(&self.owner, &self.profile.lots_key()).await?;
        Ok(match raw.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some(text) => text.parse::<u32>().unwrap_or_else(|_| {
                warn!(key = %self.profile.lots_key(), value = %text, "Bad lot count, using 1");
                1
            }),
        })
    }

    async fn set_engine_status(&self, status: &str) -> Result<(), StoreError> {
        self.store
            .hset(&self.owner, &self.profile.engine_status_key(), status)
            .await
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Timing for the exit confirmation wait.
#[derive(Debug, Clone, Copy)]
pub struct ExitTiming {
    pub timeout: Duration,
    pub poll: Duration,
}

pub struct CrossoverReconciler {
    profile: CrossoverProfile,
    store: Arc<dyn CoordinationStore>,
    channel: RequestChannel,
    exits: RequestChannel,
    ledger: Arc<PositionLedger>,
    sequencer: Arc<LegSequencer>,
    notifier: Arc<dyn NotificationSink>,
    timing: ExitTiming,
}

impl CrossoverReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile: CrossoverProfile,
        store: Arc<dyn CoordinationStore>,
        owner: impl Into<String>,
        ledger: Arc<PositionLedger>,
        sequencer: Arc<LegSequencer>,
        notifier: Arc<dyn NotificationSink>,
        timing: ExitTiming,
    ) -> Self {
        let owner = owner.into();
        let channel = RequestChannel::new(store.clone(), owner.clone(), profile.channel_keys());
        let exits = RequestChannel::new(store.clone(), owner, ChannelKeys::multi());
        Self {
            profile,
            store,
            channel,
            exits,
            ledger,
            sequencer,
            notifier,
            timing,
        }
    }

    #[must_use]
    pub fn profile(&self) -> &CrossoverProfile {
        &self.profile
    }

    /// Claims and handles a pending entry intent, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store fails; the intent is still
    /// finished whenever the store allows it.
    pub async fn tick(&self) -> Result<Option<Outcome>, StoreError> {
        self.channel.process(|claim| self.reconcile(claim)).await
    }

    async fn reconcile(&self, claim: Claim) -> Result<Outcome, EngineError> {
        let result = self.reconcile_inner(claim).await;
        if let Err(e) = &result {
            notify_quietly(
                self.notifier.as_ref(),
                Alert::CrossoverFailed {
                    index: self.profile.index,
                    reason: e.to_string(),
                },
            )
            .await;
        }
        result
    }

    async fn reconcile_inner(&self, claim: Claim) -> Result<Outcome, EngineError> {
        let raw = claim.payload.ok_or_else(|| {
            EngineError::validation(format!("{} missing", self.channel.keys().payload))
        })?;
        let order: CrossoverOrder = serde_json::from_str(&raw)?;
        let index = self.profile.index;
        if order.leg.index != index {
            return Err(EngineError::validation(format!(
                "{} intent carries a {} leg",
                index, order.leg.index
            )));
        }

        info!(%index, direction = %order.direction, leg = %order.leg.describe(), "Reconciling crossover entry");

        self.settle_pending_exit().await?;

        if let Some(existing) = self.ledger.get(index).await? {
            if existing.direction == order.direction {
                self.consume_signal().await?;
                return Ok(Outcome::ignored("Same direction position already exists"));
            }
            self.exit(&existing).await?;
        }

        let mut leg = order.leg.clone();
        leg.resolved_symbol = Some(self.sequencer.resolve(&leg).await?);
        let order_id = self.sequencer.place_leg(&leg).await?;

        // Entry is live from here on; never leave the signal actionable.
        let consumed = self.consume_signal().await;
        let recorded = self.ledger.add(index, order.direction, vec![leg.clone()]).await;

        notify_quietly(
            self.notifier.as_ref(),
            Alert::CrossoverEntered {
                index,
                direction: order.direction,
                strike: leg.strike,
                option_type: leg.option_type,
            },
        )
        .await;

        match (consumed, recorded) {
            (Ok(()), Ok(_)) => Ok(Outcome::success(format!("Order placed: {order_id}"))),
            (Err(e), _) => Ok(Outcome::failed(format!(
                "Order placed: {order_id}; signal not consumed: {e}"
            ))),
            (_, Err(e)) => Ok(Outcome::failed(format!(
                "Order placed: {order_id}; position not recorded: {e}"
            ))),
        }
    }

    /// Closes `existing` through the multi-leg channel and waits for the
    /// dispatcher to confirm it.
    async fn exit(&self, existing: &Position) -> Result<(), EngineError> {
        let index = self.profile.index;
        if existing.legs.is_empty() {
            self.ledger.remove(index).await?;
            return Ok(());
        }

        let mut exit_legs = Vec::with_capacity(existing.legs.len());
        for leg in &existing.legs {
            let mut exit = leg.inverted();
            let key = exit.key();
            let symbol = self.sequencer.resolve(&exit).await.map_err(|e| match e {
                EngineError::Validation(_) => {
                    EngineError::validation(format!("tradingSymbol not found for exit {key}"))
                }
                other => other,
            })?;
            exit.resolved_symbol = Some(symbol);
            exit_legs.push(exit);
        }

        if self.exits.is_busy().await? {
            return Err(EngineError::consistency(
                "Multi-leg channel busy. Aborting new entry.",
            ));
        }

        info!(%index, from = %existing.direction, legs = exit_legs.len(), "Submitting exit before entry");
        let id = self.exits.submit(&serde_json::to_string(&exit_legs)?).await?;
        self.store
            .hset(self.channel.owner(), &self.profile.pending_exit_key(), &id.to_string())
            .await?;

        let terminal = match self
            .exits
            .wait_terminal(id, self.timing.timeout, self.timing.poll)
            .await
        {
            Ok(terminal) => terminal,
            Err(e) => {
                if self.exits.withdraw_unclaimed(id).await? {
                    self.clear_pending_exit().await?;
                    warn!(%index, id = %id, "Unconfirmed exit withdrawn before dispatch");
                } else {
                    warn!(%index, id = %id, "Exit already dispatched; confirming it before any new exit");
                }
                return Err(e);
            }
        };
        self.conclude_exit(terminal).await
    }

    /// Resolves an exit left unconfirmed by an earlier cycle before anything
    /// else is submitted for this index.
    async fn settle_pending_exit(&self) -> Result<(), EngineError> {
        let key = self.profile.pending_exit_key();
        let Some(raw) = self.store.hget(self.channel.owner(), &key).await? else {
            return Ok(());
        };
        let id = Uuid::parse_str(raw.trim()).map_err(|_| {
            EngineError::validation(format!("{key} holds '{raw}', not an exit id"))
        })?;

        if self.exits.correlation().await? != Some(id) {
            return Err(EngineError::consistency(format!(
                "Exit {id} outcome unknown; check the {} position and clear {key}",
                self.profile.index
            )));
        }

        info!(index = %self.profile.index, id = %id, "Waiting on pending exit");
        let terminal = self
            .exits
            .wait_terminal(id, self.timing.timeout, self.timing.poll)
            .await?;
        self.conclude_exit(terminal).await
    }

    async fn conclude_exit(&self, terminal: Terminal) -> Result<(), EngineError> {
        let index = self.profile.index;
        if terminal.status != IntentStatus::Success {
            self.clear_pending_exit().await?;
            warn!(%index, status = %terminal.status, message = %terminal.message, "Exit did not succeed");
            return Err(EngineError::consistency("Exit failed. Aborting new entry."));
        }

        // The marker outlives a failed ledger write so the next cycle retries
        // the removal instead of exiting again.
        self.ledger.remove(index).await?;
        self.clear_pending_exit().await?;
        Ok(())
    }

    async fn clear_pending_exit(&self) -> Result<(), StoreError> {
        self.store
            .hdel(self.channel.owner(), &[self.profile.pending_exit_key().as_str()])
            .await?;
        Ok(())
    }

    async fn consume_signal(&self) -> Result<(), StoreError> {
        self.store
            .hset(&self.profile.signal_key, "status", SignalStatus::Consumed.as_str())
            .await
    }
}

/// Signal hash fields as written by upstream producers.
#[must_use]
pub fn signal_fields(status: SignalStatus, direction: Direction, ratio: Decimal) -> HashMap<String, String> {
    HashMap::from([
        ("status".to_string(), status.as_str().to_string()),
        ("signal".to_string(), direction.to_string()),
        ("pe_ce".to_string(), ratio.to_string()),
    ])
}
