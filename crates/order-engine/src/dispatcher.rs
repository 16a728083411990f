//! The per-owner intent dispatcher.
//!
//! One pass claims whatever is requested on the single, multi, level and
//! equity channels, executes it, and writes the terminal status back. Square-off
//! requests ride along on the same pass.

use std::sync::Arc;

use tracing::{debug, info};

use optdesk_broker::{OrderRequest, SessionGate};
use optdesk_core::{
    Alert, CoordinationStore, EngineError, Leg, NotificationSink, StoreError,
};

use crate::channel::{ChannelKeys, Claim, RequestChannel};
use crate::notify::notify_quietly;
use crate::sequencer::LegSequencer;
use crate::squareoff::{SquareOffDesk, SquareOffTick};
use crate::types::{EquityOrder, Outcome};
use crate::watcher::{EdgeCondition, Falling, Rising, WatcherKeys};

/// Terminal outcomes written during one pass, by channel name.
pub type DispatchReport = Vec<(String, Outcome)>;

pub struct Dispatcher {
    store: Arc<dyn CoordinationStore>,
    owner: String,
    single: RequestChannel,
    multi: RequestChannel,
    level_ce: RequestChannel,
    level_pe: RequestChannel,
    equity: RequestChannel,
    sequencer: Arc<LegSequencer>,
    gate: SessionGate,
    notifier: Arc<dyn NotificationSink>,
    squareoff: SquareOffDesk,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        owner: impl Into<String>,
        sequencer: Arc<LegSequencer>,
        gate: SessionGate,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let owner = owner.into();
        let channel = |keys| RequestChannel::new(store.clone(), owner.clone(), keys);
        Self {
            single: channel(ChannelKeys::single()),
            multi: channel(ChannelKeys::multi()),
            level_ce: channel(Rising::channel_keys()),
            level_pe: channel(Falling::channel_keys()),
            equity: channel(ChannelKeys::equity()),
            squareoff: SquareOffDesk::new(store.clone(), owner.clone(), gate.clone(), notifier.clone()),
            store,
            owner,
            sequencer,
            gate,
            notifier,
        }
    }

    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// One dispatch pass over every channel.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] as soon as the store fails; channels already
    /// handled in this pass keep their written status.
    pub async fn tick(&self) -> Result<DispatchReport, StoreError> {
        let mut report = DispatchReport::new();

        if let Some(outcome) = self.single.process(|claim| self.run_single(claim)).await? {
            report.push((self.single.name().to_string(), outcome));
        }

        // Exclusive so an unclaimed exit can be withdrawn by its producer.
        if let Some(outcome) = self
            .multi
            .process_exclusive(|claim| self.run_legs(self.multi.keys(), claim))
            .await?
        {
            report.push((self.multi.name().to_string(), outcome));
        }

        if let Some(outcome) = self
            .level_ce
            .process(|claim| self.run_legs(self.level_ce.keys(), claim))
            .await?
        {
            WatcherKeys::for_edge::<Rising>()
                .reset(self.store.as_ref(), &self.owner)
                .await?;
            report.push((self.level_ce.name().to_string(), outcome));
        }

        if let Some(outcome) = self
            .level_pe
            .process(|claim| self.run_legs(self.level_pe.keys(), claim))
            .await?
        {
            WatcherKeys::for_edge::<Falling>()
                .reset(self.store.as_ref(), &self.owner)
                .await?;
            report.push((self.level_pe.name().to_string(), outcome));
        }

        if let Some(outcome) = self
            .equity
            .process_exclusive(|claim| self.run_equity(claim))
            .await?
        {
            report.push((self.equity.name().to_string(), outcome));
        }

        match self.squareoff.tick().await? {
            SquareOffTick::Idle => {}
            SquareOffTick::Done(results) => {
                let failed = results.iter().filter(|(_, r)| r.is_err()).count();
                debug!(owner = %self.owner, legs = results.len(), failed, "Square-off finished");
            }
            SquareOffTick::Failed(reason) => {
                debug!(owner = %self.owner, reason = %reason, "Square-off failed");
            }
        }

        Ok(report)
    }

    async fn run_single(&self, claim: Claim) -> Result<Outcome, EngineError> {
        let legs = parse_legs(self.single.keys(), claim)?;
        let Some(leg) = legs.into_iter().next() else {
            return Err(EngineError::validation("No leg found"));
        };

        let report = self.sequencer.execute(self.single.name(), std::slice::from_ref(&leg)).await;
        match report.results.into_iter().next().map(|r| r.outcome) {
            Some(Ok(order_id)) => Ok(Outcome::success(format!("Order Placed: {order_id}"))),
            Some(Err(reason)) => Ok(Outcome::failed(reason)),
            None => Err(EngineError::validation("No leg found")),
        }
    }

    async fn run_legs(&self, keys: &ChannelKeys, claim: Claim) -> Result<Outcome, EngineError> {
        let legs = parse_legs(keys, claim)?;
        if legs.is_empty() {
            return Err(EngineError::validation("No legs found"));
        }
        Ok(self.sequencer.execute(&keys.name, &legs).await.outcome())
    }

    async fn run_equity(&self, claim: Claim) -> Result<Outcome, EngineError> {
        let raw = claim.payload.ok_or_else(|| {
            EngineError::validation(format!("No {} found", self.equity.keys().payload))
        })?;
        let order: EquityOrder = serde_json::from_str(&raw)?;
        if order.state != "requested" {
            return Ok(Outcome::ignored(format!(
                "Equity order not requested (state: {})",
                order.state
            )));
        }

        let symbol = order.broker_symbol().to_string();
        let request = OrderRequest::equity(&symbol, order.side, order.qty, order.product);
        info!(owner = %self.owner, %symbol, side = %order.side, qty = order.qty, "Placing equity order");

        match self.gate.place(&request).await {
            Ok(ack) => {
                notify_quietly(
                    self.notifier.as_ref(),
                    Alert::OrderPlaced {
                        symbol,
                        side: order.side,
                        quantity: order.qty,
                        order_id: ack.order_id.clone(),
                    },
                )
                .await;
                Ok(Outcome::success(format!("Order Placed: {}", ack.order_id)))
            }
            Err(e) => {
                notify_quietly(
                    self.notifier.as_ref(),
                    Alert::OrderRejected {
                        symbol,
                        side: order.side,
                        reason: e.to_string(),
                    },
                )
                .await;
                Err(e.into())
            }
        }
    }
}

/// Decodes a leg-list payload; a missing payload is a validation failure.
fn parse_legs(keys: &ChannelKeys, claim: Claim) -> Result<Vec<Leg>, EngineError> {
    let raw = claim
        .payload
        .ok_or_else(|| EngineError::validation(format!("No {} found", keys.payload)))?;
    Ok(serde_json::from_str(&raw)?)
}
