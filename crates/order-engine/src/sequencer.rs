//! Multi-leg execution with buy-before-sell ordering.
//!
//! Long legs go out first so the account never carries a naked short while a
//! spread is half built. A failing leg is recorded and its siblings still run.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use optdesk_broker::{OrderRequest, SessionGate};
use optdesk_core::{Alert, EngineError, InstrumentResolver, Leg, NotificationSink, Side};

use crate::notify::notify_quietly;
use crate::types::Outcome;

/// Result of one leg.
#[derive(Debug, Clone)]
pub struct LegResult {
    pub leg: Leg,
    pub outcome: Result<String, String>,
}

/// Per-leg results in execution order.
#[derive(Debug, Clone, Default)]
pub struct SequenceReport {
    pub results: Vec<LegResult>,
}

impl SequenceReport {
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_err()).count()
    }

    #[must_use]
    pub fn first_error(&self) -> Option<&str> {
        self.results
            .iter()
            .find_map(|r| r.outcome.as_ref().err().map(String::as_str))
    }

    #[must_use]
    pub fn order_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(String::as_str))
            .collect()
    }

    /// SUCCESS only when no leg failed.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self.first_error() {
            None => Outcome::success("All legs placed successfully"),
            Some(first) => Outcome::failed(format!(
                "Completed with {} errors. First error: {first}",
                self.error_count()
            )),
        }
    }
}

pub struct LegSequencer {
    resolver: Arc<dyn InstrumentResolver>,
    gate: SessionGate,
    notifier: Arc<dyn NotificationSink>,
    settle_delay: Duration,
}

impl LegSequencer {
    pub fn new(
        resolver: Arc<dyn InstrumentResolver>,
        gate: SessionGate,
        notifier: Arc<dyn NotificationSink>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            resolver,
            gate,
            notifier,
            settle_delay,
        }
    }

    /// Runs every BUY leg, waits `settle_delay`, then runs every SELL leg.
    ///
    /// The delay is skipped when either phase is empty. Emits one alert for
    /// the whole intent.
    pub async fn execute(&self, intent: &str, legs: &[Leg]) -> SequenceReport {
        let (buys, sells): (Vec<&Leg>, Vec<&Leg>) =
            legs.iter().partition(|leg| leg.side == Side::Buy);

        info!(intent, buys = buys.len(), sells = sells.len(), "Executing legs");

        let mut report = SequenceReport::default();
        for leg in &buys {
            report.results.push(self.run_leg(leg).await);
        }

        if !buys.is_empty() && !sells.is_empty() && !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        for leg in &sells {
            report.results.push(self.run_leg(leg).await);
        }

        let alert = match report.first_error() {
            None => Alert::IntentSucceeded {
                intent: intent.to_string(),
                detail: format!("{} legs placed", report.results.len()),
            },
            Some(_) => Alert::IntentFailed {
                intent: intent.to_string(),
                reason: report.outcome().message,
            },
        };
        notify_quietly(self.notifier.as_ref(), alert).await;

        report
    }

    async fn run_leg(&self, leg: &Leg) -> LegResult {
        let outcome = match self.place_leg(leg).await {
            Ok(order_id) => Ok(order_id),
            Err(e) => {
                warn!(leg = %leg.describe(), side = %leg.side, error = %e, "Leg failed");
                Err(e.to_string())
            }
        };
        LegResult {
            leg: leg.clone(),
            outcome,
        }
    }

    /// Resolves the leg's symbol when missing and places it at the broker.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for an unresolvable or malformed leg
    /// and [`EngineError::Gateway`] when the broker refuses it.
    pub async fn place_leg(&self, leg: &Leg) -> Result<String, EngineError> {
        let symbol = self.resolve(leg).await?;
        let order = OrderRequest::for_leg(leg, &symbol)?;
        let ack = self.gate.place(&order).await?;
        Ok(ack.order_id)
    }

    /// Tradable symbol of `leg`: the one it carries, else the instrument master's.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] on a lookup miss.
    pub async fn resolve(&self, leg: &Leg) -> Result<String, EngineError> {
        if let Some(symbol) = leg.resolved_symbol.as_deref().filter(|s| !s.is_empty()) {
            return Ok(symbol.to_string());
        }

        let key = leg.key();
        self.resolver
            .resolve(&key)
            .await?
            .ok_or_else(|| EngineError::validation(format!("tradingSymbol not found for {key}")))
    }
}
