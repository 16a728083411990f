//! Dashboard square-off requests: flatten a list of open contracts at market.

use std::sync::Arc;

use tracing::{error, info, warn};

use optdesk_broker::{OrderRequest, SessionGate};
use optdesk_core::{Alert, CoordinationStore, EngineError, NotificationSink, StoreError};

use crate::notify::notify_quietly;
use crate::types::SquareOffLeg;

pub const STATUS_FIELD: &str = "SQUAREOFF_STATUS";
pub const REQUEST_FIELD: &str = "SQUAREOFF_REQUEST";

/// Values of [`STATUS_FIELD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquareOffStatus {
    Requested,
    Processing,
    Done,
    Failed,
}

impl SquareOffStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Processing => "PROCESSING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

/// What one square-off tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquareOffTick {
    Idle,
    /// Every leg was attempted; per-leg order id or error.
    Done(Vec<(SquareOffLeg, Result<String, String>)>),
    Failed(String),
}

pub struct SquareOffDesk {
    store: Arc<dyn CoordinationStore>,
    owner: String,
    gate: SessionGate,
    notifier: Arc<dyn NotificationSink>,
}

impl SquareOffDesk {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        owner: impl Into<String>,
        gate: SessionGate,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            owner: owner.into(),
            gate,
            notifier,
        }
    }

    /// Handles a pending square-off request, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store fails.
    pub async fn tick(&self) -> Result<SquareOffTick, StoreError> {
        let status = self.store.hget(&self.owner, STATUS_FIELD).await?;
        if status.as_deref() != Some(SquareOffStatus::Requested.as_str()) {
            return Ok(SquareOffTick::Idle);
        }
        self.set_status(SquareOffStatus::Processing).await?;

        let legs = match self.read_request().await {
            Ok(legs) => legs,
            Err(EngineError::Store(e)) => return Err(e),
            Err(e) => {
                error!(owner = %self.owner, error = %e, "Square-off request unusable");
                self.set_status(SquareOffStatus::Failed).await?;
                self.store.hdel(&self.owner, &[REQUEST_FIELD]).await?;
                return Ok(SquareOffTick::Failed(e.to_string()));
            }
        };

        info!(owner = %self.owner, legs = legs.len(), "Squaring off");
        let mut results = Vec::with_capacity(legs.len());
        for leg in legs {
            let outcome = self.close(&leg).await;
            results.push((leg, outcome));
        }

        self.set_status(SquareOffStatus::Done).await?;
        self.store.hdel(&self.owner, &[REQUEST_FIELD]).await?;
        Ok(SquareOffTick::Done(results))
    }

    async fn read_request(&self) -> Result<Vec<SquareOffLeg>, EngineError> {
        let raw = self
            .store
            .hget(&self.owner, REQUEST_FIELD)
            .await?
            .ok_or_else(|| EngineError::validation(format!("No {REQUEST_FIELD} found")))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn close(&self, leg: &SquareOffLeg) -> Result<String, String> {
        let order = OrderRequest::square_off(&leg.trading_symbol, leg.side, leg.quantity);
        let outcome = match self.gate.place(&order).await {
            Ok(ack) => Ok(ack.order_id),
            Err(e) => {
                warn!(symbol = %leg.trading_symbol, side = %leg.side, error = %e, "Square-off leg failed");
                Err(e.to_string())
            }
        };

        notify_quietly(
            self.notifier.as_ref(),
            Alert::SquareOff {
                symbol: leg.trading_symbol.clone(),
                side: leg.side,
                quantity: leg.quantity,
                outcome: outcome.clone(),
            },
        )
        .await;
        outcome
    }

    async fn set_status(&self, status: SquareOffStatus) -> Result<(), StoreError> {
        self.store.hset(&self.owner, STATUS_FIELD, status.as_str()).await
    }
}
