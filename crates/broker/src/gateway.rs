//! Broker execution gateway and the session gate in front of it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use optdesk_core::EngineError;

use crate::types::{OrderAck, OrderRequest, SessionState};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Session is not logged in or was invalidated.
    #[error("Client not authenticated")]
    NotAuthenticated,

    /// Broker answered with an error shape; `description` is its text.
    #[error("{description}")]
    Rejected { description: String },

    #[error("broker transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn rejected(description: impl Into<String>) -> Self {
        Self::Rejected {
            description: description.into(),
        }
    }
}

impl From<GatewayError> for EngineError {
    fn from(err: GatewayError) -> Self {
        Self::Gateway(err.to_string())
    }
}

/// Executes and queries orders at the brokerage.
///
/// Read-side calls return the broker's own JSON shape; reshaping it is the
/// caller's business.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn session(&self) -> SessionState;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError>;

    async fn positions(&self) -> Result<serde_json::Value, GatewayError>;

    async fn order_report(&self) -> Result<serde_json::Value, GatewayError>;

    async fn limits(&self) -> Result<serde_json::Value, GatewayError>;
}

/// Checks the broker session before every order so nothing is sent on a
/// dead login.
#[derive(Clone)]
pub struct SessionGate {
    inner: Arc<dyn BrokerGateway>,
}

impl SessionGate {
    pub fn new(inner: Arc<dyn BrokerGateway>) -> Self {
        Self { inner }
    }

    /// Places `order` if the session is ready.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::NotAuthenticated`] without contacting the broker
    /// when the session is down, otherwise whatever the broker returned.
    pub async fn place(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        if self.inner.session().await == SessionState::NotReady {
            warn!(symbol = %order.symbol, "Broker session not ready, order not sent");
            return Err(GatewayError::NotAuthenticated);
        }

        let ack = self.inner.place_order(order).await?;
        info!(
            order_id = %ack.order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity,
            tag = %order.tag,
            "Order accepted"
        );
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::PaperBroker;
    use optdesk_core::Side;

    #[tokio::test]
    async fn test_gate_blocks_when_not_ready() {
        let broker = Arc::new(PaperBroker::new());
        broker.set_ready(false);
        let gate = SessionGate::new(broker.clone());

        let err = gate
            .place(&OrderRequest::square_off("NIFTY26JAN26100PE", Side::Buy, 60))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::NotAuthenticated));
        assert_eq!(err.to_string(), "Client not authenticated");
        assert!(broker.orders().is_empty());
    }

    #[tokio::test]
    async fn test_gate_passes_through_when_ready() {
        let broker = Arc::new(PaperBroker::new());
        let gate = SessionGate::new(broker.clone());

        let ack = gate
            .place(&OrderRequest::square_off("NIFTY26JAN26100PE", Side::Buy, 60))
            .await
            .unwrap();

        assert_eq!(ack.order_id, "PAPER-1");
        assert_eq!(broker.orders().len(), 1);
    }

    #[test]
    fn test_gateway_error_converts_with_description() {
        let err: EngineError = GatewayError::rejected("RMS: margin exceeds").into();
        assert_eq!(err.to_string(), "RMS: margin exceeds");
    }
}
