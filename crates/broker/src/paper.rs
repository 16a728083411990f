//! Paper trading gateway.
//!
//! Accepts orders without touching a real broker. Keeps an ordered log of
//! everything it accepted so callers can assert on sequencing, and can be
//! told to reject specific symbols or drop its session.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tracing::info;

use optdesk_core::Side;

use crate::gateway::{BrokerGateway, GatewayError};
use crate::types::{OrderAck, OrderRequest, SessionState};

/// One accepted paper order.
#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub order_id: String,
    pub request: OrderRequest,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct PaperBroker {
    ready: AtomicBool,
    next_id: AtomicU64,
    rejected: Mutex<HashSet<String>>,
    orders: Mutex<Vec<PaperOrder>>,
    latency: Duration,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBroker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            rejected: Mutex::new(HashSet::new()),
            orders: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        }
    }

    /// Adds a simulated round-trip delay to every `place_order`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Orders for `symbol` are rejected from now on.
    pub fn reject_symbol(&self, symbol: impl Into<String>) {
        self.rejected.lock().insert(symbol.into());
    }

    /// Snapshot of accepted orders in acceptance order.
    #[must_use]
    pub fn orders(&self) -> Vec<PaperOrder> {
        self.orders.lock().clone()
    }
}

#[async_trait]
impl BrokerGateway for PaperBroker {
    async fn session(&self) -> SessionState {
        if self.ready.load(Ordering::SeqCst) {
            SessionState::Ready
        } else {
            SessionState::NotReady
        }
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.rejected.lock().contains(&order.symbol) {
            return Err(GatewayError::rejected(format!(
                "Paper broker rejected {}",
                order.symbol
            )));
        }

        let order_id = format!("PAPER-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.orders.lock().push(PaperOrder {
            order_id: order_id.clone(),
            request: order.clone(),
            placed_at: Utc::now(),
        });

        info!(
            order_id = %order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = order.quantity,
            price = %order.order_type.price(),
            "Paper order accepted"
        );

        Ok(OrderAck { order_id })
    }

    async fn positions(&self) -> Result<serde_json::Value, GatewayError> {
        let mut net: Vec<(String, i64)> = Vec::new();
        for order in self.orders.lock().iter() {
            let signed = match order.request.side {
                Side::Buy => i64::from(order.request.quantity),
                Side::Sell => -i64::from(order.request.quantity),
            };
            match net.iter_mut().find(|(symbol, _)| *symbol == order.request.symbol) {
                Some((_, qty)) => *qty += signed,
                None => net.push((order.request.symbol.clone(), signed)),
            }
        }

        let data: Vec<_> = net
            .into_iter()
            .filter(|(_, qty)| *qty != 0)
            .map(|(symbol, qty)| json!({ "trdSym": symbol, "netQty": qty }))
            .collect();
        Ok(json!({ "stat": "Ok", "data": data }))
    }

    async fn order_report(&self) -> Result<serde_json::Value, GatewayError> {
        let data: Vec<_> = self
            .orders
            .lock()
            .iter()
            .map(|order| {
                json!({
                    "nOrdNo": order.order_id,
                    "trdSym": order.request.symbol,
                    "trnsTp": order.request.side,
                    "qty": order.request.quantity,
                    "prc": order.request.order_type.price(),
                    "ordSt": "complete",
                    "tag": order.request.tag,
                    "ordDtTm": order.placed_at.to_rfc3339(),
                })
            })
            .collect();
        Ok(json!({ "stat": "Ok", "data": data }))
    }

    async fn limits(&self) -> Result<serde_json::Value, GatewayError> {
        Ok(json!({ "stat": "Ok", "Net": "10000000", "MarginUsed": "0" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_ids_and_log() {
        let broker = PaperBroker::new();

        let first = broker
            .place_order(&OrderRequest::square_off("A", Side::Buy, 60))
            .await
            .unwrap();
        let second = broker
            .place_order(&OrderRequest::square_off("B", Side::Sell, 25))
            .await
            .unwrap();

        assert_eq!(first.order_id, "PAPER-1");
        assert_eq!(second.order_id, "PAPER-2");
        let symbols: Vec<_> = broker
            .orders()
            .into_iter()
            .map(|o| o.request.symbol)
            .collect();
        assert_eq!(symbols, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_rejected_symbol_is_not_logged() {
        let broker = PaperBroker::new();
        broker.reject_symbol("BAD");

        let err = broker
            .place_order(&OrderRequest::square_off("BAD", Side::Buy, 1))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Paper broker rejected BAD");
        assert!(broker.orders().is_empty());
    }

    #[tokio::test]
    async fn test_latency_delays_acceptance() {
        let broker = PaperBroker::new().with_latency(Duration::from_millis(40));
        let started = std::time::Instant::now();

        broker
            .place_order(&OrderRequest::square_off("A", Side::Buy, 1))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_positions_net_out() {
        let broker = PaperBroker::new();
        broker
            .place_order(&OrderRequest::square_off("A", Side::Sell, 60))
            .await
            .unwrap();
        broker
            .place_order(&OrderRequest::square_off("A", Side::Buy, 60))
            .await
            .unwrap();
        broker
            .place_order(&OrderRequest::square_off("B", Side::Sell, 25))
            .await
            .unwrap();

        let positions = broker.positions().await.unwrap();
        let data = positions["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["trdSym"], "B");
        assert_eq!(data[0]["netQty"], -25);

        let report = broker.order_report().await.unwrap();
        assert_eq!(report["data"].as_array().unwrap().len(), 3);
        assert_eq!(report["data"][0]["nOrdNo"], "PAPER-1");
    }
}
