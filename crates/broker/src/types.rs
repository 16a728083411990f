//! Broker-shaped order types.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use optdesk_core::{EngineError, ExecutionType, Leg, Side};

/// Exchange segment an order is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    /// Index derivatives.
    #[serde(rename = "nse_fo")]
    Fno,
    /// Cash equities.
    #[serde(rename = "nse_cm")]
    Cash,
}

/// Margin product code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Product {
    /// Carry-forward derivatives.
    Nrml,
    /// Intraday.
    Mis,
    /// Delivery equity.
    Cnc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit { price: Decimal },
}

impl OrderType {
    /// Broker price field: `0` for market orders.
    #[must_use]
    pub fn price(&self) -> Decimal {
        match self {
            Self::Market => Decimal::ZERO,
            Self::Limit { price } => *price,
        }
    }
}

/// A single order ready for the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub segment: Segment,
    pub product: Product,
    pub side: Side,
    pub quantity: u32,
    pub order_type: OrderType,
    /// Free-text tag echoed back in the order book (`LEG-<ms>`, `SQOFF-<ms>`, ...).
    pub tag: String,
}

impl OrderRequest {
    /// Derivatives order for a leg whose symbol is already resolved.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a LIMIT leg without a price.
    pub fn for_leg(leg: &Leg, symbol: &str) -> Result<Self, EngineError> {
        let order_type = match (leg.execution_type, leg.limit_price) {
            (ExecutionType::Market, _) => OrderType::Market,
            (ExecutionType::Limit, Some(price)) => OrderType::Limit { price },
            (ExecutionType::Limit, None) => {
                return Err(EngineError::validation(format!(
                    "LIMIT leg {} has no price",
                    leg.describe()
                )))
            }
        };

        Ok(Self {
            symbol: symbol.to_string(),
            segment: Segment::Fno,
            product: Product::Nrml,
            side: leg.side,
            quantity: leg.quantity,
            order_type,
            tag: tag("LEG"),
        })
    }

    /// Market derivatives order closing an open broker position.
    #[must_use]
    pub fn square_off(symbol: &str, side: Side, quantity: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            segment: Segment::Fno,
            product: Product::Nrml,
            side,
            quantity,
            order_type: OrderType::Market,
            tag: tag("SQOFF"),
        }
    }

    /// Market cash-segment order.
    #[must_use]
    pub fn equity(symbol: &str, side: Side, quantity: u32, product: Product) -> Self {
        Self {
            symbol: symbol.to_string(),
            segment: Segment::Cash,
            product,
            side,
            quantity,
            order_type: OrderType::Market,
            tag: tag("EQ"),
        }
    }
}

fn tag(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().timestamp_millis())
}

/// Broker acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
}

/// Whether the broker session can accept orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    NotReady,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use optdesk_core::{InstrumentIndex, OptionType};
    use rust_decimal_macros::dec;

    fn leg() -> Leg {
        Leg::market(
            InstrumentIndex::Nifty,
            NaiveDate::from_ymd_opt(2026, 1, 27).unwrap(),
            OptionType::Call,
            dec!(26000),
            Side::Buy,
            75,
        )
    }

    #[test]
    fn test_market_leg_maps_to_fno_nrml() {
        let order = OrderRequest::for_leg(&leg(), "NIFTY26JAN26000CE").unwrap();

        assert_eq!(order.segment, Segment::Fno);
        assert_eq!(order.product, Product::Nrml);
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.order_type.price(), Decimal::ZERO);
        assert!(order.tag.starts_with("LEG-"));
    }

    #[test]
    fn test_limit_leg_carries_price() {
        let limit = Leg {
            execution_type: ExecutionType::Limit,
            limit_price: Some(dec!(101.5)),
            ..leg()
        };
        let order = OrderRequest::for_leg(&limit, "X").unwrap();
        assert_eq!(order.order_type, OrderType::Limit { price: dec!(101.5) });
    }

    #[test]
    fn test_limit_without_price_is_rejected() {
        let limit = Leg {
            execution_type: ExecutionType::Limit,
            ..leg()
        };
        let err = OrderRequest::for_leg(&limit, "X").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_equity_order_routes_to_cash() {
        let order = OrderRequest::equity("RELIANCE-EQ", Side::Sell, 10, Product::Mis);
        assert_eq!(order.segment, Segment::Cash);
        assert_eq!(order.product, Product::Mis);
        assert!(order.tag.starts_with("EQ-"));
    }
}
