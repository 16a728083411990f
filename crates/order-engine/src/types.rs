//! Payload and result types for the order engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use optdesk_broker::Product;
use optdesk_core::{Direction, InstrumentIndex, IntentStatus, Leg, Side};

/// Terminal status plus the message written next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: IntentStatus,
    pub message: String,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: IntentStatus::Success,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: IntentStatus::Failed,
            message: message.into(),
        }
    }

    pub fn ignored(message: impl Into<String>) -> Self {
        Self {
            status: IntentStatus::Ignored,
            message: message.into(),
        }
    }
}

/// The single open directional position for an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub index: InstrumentIndex,
    pub direction: Direction,
    pub opened_at: DateTime<Utc>,
    /// Sold option without a protective long.
    pub naked: bool,
    pub hedged: bool,
    pub legs: Vec<Leg>,
}

/// Entry intent published by the crossover signal engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossoverOrder {
    #[serde(flatten)]
    pub leg: Leg,
    pub direction: Direction,
    pub spot: Decimal,
    #[serde(rename = "pe_ce")]
    pub ratio: Decimal,
    pub strategy: String,
}

/// Cash-segment order posted by the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityOrder {
    pub symbol: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub qty: u32,
    pub side: Side,
    pub product: Product,
    #[serde(rename = "tradingSymbol", default, skip_serializing_if = "Option::is_none")]
    pub trading_symbol: Option<String>,
    /// Producer-side state; only `requested` payloads are executed.
    #[serde(default)]
    pub state: String,
}

impl EquityOrder {
    #[must_use]
    pub fn broker_symbol(&self) -> &str {
        self.trading_symbol.as_deref().unwrap_or(&self.symbol)
    }
}

/// One line of a square-off request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareOffLeg {
    #[serde(rename = "tradingSymbol", alias = "TradingSymbol")]
    pub trading_symbol: String,
    #[serde(rename = "Quantity", deserialize_with = "lenient_u32")]
    pub quantity: u32,
    #[serde(rename = "Side")]
    pub side: Side,
}

/// Dashboards write quantities both as numbers and as strings.
fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optdesk_core::OptionType;
    use rust_decimal_macros::dec;

    #[test]
    fn test_crossover_order_matches_published_shape() {
        let raw = r#"{"Index":"NIFTY","OrderType":"NRML","Qty":60,"Side":"SELL",
            "Expiry":"2026-01-27","Strike":26100,"OptionType":"PE",
            "strategy":"OI_CROSSOVER","spot":26123.4,"pe_ce":1.21,"direction":"BULLISH"}"#;
        let order: CrossoverOrder = serde_json::from_str(raw).unwrap();

        assert_eq!(order.leg.index, InstrumentIndex::Nifty);
        assert_eq!(order.leg.option_type, OptionType::Put);
        assert_eq!(order.leg.strike, dec!(26100));
        assert_eq!(order.leg.quantity, 60);
        assert_eq!(order.direction, Direction::Bullish);
        assert_eq!(order.ratio, dec!(1.21));
    }

    #[test]
    fn test_squareoff_leg_accepts_string_quantity() {
        let raw = r#"[{"TradingSymbol":"NIFTY26JAN26100PE","Quantity":"60","Side":"BUY"}]"#;
        let legs: Vec<SquareOffLeg> = serde_json::from_str(raw).unwrap();

        assert_eq!(legs[0].trading_symbol, "NIFTY26JAN26100PE");
        assert_eq!(legs[0].quantity, 60);
        assert_eq!(legs[0].side, Side::Buy);
    }

    #[test]
    fn test_equity_symbol_fallback() {
        let raw = r#"{"symbol":"RELIANCE","qty":5,"side":"buy","product":"MIS","state":"requested"}"#;
        let order: EquityOrder = serde_json::from_str(raw).unwrap();

        assert_eq!(order.broker_symbol(), "RELIANCE");
        assert_eq!(order.side, Side::Buy);
        assert_eq!(order.product, Product::Mis);
    }
}
