//! Human-facing alerts emitted at arm, trigger, success and failure points.

use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::{Direction, InstrumentIndex, OptionType, Side};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    Armed {
        watcher: String,
        index: InstrumentIndex,
        level: Decimal,
    },
    Triggered {
        watcher: String,
        index: InstrumentIndex,
        level: Decimal,
        spot: Decimal,
    },
    IntentSucceeded {
        intent: String,
        detail: String,
    },
    IntentFailed {
        intent: String,
        reason: String,
    },
    OrderPlaced {
        symbol: String,
        side: Side,
        quantity: u32,
        order_id: String,
    },
    OrderRejected {
        symbol: String,
        side: Side,
        reason: String,
    },
    SquareOff {
        symbol: String,
        side: Side,
        quantity: u32,
        outcome: Result<String, String>,
    },
    CrossoverEntered {
        index: InstrumentIndex,
        direction: Direction,
        strike: Decimal,
        option_type: OptionType,
    },
    CrossoverFailed {
        index: InstrumentIndex,
        reason: String,
    },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Armed {
                watcher,
                index,
                level,
            } => write!(f, "[{watcher}] armed on {index} at {level}"),
            Self::Triggered {
                watcher,
                index,
                level,
                spot,
            } => write!(
                f,
                "[{watcher}] TRIGGERED on {index}: spot {spot} crossed {level}"
            ),
            Self::IntentSucceeded { intent, detail } => {
                write!(f, "[{intent}] executed: {detail}")
            }
            Self::IntentFailed { intent, reason } => write!(f, "[{intent}] FAILED: {reason}"),
            Self::OrderPlaced {
                symbol,
                side,
                quantity,
                order_id,
            } => write!(f, "Order placed {side} {symbol} x{quantity} (id {order_id})"),
            Self::OrderRejected {
                symbol,
                side,
                reason,
            } => write!(f, "Order rejected {side} {symbol}: {reason}"),
            Self::SquareOff {
                symbol,
                side,
                quantity,
                outcome,
            } => match outcome {
                Ok(order_id) => write!(
                    f,
                    "[SQUARE-OFF] {side} {symbol} x{quantity} placed (id {order_id})"
                ),
                Err(reason) => write!(
                    f,
                    "[SQUARE-OFF] {side} {symbol} x{quantity} FAILED: {reason}"
                ),
            },
            Self::CrossoverEntered {
                index,
                direction,
                strike,
                option_type,
            } => write!(
                f,
                "[{index} OI AUTO] {direction} entered SELL {}{option_type}",
                strike.normalize()
            ),
            Self::CrossoverFailed { index, reason } => {
                write!(f, "[{index} OI AUTO] FAILED: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_render_trigger() {
        let alert = Alert::Triggered {
            watcher: "LEVEL_CE".to_string(),
            index: InstrumentIndex::Nifty,
            level: dec!(26000),
            spot: dec!(26010),
        };
        assert_eq!(
            alert.to_string(),
            "[LEVEL_CE] TRIGGERED on NIFTY: spot 26010 crossed 26000"
        );
    }

    #[test]
    fn test_render_crossover_entry() {
        let alert = Alert::CrossoverEntered {
            index: InstrumentIndex::BankNifty,
            direction: Direction::Bearish,
            strike: dec!(55100.00),
            option_type: OptionType::Call,
        };
        assert_eq!(
            alert.to_string(),
            "[BANKNIFTY OI AUTO] BEARISH entered SELL 55100CE"
        );
    }

    #[test]
    fn test_render_squareoff_failure() {
        let alert = Alert::SquareOff {
            symbol: "NIFTY26JAN26100PE".to_string(),
            side: Side::Buy,
            quantity: 60,
            outcome: Err("margin".to_string()),
        };
        assert!(alert.to_string().ends_with("FAILED: margin"));
    }
}
