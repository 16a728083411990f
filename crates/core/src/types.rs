//! Wire-level domain types shared by producers and the engine.
//!
//! Field names follow the JSON layout producers already write into the
//! coordination store (`Index`, `Expiry`, `OptionType`, ...), so a leg list
//! written by a dashboard and read back by the dispatcher is byte-compatible.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Tradable underlying index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentIndex {
    Nifty,
    BankNifty,
}

impl InstrumentIndex {
    /// Global scalar key holding the live spot price for this index.
    #[must_use]
    pub const fn spot_key(self) -> &'static str {
        match self {
            Self::Nifty => "NF_SPOT",
            Self::BankNifty => "BN_SPOT",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Nifty => "NIFTY",
            Self::BankNifty => "BANKNIFTY",
        }
    }
}

impl fmt::Display for InstrumentIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentIndex {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NIFTY" => Ok(Self::Nifty),
            "BANKNIFTY" => Ok(Self::BankNifty),
            other => Err(EngineError::Validation(format!("unknown index '{other}'"))),
        }
    }
}

/// Option right as quoted on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    #[serde(rename = "CE", alias = "ce")]
    Call,
    #[serde(rename = "PE", alias = "pe")]
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "CE"),
            Self::Put => write!(f, "PE"),
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    #[serde(alias = "buy", alias = "Buy")]
    Buy,
    #[serde(alias = "sell", alias = "Sell")]
    Sell,
}

impl Side {
    /// The side that closes a position opened with `self`.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// How a leg is priced at the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionType {
    #[default]
    Market,
    Limit,
}

/// One buy/sell instruction for a specific option contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    #[serde(rename = "Index")]
    pub index: InstrumentIndex,
    #[serde(rename = "Expiry")]
    pub expiry: NaiveDate,
    #[serde(rename = "OptionType")]
    pub option_type: OptionType,
    #[serde(rename = "Strike")]
    pub strike: Decimal,
    #[serde(rename = "Side")]
    pub side: Side,
    #[serde(rename = "Qty")]
    pub quantity: u32,
    #[serde(rename = "ExecutionType", default)]
    pub execution_type: ExecutionType,
    #[serde(rename = "LimitPrice", default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    #[serde(rename = "tradingSymbol", default, skip_serializing_if = "Option::is_none")]
    pub resolved_symbol: Option<String>,
}

impl Leg {
    /// Market leg without a resolved symbol.
    #[must_use]
    pub fn market(
        index: InstrumentIndex,
        expiry: NaiveDate,
        option_type: OptionType,
        strike: Decimal,
        side: Side,
        quantity: u32,
    ) -> Self {
        Self {
            index,
            expiry,
            option_type,
            strike,
            side,
            quantity,
            execution_type: ExecutionType::Market,
            limit_price: None,
            resolved_symbol: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> LegKey {
        LegKey {
            index: self.index,
            expiry: self.expiry,
            option_type: self.option_type,
            strike: self.strike,
        }
    }

    /// Copy of this leg with the side flipped and the symbol cleared, used to
    /// close whatever this leg opened.
    #[must_use]
    pub fn inverted(&self) -> Self {
        Self {
            side: self.side.inverse(),
            resolved_symbol: None,
            ..self.clone()
        }
    }

    /// Short human-readable description, e.g. `NIFTY 26100PE 2026-01-27`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{} {}{} {}",
            self.index,
            self.strike.normalize(),
            self.option_type,
            self.expiry
        )
    }
}

/// Lookup key into the instrument master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LegKey {
    pub index: InstrumentIndex,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub strike: Decimal,
}

impl fmt::Display for LegKey {
    /// `INDEX_YYYY-MM-DD_CE_STRIKE`, the normalized instrument master field.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.index,
            self.expiry.format("%Y-%m-%d"),
            self.option_type,
            self.strike.normalize()
        )
    }
}

/// Lifecycle status written next to every intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentStatus {
    Processing,
    Success,
    Failed,
    Ignored,
    Waiting,
    Cancelled,
}

impl IntentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Ignored => "IGNORED",
            Self::Waiting => "WAITING",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Terminal statuses are the ones a poller may stop waiting on.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Ignored | Self::Cancelled
        )
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(Self::Processing),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "IGNORED" => Ok(Self::Ignored),
            "WAITING" => Ok(Self::Waiting),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!("unknown status '{other}'"))),
        }
    }
}

/// Value of a channel's request flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFlag {
    Requested,
    Processing,
    Fetched,
    /// Claimed exclusively but the payload was blank.
    FailedNoPayload,
}

impl RequestFlag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Processing => "processing",
            Self::Fetched => "fetched",
            Self::FailedNoPayload => "failed_no_payload",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "requested" => Some(Self::Requested),
            "processing" => Some(Self::Processing),
            "fetched" => Some(Self::Fetched),
            "failed_no_payload" => Some(Self::FailedNoPayload),
            _ => None,
        }
    }
}

/// Directional bias of a crossover signal or position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Bullish,
    Bearish,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "BULLISH"),
            Self::Bearish => write!(f, "BEARISH"),
        }
    }
}

impl FromStr for Direction {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BULLISH" => Ok(Self::Bullish),
            "BEARISH" => Ok(Self::Bearish),
            other => Err(EngineError::Validation(format!(
                "unknown direction '{other}'"
            ))),
        }
    }
}

/// Lifecycle of an upstream crossover signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStatus {
    New,
    Notified,
    Consumed,
    FailedNoSpot,
}

impl SignalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Notified => "NOTIFIED",
            Self::Consumed => "CONSUMED",
            Self::FailedNoSpot => "FAILED_NO_SPOT",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "NEW" => Some(Self::New),
            "NOTIFIED" => Some(Self::Notified),
            "CONSUMED" => Some(Self::Consumed),
            "FAILED_NO_SPOT" => Some(Self::FailedNoSpot),
            _ => None,
        }
    }

    /// Only fresh signals may open a trade.
    #[must_use]
    pub const fn is_actionable(self) -> bool {
        matches!(self, Self::New | Self::Notified)
    }
}

/// Upstream open-interest crossover signal as stored in its hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub status: SignalStatus,
    pub direction: Direction,
    pub ratio: Decimal,
}

impl Signal {
    /// Parses the `status`/`signal`/`pe_ce` fields of a signal hash.
    ///
    /// Returns `Ok(None)` when the hash is empty.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a field is missing or malformed.
    pub fn from_fields(
        fields: &std::collections::HashMap<String, String>,
    ) -> Result<Option<Self>, EngineError> {
        if fields.is_empty() {
            return Ok(None);
        }

        let raw_status = fields.get("status").map(String::as_str).unwrap_or_default();
        let status = SignalStatus::parse(raw_status)
            .ok_or_else(|| EngineError::Validation(format!("bad signal status '{raw_status}'")))?;
        let direction = fields
            .get("signal")
            .ok_or_else(|| EngineError::Validation("signal direction missing".to_string()))?
            .parse()?;
        let ratio = match fields.get("pe_ce") {
            Some(raw) => raw
                .trim()
                .parse::<Decimal>()
                .map_err(|e| EngineError::Validation(format!("bad pe_ce '{raw}': {e}")))?,
            None => Decimal::ZERO,
        };

        Ok(Some(Self {
            status,
            direction,
            ratio,
        }))
    }
}
