use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::InstrumentIndex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub ledger: LedgerConfig,
    pub notifier: NotifierConfig,
    pub crossover: Vec<CrossoverProfileConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Account id whose hash carries the intent channels.
    pub owner: String,
    pub poll_interval_ms: u64,
    /// Pause between the BUY and SELL phases of a multi-leg intent.
    pub settle_delay_ms: u64,
    pub exit_timeout_ms: u64,
    pub exit_poll_ms: u64,
    /// Extra sleep after a tick fails on the store.
    pub error_backoff_ms: u64,
    /// Hash holding the instrument master.
    pub instrument_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// POST target; alerts only go to the log when unset.
    pub webhook_url: Option<String>,
    pub chat_id: Option<String>,
    pub timeout_secs: u64,
}

/// One auto-traded index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossoverProfileConfig {
    pub index: InstrumentIndex,
    pub lot_size: u32,
    pub signal_key: String,
    pub expiry: NaiveDate,
    #[serde(default = "default_strike_step")]
    pub strike_step: Decimal,
    /// Prefix of the per-index owner fields (`""` for NIFTY, `"BN_"` for BANKNIFTY).
    #[serde(default)]
    pub key_prefix: String,
}

fn default_strike_step() -> Decimal {
    Decimal::ONE_HUNDRED
}

fn default_expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 27).unwrap_or_default()
}

impl EngineConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    #[must_use]
    pub const fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    #[must_use]
    pub const fn exit_poll(&self) -> Duration {
        Duration::from_millis(self.exit_poll_ms)
    }

    #[must_use]
    pub const fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            owner: "PAPER".to_string(),
            poll_interval_ms: 3_000,
            settle_delay_ms: 1_000,
            exit_timeout_ms: 15_000,
            exit_poll_ms: 500,
            error_backoff_ms: 5_000,
            instrument_hash: "INSTR_OPT".to_string(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("oi_live_positions.json"),
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            chat_id: None,
            timeout_secs: 5,
        }
    }
}

impl CrossoverProfileConfig {
    #[must_use]
    pub fn nifty() -> Self {
        Self {
            index: InstrumentIndex::Nifty,
            lot_size: 60,
            signal_key: "NIFTY_OI_SIGNAL".to_string(),
            expiry: default_expiry(),
            strike_step: default_strike_step(),
            key_prefix: String::new(),
        }
    }

    #[must_use]
    pub fn bank_nifty() -> Self {
        Self {
            index: InstrumentIndex::BankNifty,
            lot_size: 25,
            signal_key: "BANKNIFTY_OI_SIGNAL".to_string(),
            expiry: default_expiry(),
            strike_step: default_strike_step(),
            key_prefix: "BN_".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            ledger: LedgerConfig::default(),
            notifier: NotifierConfig::default(),
            crossover: vec![
                CrossoverProfileConfig::nifty(),
                CrossoverProfileConfig::bank_nifty(),
            ],
        }
    }
}
