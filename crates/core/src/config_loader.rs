use std::path::Path;

use crate::config::AppConfig;
use anyhow::{ensure, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

const ENV_PREFIX: &str = "OPTDESK_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration from built-in defaults, `config/Config.toml`, and
    /// `OPTDESK_`-prefixed environment variables (nested keys split on `__`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a value has the wrong type.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Same layering as [`ConfigLoader::load`] with an explicit TOML file.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a value has the wrong type.
    pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        validate(&config)?;
        Ok(config)
    }
}

/// Rejects values that would stall or panic the actor loops.
fn validate(config: &AppConfig) -> Result<()> {
    let engine = &config.engine;
    ensure!(!engine.owner.trim().is_empty(), "engine.owner must not be empty");
    ensure!(engine.poll_interval_ms > 0, "engine.poll_interval_ms must be positive");
    ensure!(engine.exit_poll_ms > 0, "engine.exit_poll_ms must be positive");
    ensure!(
        engine.exit_timeout_ms >= engine.exit_poll_ms,
        "engine.exit_timeout_ms must be at least engine.exit_poll_ms"
    );

    for profile in &config.crossover {
        ensure!(profile.lot_size > 0, "crossover {}: lot_size must be positive", profile.index);
        ensure!(
            profile.strike_step > rust_decimal::Decimal::ZERO,
            "crossover {}: strike_step must be positive",
            profile.index
        );
    }

    let mut prefixes: Vec<&str> = config.crossover.iter().map(|p| p.key_prefix.as_str()).collect();
    prefixes.sort_unstable();
    prefixes.dedup();
    ensure!(
        prefixes.len() == config.crossover.len(),
        "crossover profiles must use distinct key_prefix values"
    );
    Ok(())
}
