//! Configuración del pipeline desde variables de entorno.
//!
//! Valores ausentes usan el default; valores presentes pero inválidos son
//! error (`ConfigError::Invalid`), nunca se ignoran en silencio. Los
//! intervalos deben ser > 0.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::retry::RetryPolicy;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub autoseal_interval: Duration,
    /// Ventana sin envíos tras la cual un batch abierto se sella.
    pub autoseal_inactivity: chrono::Duration,
    pub retention_interval: Duration,
    pub retention_max_age: chrono::Duration,
    pub reporting_interval: Duration,
    pub analytics_interval: Duration,
    pub telemetry_interval: Duration,
    pub telemetry_enabled: bool,
    pub comparison_max_attempts: u32,
    pub comparison_backoff: Duration,
    pub comparison_backoff_max: Duration,
    pub comparison_workers: usize,
    pub allow_overwrite: bool,
    /// Relee cada artifact tras escribirlo y compara su SHA-256.
    pub verify_artifacts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { autoseal_interval: Duration::from_secs(60),
               autoseal_inactivity: chrono::Duration::seconds(600),
               retention_interval: Duration::from_secs(3600),
               retention_max_age: chrono::Duration::days(90),
               reporting_interval: Duration::from_secs(30),
               analytics_interval: Duration::from_secs(300),
               telemetry_interval: Duration::from_secs(86_400),
               telemetry_enabled: false,
               comparison_max_attempts: 5,
               comparison_backoff: Duration::from_millis(200),
               comparison_backoff_max: Duration::from_millis(10_000),
               comparison_workers: 4,
               allow_overwrite: false,
               verify_artifacts: false }
    }
}

impl PipelineConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.comparison_max_attempts, self.comparison_backoff, self.comparison_backoff_max)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de valores arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let d = Self::default();
        let secs = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(Duration::from_secs(positive::<u64>(&lookup, key, default.as_secs())?))
        };
        let millis = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
            Ok(Duration::from_millis(positive::<u64>(&lookup, key, default_ms)?))
        };

        let inactivity = positive::<u32>(&lookup, "RF_AUTOSEAL_INACTIVITY_SECS", 600)?;
        let max_age_days = positive::<u32>(&lookup, "RF_RETENTION_MAX_AGE_DAYS", 90)?;

        let cfg = Self { autoseal_interval: secs("RF_AUTOSEAL_INTERVAL_SECS", d.autoseal_interval)?,
                         autoseal_inactivity: chrono::Duration::seconds(i64::from(inactivity)),
                         retention_interval: secs("RF_RETENTION_INTERVAL_SECS", d.retention_interval)?,
                         retention_max_age: chrono::Duration::days(i64::from(max_age_days)),
                         reporting_interval: secs("RF_REPORTING_INTERVAL_SECS", d.reporting_interval)?,
                         analytics_interval: secs("RF_ANALYTICS_INTERVAL_SECS", d.analytics_interval)?,
                         telemetry_interval: secs("RF_TELEMETRY_INTERVAL_SECS", d.telemetry_interval)?,
                         telemetry_enabled: flag(&lookup, "RF_TELEMETRY_ENABLED", d.telemetry_enabled)?,
                         comparison_max_attempts: positive::<u32>(&lookup,
                                                                  "RF_COMPARISON_MAX_ATTEMPTS",
                                                                  d.comparison_max_attempts)?,
                         comparison_backoff: millis("RF_COMPARISON_BACKOFF_MS", d.comparison_backoff)?,
                         comparison_backoff_max: millis("RF_COMPARISON_BACKOFF_MAX_MS", d.comparison_backoff_max)?,
                         comparison_workers: positive::<usize>(&lookup, "RF_COMPARISON_WORKERS", d.comparison_workers)?,
                         allow_overwrite: flag(&lookup, "RF_ALLOW_OVERWRITE", d.allow_overwrite)?,
                         verify_artifacts: flag(&lookup, "RF_VERIFY_ARTIFACTS", d.verify_artifacts)? };
        if cfg.comparison_backoff_max < cfg.comparison_backoff {
            return Err(ConfigError::Invalid { key: "RF_COMPARISON_BACKOFF_MAX_MS".into(),
                                              value: cfg.comparison_backoff_max.as_millis().to_string() });
        }
        Ok(cfg)
    }
}

fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
    where T: FromStr + PartialOrd + Default
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) if v > T::default() => Ok(v),
            _ => Err(ConfigError::Invalid { key: key.to_string(),
                                            value: raw }),
        },
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid { key: key.to_string(),
                                            value: raw }),
        },
    }
}
