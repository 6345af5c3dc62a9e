use anyhow::{bail, Context, Result};

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cross_check::Thresholds;

#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    pub i2c_bus_path: PathBuf,
    pub cross_check: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalConfig {
    pub sensors: SensorConfig,
    pub measurement_period: Duration,
    /// Zero disables the limit.
    pub max_consecutive_failures: u32,
    pub thresholds: Thresholds,
    pub db_path: Option<String>,
}

impl GlobalConfig {
    const I2C_DEV_PATH_ENV_VAR: &'static str = "I2C_DEV_PATH";
    const MEASUREMENT_PERIOD_ENV_VAR: &'static str = "MEASUREMENT_PERIOD_SECS";
    const MAX_FAILURES_ENV_VAR: &'static str = "MAX_CONSECUTIVE_FAILURES";
    const CROSS_CHECK_ENV_VAR: &'static str = "HTS221_CROSS_CHECK";
    const TEMPERATURE_THRESHOLD_ENV_VAR: &'static str = "CROSS_CHECK_TEMPERATURE_THRESHOLD";
    const HUMIDITY_THRESHOLD_ENV_VAR: &'static str = "CROSS_CHECK_HUMIDITY_THRESHOLD";
    const DB_FILE_PATH_ENV_VAR: &'static str = "DATABASE_URL";

    const DEFAULT_I2C_DEV_PATH: &'static str = "/dev/i2c-1";
    const DEFAULT_MEASUREMENT_PERIOD_SECS: u64 = 5;
    const DEFAULT_MAX_FAILURES: u32 = 5;

    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {e}");
        }

        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let i2c_bus_path = PathBuf::from(
            lookup(Self::I2C_DEV_PATH_ENV_VAR)
                .unwrap_or_else(|| Self::DEFAULT_I2C_DEV_PATH.to_string()),
        );

        let measurement_period_secs: u64 = parse_or(
            &lookup,
            Self::MEASUREMENT_PERIOD_ENV_VAR,
            Self::DEFAULT_MEASUREMENT_PERIOD_SECS,
        )?;
        if measurement_period_secs == 0 {
            bail!("{} must be at least 1", Self::MEASUREMENT_PERIOD_ENV_VAR);
        }
        let measurement_period = Duration::from_secs(measurement_period_secs);

        let max_consecutive_failures =
            parse_or(&lookup, Self::MAX_FAILURES_ENV_VAR, Self::DEFAULT_MAX_FAILURES)?;

        let cross_check = parse_or(&lookup, Self::CROSS_CHECK_ENV_VAR, false)?;

        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            temperature: parse_or(
                &lookup,
                Self::TEMPERATURE_THRESHOLD_ENV_VAR,
                defaults.temperature,
            )?,
            humidity: parse_or(&lookup, Self::HUMIDITY_THRESHOLD_ENV_VAR, defaults.humidity)?,
        };
        if !(thresholds.temperature >= 0.0 && thresholds.humidity >= 0.0) {
            bail!("Cross-check thresholds must be non-negative, got {thresholds:?}");
        }

        let db_path = lookup(Self::DB_FILE_PATH_ENV_VAR).filter(|path| !path.trim().is_empty());

        Ok(Self {
            sensors: SensorConfig {
                i2c_bus_path,
                cross_check,
            },
            measurement_period,
            max_consecutive_failures,
            thresholds,
            db_path,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value {raw:?} for {key}")),
        None => Ok(default),
    }
}
