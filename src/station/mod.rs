use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use std::ops::RangeInclusive;

use crate::error::StationError;

#[cfg(all(feature = "aht20", not(feature = "stub")))]
mod hardware;
#[cfg(all(feature = "aht20", not(feature = "stub")))]
pub use hardware::open;

// Compiled for tests too, so the stub sensors are checked without the feature.
#[cfg(any(feature = "stub", test))]
mod stub;
#[cfg(feature = "stub")]
pub use stub::open;

#[cfg(not(any(feature = "aht20", feature = "stub")))]
compile_error!("enable the `aht20` or `stub` feature");

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Temperature(pub f32);
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Humidity(pub f32);

/// One poll of a sensor. Both values always come from the same poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub temperature: Temperature,
    pub humidity: Humidity,
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    pub const TEMPERATURE_RANGE: RangeInclusive<f32> = -40.0..=120.0;
    pub const HUMIDITY_RANGE: RangeInclusive<f32> = 0.0..=100.0;

    /// Validates the values and stamps them with the current time.
    pub fn new(temperature: Temperature, humidity: Humidity) -> Result<Measurement> {
        Self::at(temperature, humidity, Utc::now())
    }

    pub fn at(
        temperature: Temperature,
        humidity: Humidity,
        timestamp: DateTime<Utc>,
    ) -> Result<Measurement> {
        if !Self::TEMPERATURE_RANGE.contains(&temperature.0) {
            return Err(anyhow!(
                "Temperature {} C is outside the plausible range {:?}",
                temperature.0,
                Self::TEMPERATURE_RANGE
            ));
        }

        if !Self::HUMIDITY_RANGE.contains(&humidity.0) {
            return Err(anyhow!(
                "Humidity {} % is outside the range {:?}",
                humidity.0,
                Self::HUMIDITY_RANGE
            ));
        }

        Ok(Measurement {
            temperature,
            humidity,
            timestamp,
        })
    }
}

pub trait ReadMeasurement {
    fn name(&self) -> &str;

    /// Performs one blocking bus transaction.
    fn read(&self) -> Result<Measurement, StationError>;

    /// Brings the device back to a known state after a failed read.
    fn recover(&self) -> Result<(), StationError> {
        Ok(())
    }
}

/// Every sensor polled by the station. The reference sensor, when present,
/// is only used to cross-check the primary one.
pub struct Sensors {
    pub primary: Box<dyn ReadMeasurement>,
    pub reference: Option<Box<dyn ReadMeasurement>>,
}
