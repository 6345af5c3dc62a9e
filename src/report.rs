use anyhow::Result;
use chrono::Local;

use std::io::Write;
use std::time::Duration;

use crate::cross_check::Comparison;
use crate::station::Measurement;

/// Writes the human-readable lines of the station, one per reading.
pub struct Reporter<W> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Reporter { out }
    }

    pub fn banner(&mut self, sensor: &str, period: Duration) -> Result<()> {
        writeln!(self.out, "Weather station - {sensor}")?;
        writeln!(
            self.out,
            "Reading every {}s, press Ctrl+C to stop",
            period.as_secs()
        )?;
        writeln!(self.out)?;
        Ok(())
    }

    pub fn measurement(&mut self, sensor: &str, measurement: &Measurement) -> Result<()> {
        writeln!(self.out, "{}", format_measurement(sensor, measurement))?;
        Ok(())
    }

    pub fn comparison(
        &mut self,
        sensor: &str,
        measurement: &Measurement,
        comparison: &Comparison,
    ) -> Result<()> {
        writeln!(
            self.out,
            "{} (delta {:.2} °C, {:.2} %RH)",
            format_measurement(sensor, measurement),
            comparison.temperature_delta,
            comparison.humidity_delta
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

pub fn format_measurement(sensor: &str, measurement: &Measurement) -> String {
    format!(
        "[{}] {}: temperature {:.1} °C, humidity {:.1} %RH",
        measurement
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S"),
        sensor,
        measurement.temperature.0,
        measurement.humidity.0
    )
}
