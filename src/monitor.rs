use anyhow::{bail, Result};
use tokio::select;
use tokio::time::{self, MissedTickBehavior};

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use crate::cross_check::{Comparison, Thresholds};
use crate::db::Journal;
use crate::error::StationError;
use crate::report::Reporter;
use crate::station::Sensors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Reported,
    Skipped,
}

/// Polls the sensors and reports each reading.
pub struct Monitor<W> {
    sensors: Sensors,
    reporter: Reporter<W>,
    thresholds: Thresholds,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
    journal: Option<Journal>,
}

impl<W: Write> Monitor<W> {
    pub fn new(
        sensors: Sensors,
        reporter: Reporter<W>,
        thresholds: Thresholds,
        max_consecutive_failures: u32,
    ) -> Self {
        Monitor {
            sensors,
            reporter,
            thresholds,
            max_consecutive_failures,
            consecutive_failures: 0,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Polls once per `period` until `shutdown` resolves or the failure
    /// limit is reached.
    pub async fn run(&mut self, period: Duration, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut measurement_timer = time::interval(period);
        measurement_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("Shutdown requested");
                    return Ok(());
                }
                _ = measurement_timer.tick() => {
                    log::trace!("Measuring");
                    self.cycle()?;
                }
            }
        }
    }

    pub fn cycle(&mut self) -> Result<CycleOutcome> {
        let primary = match self.sensors.primary.read() {
            Ok(measurement) => measurement,
            Err(e) => {
                self.record_failure(e)?;
                return Ok(CycleOutcome::Skipped);
            }
        };
        self.consecutive_failures = 0;

        let primary_name = self.sensors.primary.name();
        self.reporter.measurement(primary_name, &primary)?;
        if let Some(journal) = &mut self.journal {
            if let Err(e) = journal.record(primary_name, &primary) {
                log::warn!("Unable to journal {primary_name} measurement: {e:#}");
            }
        }

        if let Some(reference) = &self.sensors.reference {
            match reference.read() {
                Ok(measurement) => {
                    let comparison = Comparison::between(&primary, &measurement, self.thresholds);
                    if comparison.temperature_alert {
                        log::warn!(
                            "{} and {primary_name} disagree by {:.2} C on temperature",
                            reference.name(),
                            comparison.temperature_delta
                        );
                    }
                    if comparison.humidity_alert {
                        log::warn!(
                            "{} and {primary_name} disagree by {:.2} % on humidity",
                            reference.name(),
                            comparison.humidity_delta
                        );
                    }

                    self.reporter
                        .comparison(reference.name(), &measurement, &comparison)?;
                    if let Some(journal) = &mut self.journal {
                        if let Err(e) = journal.record(reference.name(), &measurement) {
                            log::warn!("Unable to journal {} measurement: {e:#}", reference.name());
                        }
                    }
                }
                Err(e) => log::warn!("{}: {e}", reference.name()),
            }
        }

        Ok(CycleOutcome::Reported)
    }

    fn record_failure(&mut self, error: StationError) -> Result<()> {
        self.consecutive_failures += 1;
        log::error!(
            "{}: {error} ({} in a row)",
            self.sensors.primary.name(),
            self.consecutive_failures
        );

        if self.max_consecutive_failures > 0
            && self.consecutive_failures >= self.max_consecutive_failures
        {
            bail!(
                "Giving up after {} consecutive read failures",
                self.consecutive_failures
            );
        }

        match self.sensors.primary.recover() {
            Ok(()) => log::debug!("{} recovered", self.sensors.primary.name()),
            Err(e) => log::warn!("{} recovery failed: {e}", self.sensors.primary.name()),
        }

        Ok(())
    }
}

#[cfg(test)]
impl Monitor<Vec<u8>> {
    fn output(&self) -> String {
        String::from_utf8(self.reporter.get_ref().clone()).unwrap()
    }
}
