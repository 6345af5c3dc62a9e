mod aht20;
mod bus;
mod hts221;

use anyhow::{Context, Result};
use i2cdev::linux::LinuxI2CBus;

use aht20::Aht20;
use bus::{I2cBus, SharedBus};
use hts221::Hts221;

use std::sync::{Arc, Mutex};

use super::{Measurement, ReadMeasurement, Sensors};
use crate::config::SensorConfig;
use crate::error::StationError;

/// Opens the I2C bus once and attaches every configured sensor to it.
pub fn open(config: &SensorConfig) -> Result<Sensors, StationError> {
    let i2c_bus = LinuxI2CBus::new(&config.i2c_bus_path)
        .with_context(|| {
            format!(
                "Unable to open I2C bus {}. Is I2C enabled?",
                config.i2c_bus_path.display()
            )
        })
        .map_err(StationError::DeviceUnavailable)?;

    log::info!("Opened I2C bus {}", config.i2c_bus_path.display());
    attach(Arc::new(Mutex::new(i2c_bus)), config.cross_check)
}

fn attach<B: I2cBus + 'static>(
    comm_channel: SharedBus<B>,
    cross_check: bool,
) -> Result<Sensors, StationError> {
    let aht20 = Aht20::new(comm_channel.clone())
        .with_context(|| {
            format!(
                "No AHT20 answering at I2C address {:#04x}, check the wiring with `i2cdetect -y 1`",
                Aht20::<B>::I2C_ADDR
            )
        })
        .map_err(StationError::DeviceUnavailable)?;
    log::info!("AHT20 initialised");

    let reference = if cross_check {
        let hts221 = Hts221::new(comm_channel)
            .with_context(|| {
                format!(
                    "No HTS221 answering at I2C address {:#04x}",
                    Hts221::<B>::I2C_ADDR
                )
            })
            .map_err(StationError::DeviceUnavailable)?;
        log::info!("HTS221 initialised for cross-checking");
        Some(Box::new(hts221) as Box<dyn ReadMeasurement>)
    } else {
        None
    };

    Ok(Sensors {
        primary: Box::new(aht20),
        reference,
    })
}

impl<B: I2cBus> ReadMeasurement for Aht20<B> {
    fn name(&self) -> &str {
        "AHT20"
    }

    fn read(&self) -> Result<Measurement, StationError> {
        let (temperature, humidity) = self
            .query_temp_and_humidity()
            .map_err(StationError::ReadFailure)?;

        Measurement::new(temperature, humidity).map_err(StationError::ReadFailure)
    }

    fn recover(&self) -> Result<(), StationError> {
        self.soft_reset().map_err(StationError::ReadFailure)
    }
}

impl<B: I2cBus> ReadMeasurement for Hts221<B> {
    fn name(&self) -> &str {
        "HTS221"
    }

    fn read(&self) -> Result<Measurement, StationError> {
        let (temperature, humidity) = self
            .query_temp_and_humidity()
            .map_err(StationError::ReadFailure)?;

        Measurement::new(temperature, humidity).map_err(StationError::ReadFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use aht20::tests::{calibrated_aht20, frame, CALIBRATED_STATUS};
    use bus::fake::FakeBus;
    use hts221::tests::CALIBRATION;

    use assert_float_eq::*;

    #[test]
    fn absent_device_is_unavailable_at_startup() {
        let result = attach(FakeBus::default().shared(), false);

        assert!(matches!(result, Err(StationError::DeviceUnavailable(_))));
    }

    #[test]
    fn missing_bus_is_unavailable() {
        let config = SensorConfig {
            i2c_bus_path: "/dev/i2c-does-not-exist".into(),
            cross_check: false,
        };

        assert!(matches!(open(&config), Err(StationError::DeviceUnavailable(_))));
    }

    #[test]
    fn missing_reference_sensor_is_unavailable() {
        let result = attach(calibrated_aht20().shared(), true);

        assert!(matches!(result, Err(StationError::DeviceUnavailable(_))));
    }

    #[test]
    fn reads_primary_and_reference_on_one_bus() {
        let bus = calibrated_aht20()
            .with_frame(frame(CALIBRATED_STATUS, 0x80000, 0x60000))
            .with_device(0x5f)
            .with_registers(0x5f, 0x0f, &[0xbc])
            .with_registers(0x5f, 0x30, &CALIBRATION)
            .with_registers(0x5f, 0x28, &[0xb8, 0x0b, 0xe8, 0x03])
            .shared();

        let sensors = attach(bus, true).unwrap();
        let primary = sensors.primary.read().unwrap();
        let reference = sensors.reference.unwrap().read().unwrap();

        assert_eq!(sensors.primary.name(), "AHT20");
        assert_float_absolute_eq!(primary.temperature.0, 25.0, 0.001);
        assert_float_absolute_eq!(primary.humidity.0, 50.0, 0.001);
        assert_float_absolute_eq!(reference.temperature.0, 20.0, 0.001);
        assert_float_absolute_eq!(reference.humidity.0, 50.0, 0.001);
    }

    #[test]
    fn bus_error_during_poll_is_a_read_failure() {
        // No frame queued: the read transaction fails.
        let sensors = attach(calibrated_aht20().shared(), false).unwrap();

        assert!(matches!(
            sensors.primary.read(),
            Err(StationError::ReadFailure(_))
        ));
    }
}
