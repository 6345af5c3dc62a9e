use anyhow::{anyhow, Result};

use std::thread;
use std::time::Duration;

use super::bus::{self, I2cBus, SharedBus};
use crate::station::{Humidity, Temperature};

const MEASUREMENT_SIZE: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Status(u8);

impl Status {
    const BUSY: u8 = 0x80;
    const CALIBRATED: u8 = 0x08;

    fn is_busy(self) -> bool {
        self.0 & Self::BUSY != 0
    }

    fn is_calibrated(self) -> bool {
        self.0 & Self::CALIBRATED != 0
    }
}

#[derive(Debug)]
pub struct Aht20<B> {
    comm_channel: SharedBus<B>,
}

impl<B: I2cBus> Aht20<B> {
    pub const I2C_ADDR: u16 = 0x38;

    const CMD_STATUS: u8 = 0x71;
    const CMD_INIT: [u8; 3] = [0xbe, 0x08, 0x00];
    const CMD_TRIGGER: [u8; 3] = [0xac, 0x33, 0x00];
    const CMD_SOFT_RESET: u8 = 0xba;

    // Timings from the AHT20 datasheet, section 5.4.
    const POWER_ON_DELAY: Duration = Duration::from_millis(40);
    const INIT_DELAY: Duration = Duration::from_millis(10);
    const RESET_DELAY: Duration = Duration::from_millis(20);
    const MEASUREMENT_DELAY: Duration = Duration::from_millis(80);
    const BUSY_POLL_DELAY: Duration = Duration::from_millis(10);
    const BUSY_POLL_ATTEMPTS: u32 = 10;

    pub fn new(comm_channel: SharedBus<B>) -> Result<Aht20<B>> {
        thread::sleep(Self::POWER_ON_DELAY);

        let aht = Aht20 { comm_channel };
        aht.calibrate()?;

        log::debug!("AHT20 ready.");
        Ok(aht)
    }

    /// Soft reset followed by the same calibration check as at power-on.
    pub fn soft_reset(&self) -> Result<()> {
        log::debug!("Resetting AHT20.");
        bus::lock(&self.comm_channel)?.write(Self::I2C_ADDR, &[Self::CMD_SOFT_RESET])?;
        thread::sleep(Self::RESET_DELAY);

        self.calibrate()
    }

    pub fn query_temp_and_humidity(&self) -> Result<(Temperature, Humidity)> {
        bus::lock(&self.comm_channel)?.write(Self::I2C_ADDR, &Self::CMD_TRIGGER)?;
        thread::sleep(Self::MEASUREMENT_DELAY);

        let mut raw_data = [0; MEASUREMENT_SIZE];
        let mut attempts = 0;
        loop {
            bus::lock(&self.comm_channel)?.read(Self::I2C_ADDR, &mut raw_data)?;
            if !Status(raw_data[0]).is_busy() {
                break;
            }

            attempts += 1;
            if attempts >= Self::BUSY_POLL_ATTEMPTS {
                return Err(anyhow!(
                    "AHT20 still busy after {} status polls",
                    Self::BUSY_POLL_ATTEMPTS
                ));
            }
            thread::sleep(Self::BUSY_POLL_DELAY);
        }

        let expected_crc = crc8(&raw_data[..6]);
        if expected_crc != raw_data[6] {
            return Err(anyhow!(
                "AHT20 CRC mismatch. Expected {:#04x} and got {:#04x}.",
                expected_crc,
                raw_data[6]
            ));
        }

        log::debug!("Raw AHT20 frame: {raw_data:02x?}");
        Ok(convert(&raw_data))
    }

    fn status(&self) -> Result<Status> {
        let mut status = [0];
        bus::lock(&self.comm_channel)?.write_read(
            Self::I2C_ADDR,
            &[Self::CMD_STATUS],
            &mut status,
        )?;

        Ok(Status(status[0]))
    }

    fn calibrate(&self) -> Result<()> {
        let status = self.status()?;
        log::debug!("AHT20 status is {:#04x}", status.0);

        if status.is_calibrated() {
            return Ok(());
        }

        log::debug!("Loading AHT20 calibration.");
        bus::lock(&self.comm_channel)?.write(Self::I2C_ADDR, &Self::CMD_INIT)?;
        thread::sleep(Self::INIT_DELAY);

        if !self.status()?.is_calibrated() {
            return Err(anyhow!(
                "AHT20 at I2C address {:#04x} did not report calibration after init",
                Self::I2C_ADDR
            ));
        }

        Ok(())
    }
}

/// CRC-8 with polynomial 0x31 and initial value 0xff.
fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0xff, |crc, byte| {
        (0..8).fold(crc ^ byte, |crc, _| {
            if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            }
        })
    })
}

// Humidity and temperature are two 20-bit values packed into bytes 1..=5,
// sharing the middle nibble of byte 3.
fn convert(raw_data: &[u8; MEASUREMENT_SIZE]) -> (Temperature, Humidity) {
    let raw_hum = ((raw_data[1] as u32) << 12)
        | ((raw_data[2] as u32) << 4)
        | ((raw_data[3] as u32) >> 4);

    let raw_temp = (((raw_data[3] as u32) & 0x0f) << 16)
        | ((raw_data[4] as u32) << 8)
        | (raw_data[5] as u32);

    let full_scale = (1u32 << 20) as f32;

    (
        Temperature((raw_temp as f32) / full_scale * 200.0 - 50.0),
        Humidity((raw_hum as f32) / full_scale * 100.0),
    )
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;

    use crate::station::hardware::bus::fake::FakeBus;

    use assert_float_eq::*;

    pub const CALIBRATED_STATUS: u8 = 0x18;

    /// Frame for the given raw 20-bit readings, with a valid CRC.
    pub fn frame(status: u8, raw_hum: u32, raw_temp: u32) -> Vec<u8> {
        let mut frame = vec![
            status,
            (raw_hum >> 12) as u8,
            (raw_hum >> 4) as u8,
            (((raw_hum & 0x0f) << 4) | (raw_temp >> 16)) as u8,
            (raw_temp >> 8) as u8,
            raw_temp as u8,
        ];
        frame.push(crc8(&frame));
        frame
    }

    pub fn calibrated_aht20() -> FakeBus {
        FakeBus::default()
            .with_device(0x38)
            .with_registers(0x38, 0x71, &[CALIBRATED_STATUS])
    }

    #[test]
    fn crc_matches_reference_vector() {
        assert_eq!(crc8(&[0xbe, 0xef]), 0x92);
    }

    #[test]
    fn converts_half_scale_humidity_and_temperature() {
        // 0x60000 / 2^20 = 0.375 -> 0.375 * 200 - 50 = 25 C
        let raw: [u8; 7] = frame(CALIBRATED_STATUS, 0x80000, 0x60000)
            .try_into()
            .unwrap();

        let (t, h) = convert(&raw);

        assert_float_absolute_eq!(t.0, 25.0, 0.001);
        assert_float_absolute_eq!(h.0, 50.0, 0.001);
    }

    #[test]
    fn reads_a_measurement() {
        let bus = calibrated_aht20()
            .with_frame(frame(CALIBRATED_STATUS, 0x80000, 0x60000))
            .shared();
        let aht = Aht20::new(bus.clone()).unwrap();

        let (t, h) = aht.query_temp_and_humidity().unwrap();

        assert_float_absolute_eq!(t.0, 25.0, 0.001);
        assert_float_absolute_eq!(h.0, 50.0, 0.001);
        let fake = bus.lock().unwrap();
        assert_eq!(fake.writes, vec![(0x38, vec![0xac, 0x33, 0x00])]);
    }

    #[test]
    fn waits_while_busy() {
        let bus = calibrated_aht20()
            .with_frame(frame(0x98, 0, 0))
            .with_frame(frame(CALIBRATED_STATUS, 0x80000, 0x60000))
            .shared();
        let aht = Aht20::new(bus).unwrap();

        assert!(aht.query_temp_and_humidity().is_ok());
    }

    #[test]
    fn times_out_when_always_busy() {
        let mut fake = calibrated_aht20();
        for _ in 0..10 {
            fake = fake.with_frame(frame(0x98, 0, 0));
        }
        let aht = Aht20::new(fake.shared()).unwrap();

        let err = aht.query_temp_and_humidity().unwrap_err();

        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn rejects_corrupted_frame() {
        let mut corrupted = frame(CALIBRATED_STATUS, 0x80000, 0x60000);
        corrupted[2] ^= 0x01;
        let bus = calibrated_aht20().with_frame(corrupted).shared();
        let aht = Aht20::new(bus).unwrap();

        let err = aht.query_temp_and_humidity().unwrap_err();

        assert!(err.to_string().contains("CRC"));
    }

    #[test]
    fn sends_init_when_uncalibrated() {
        let bus = FakeBus::default().with_device(0x38).shared();

        assert!(Aht20::new(bus.clone()).is_err());
        let fake = bus.lock().unwrap();
        assert_eq!(fake.writes, vec![(0x38, vec![0xbe, 0x08, 0x00])]);
    }

    #[test]
    fn soft_reset_recalibrates() {
        let bus = calibrated_aht20().shared();
        let aht = Aht20::new(bus.clone()).unwrap();

        aht.soft_reset().unwrap();

        let fake = bus.lock().unwrap();
        assert_eq!(fake.writes, vec![(0x38, vec![0xba])]);
    }
}
