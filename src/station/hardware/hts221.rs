use anyhow::{anyhow, Result};

use std::thread;
use std::time::Duration;

use super::bus::{self, I2cBus, SharedBus};
use crate::station::{Humidity, Temperature};

const DATA_REG_SIZE: usize = 4;
const CALIB_DATA_SIZE: usize = 16;

/// Factory calibration, read once at startup. Each quantity is described by
/// two points (reference value, raw output) for linear interpolation.
#[derive(Debug, Clone, PartialEq)]
struct CalibrationData {
    h0_rh: f32,
    h1_rh: f32,
    h0_t0_out: i16,
    h1_t0_out: i16,
    t0_degc: f32,
    t1_degc: f32,
    t0_out: i16,
    t1_out: i16,
}

impl CalibrationData {
    fn from_registers(calib_data: &[u8; CALIB_DATA_SIZE]) -> Result<CalibrationData> {
        let le_i16 = |at: usize| i16::from_le_bytes([calib_data[at], calib_data[at + 1]]);

        // T0/T1 are 10-bit values; their top two bits live in register 0x35.
        let msb = calib_data[5];
        let t0_degc_x8 = (((msb & 0x03) as u16) << 8) | (calib_data[2] as u16);
        let t1_degc_x8 = ((((msb & 0x0c) >> 2) as u16) << 8) | (calib_data[3] as u16);

        let calib = CalibrationData {
            h0_rh: (calib_data[0] as f32) / 2.0,
            h1_rh: (calib_data[1] as f32) / 2.0,
            h0_t0_out: le_i16(6),
            h1_t0_out: le_i16(10),
            t0_degc: (t0_degc_x8 as f32) / 8.0,
            t1_degc: (t1_degc_x8 as f32) / 8.0,
            t0_out: le_i16(12),
            t1_out: le_i16(14),
        };

        if calib.h0_t0_out == calib.h1_t0_out || calib.t0_out == calib.t1_out {
            return Err(anyhow!("Degenerate HTS221 calibration data: {calib:?}"));
        }

        Ok(calib)
    }

    fn temperature(&self, raw_temp: i16) -> Temperature {
        let slope = (self.t1_degc - self.t0_degc) / ((self.t1_out as f32) - (self.t0_out as f32));
        Temperature(self.t0_degc + ((raw_temp as f32) - (self.t0_out as f32)) * slope)
    }

    fn humidity(&self, raw_hum: i16) -> Humidity {
        let slope = (self.h1_rh - self.h0_rh) / ((self.h1_t0_out as f32) - (self.h0_t0_out as f32));
        let rh = self.h0_rh + ((raw_hum as f32) - (self.h0_t0_out as f32)) * slope;
        Humidity(rh.clamp(0.0, 100.0))
    }
}

#[derive(Debug)]
pub struct Hts221<B> {
    comm_channel: SharedBus<B>,
    calib: CalibrationData,
}

impl<B: I2cBus> Hts221<B> {
    pub const I2C_ADDR: u16 = 0x5f;

    const AUTO_INCREMENT: u8 = 0x80;

    const CHIP_ID_REG_ADDR: u8 = 0x0f;
    const CHIP_ID_EXPECTED: u8 = 0xbc;

    const CTRL_REG1_ADDR: u8 = 0x20;
    const CTRL_REG1_PD: u8 = 0x80;
    const CTRL_REG1_BDU: u8 = 0x04;

    const CTRL_REG2_ADDR: u8 = 0x21;
    const CTRL_REG2_ONE_SHOT: u8 = 0x01;

    const DATA_REG_ADDR: u8 = 0x28;
    const CALIB_REG_ADDR: u8 = 0x30;

    const ONE_SHOT_POLL_DELAY: Duration = Duration::from_millis(10);
    const ONE_SHOT_POLL_ATTEMPTS: u32 = 20;

    pub fn new(comm_channel: SharedBus<B>) -> Result<Hts221<B>> {
        // Check that we're dealing with the correct chip
        let mut id_data = [0];
        log::debug!("Reading out HTS221 chip ID");
        bus::lock(&comm_channel)?.write_read(
            Self::I2C_ADDR,
            &[Self::CHIP_ID_REG_ADDR],
            &mut id_data,
        )?;

        if id_data[0] != Self::CHIP_ID_EXPECTED {
            return Err(anyhow!(
                "Wrong chip ID response at I2C address {:#04x}. Expected {:#04x} and got {:#04x}.",
                Self::I2C_ADDR,
                Self::CHIP_ID_EXPECTED,
                id_data[0]
            ));
        }

        log::debug!("Reading out HTS221 calibration data.");
        let mut calib_data = [0; CALIB_DATA_SIZE];
        bus::lock(&comm_channel)?.write_read(
            Self::I2C_ADDR,
            &[Self::AUTO_INCREMENT | Self::CALIB_REG_ADDR],
            &mut calib_data,
        )?;
        let calib = CalibrationData::from_registers(&calib_data)?;

        // Powered up, one-shot mode, outputs only updated once both bytes are read.
        bus::lock(&comm_channel)?.write(
            Self::I2C_ADDR,
            &[Self::CTRL_REG1_ADDR, Self::CTRL_REG1_PD | Self::CTRL_REG1_BDU],
        )?;

        log::debug!("HTS221 configuration OK.");
        Ok(Hts221 {
            comm_channel,
            calib,
        })
    }

    pub fn query_temp_and_humidity(&self) -> Result<(Temperature, Humidity)> {
        bus::lock(&self.comm_channel)?.write(
            Self::I2C_ADDR,
            &[Self::CTRL_REG2_ADDR, Self::CTRL_REG2_ONE_SHOT],
        )?;

        // The one-shot bit self-clears once the conversion is done.
        let mut attempts = 0;
        loop {
            thread::sleep(Self::ONE_SHOT_POLL_DELAY);

            let mut ctrl_reg2 = [0];
            bus::lock(&self.comm_channel)?.write_read(
                Self::I2C_ADDR,
                &[Self::CTRL_REG2_ADDR],
                &mut ctrl_reg2,
            )?;
            if ctrl_reg2[0] & Self::CTRL_REG2_ONE_SHOT == 0 {
                break;
            }

            attempts += 1;
            if attempts >= Self::ONE_SHOT_POLL_ATTEMPTS {
                return Err(anyhow!("HTS221 one-shot conversion did not complete"));
            }
        }

        let mut raw_data = [0; DATA_REG_SIZE];
        bus::lock(&self.comm_channel)?.write_read(
            Self::I2C_ADDR,
            &[Self::AUTO_INCREMENT | Self::DATA_REG_ADDR],
            &mut raw_data,
        )?;

        let raw_hum = i16::from_le_bytes([raw_data[0], raw_data[1]]);
        let raw_temp = i16::from_le_bytes([raw_data[2], raw_data[3]]);
        log::debug!("Raw HTS221 data: raw_hum {raw_hum}, raw_temp {raw_temp}");

        Ok((self.calib.temperature(raw_temp), self.calib.humidity(raw_hum)))
    }
}
