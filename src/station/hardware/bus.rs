use anyhow::{anyhow, Result};

use i2cdev::core::*;
use i2cdev::linux::{LinuxI2CBus, LinuxI2CMessage};

use std::sync::{Arc, Mutex, MutexGuard};

/// A bus shared by every device wired to it.
pub type SharedBus<B> = Arc<Mutex<B>>;

/// Raw transactions the sensor drivers need from an I2C master.
pub trait I2cBus {
    fn write(&mut self, address: u16, data: &[u8]) -> Result<()>;

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<()>;

    /// Write followed by a repeated-start read.
    fn write_read(&mut self, address: u16, data: &[u8], buf: &mut [u8]) -> Result<()>;
}

impl I2cBus for LinuxI2CBus {
    fn write(&mut self, address: u16, data: &[u8]) -> Result<()> {
        let mut msgs = [LinuxI2CMessage::write(data).with_address(address)];
        self.transfer(&mut msgs)?;
        Ok(())
    }

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<()> {
        let mut msgs = [LinuxI2CMessage::read(buf).with_address(address)];
        self.transfer(&mut msgs)?;
        Ok(())
    }

    fn write_read(&mut self, address: u16, data: &[u8], buf: &mut [u8]) -> Result<()> {
        let mut msgs = [
            LinuxI2CMessage::write(data).with_address(address),
            LinuxI2CMessage::read(buf).with_address(address),
        ];
        self.transfer(&mut msgs)?;
        Ok(())
    }
}

pub fn lock<B>(bus: &SharedBus<B>) -> Result<MutexGuard<'_, B>> {
    bus.lock().map_err(|_| anyhow!("I2C bus lock poisoned"))
}
