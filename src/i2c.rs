use std::{
    io::{self, Read, Write},
    path::Path,
};

use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};

use crate::error::{Error, Result};

/// Raw byte transport to whichever slave is currently addressed.
///
/// Every call is a single transaction; implementations must not loop to
/// complete a short transfer.
pub trait I2cBus {
    fn set_slave_address(&mut self, address: u16) -> io::Result<()>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// A Linux `/dev/i2c-N` character device.
pub struct I2cDevice {
    device: LinuxI2CDevice,
}

impl std::fmt::Debug for I2cDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("I2cDevice").finish_non_exhaustive()
    }
}

impl I2cDevice {
    /// Open the bus node and address the slave at `address`.
    pub fn open(path: impl AsRef<Path>, address: u16) -> Result<Self> {
        let path = path.as_ref();
        let device = LinuxI2CDevice::new(path, address).map_err(|e| match e {
            LinuxI2CError::Io(source) => Error::DeviceOpen {
                path: path.to_owned(),
                source,
            },
            other => Error::BoardSelect {
                address,
                source: other.into(),
            },
        })?;
        Ok(Self { device })
    }
}

impl I2cBus for I2cDevice {
    fn set_slave_address(&mut self, address: u16) -> io::Result<()> {
        self.device.set_slave_address(address)?;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(&mut self.device, buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut self.device, buf)
    }
}
