//! Register-level transactions over a two-wire bus.
//!
//! A register read is two bus phases: an address phase that writes the
//! target register index, then a data phase that drains the requested
//! bytes. The typed wrappers compose big-endian register contents into
//! wider integers, sign-extending for the signed variants.

use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource};
use heapless::Vec;
use log::error;
use thiserror_no_std::Error;

/// Largest register write supported in a single transaction, register
/// index included.
const WRITE_LIMIT: usize = 8;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusError {
    /// The device did not acknowledge the register address.
    #[error("address phase rejected by device")]
    AddressPhase,
    /// The address was acknowledged but the data transfer failed.
    #[error("data phase failed")]
    DataPhase,
    /// The caller asked for a write larger than one transaction carries.
    #[error("write of {0} bytes exceeds the transaction limit")]
    WriteTooLarge(usize),
}

fn classify<E: i2c::Error>(err: &E) -> BusError {
    match err.kind() {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address) => BusError::AddressPhase,
        _ => BusError::DataPhase,
    }
}

/// Register read/write primitives for one device at a fixed bus address.
pub struct RegisterBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> RegisterBus<I2C> {
    pub const fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Two-phase register read.
    ///
    /// An address-phase failure short-circuits: the data phase is skipped
    /// and `buf` is left untouched, so callers must not read it on error.
    pub fn read_bytes(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.i2c.write(self.address, &[reg]).map_err(|e| {
            error!("register {reg:#04x}: address phase failed: {e:?}");
            BusError::AddressPhase
        })?;
        self.i2c.read(self.address, buf).map_err(|e| {
            error!("register {reg:#04x}: data phase failed: {e:?}");
            BusError::DataPhase
        })
    }

    /// Writes `data` starting at register `reg` in one transaction.
    pub fn write_bytes(&mut self, reg: u8, data: &[u8]) -> Result<(), BusError> {
        if data.len() + 1 > WRITE_LIMIT {
            return Err(BusError::WriteTooLarge(data.len() + 1));
        }
        let mut frame: Vec<u8, WRITE_LIMIT> = Vec::new();
        // Cannot fail: length checked above.
        let _ = frame.push(reg);
        let _ = frame.extend_from_slice(data);
        self.i2c.write(self.address, &frame).map_err(|e| {
            error!("register {reg:#04x}: write failed: {e:?}");
            classify(&e)
        })
    }

    /// Single-register write convenience.
    pub fn write_register(&mut self, reg: u8, value: u8) -> Result<(), BusError> {
        self.write_bytes(reg, &[value])
    }

    /// Reads a big-endian signed 16-bit quantity.
    pub fn read_i16(&mut self, reg: u8) -> Result<i16, BusError> {
        let mut raw = [0u8; 2];
        self.read_bytes(reg, &mut raw)?;
        Ok(i16::from_be_bytes(raw))
    }

    /// Reads a big-endian unsigned 16-bit quantity.
    pub fn read_u16(&mut self, reg: u8) -> Result<u16, BusError> {
        let mut raw = [0u8; 2];
        self.read_bytes(reg, &mut raw)?;
        Ok(u16::from_be_bytes(raw))
    }

    /// Reads a big-endian signed 32-bit quantity.
    pub fn read_i32(&mut self, reg: u8) -> Result<i32, BusError> {
        let mut raw = [0u8; 4];
        self.read_bytes(reg, &mut raw)?;
        Ok(i32::from_be_bytes(raw))
    }

    /// Reads a big-endian unsigned 32-bit quantity.
    pub fn read_u32(&mut self, reg: u8) -> Result<u32, BusError> {
        let mut raw = [0u8; 4];
        self.read_bytes(reg, &mut raw)?;
        Ok(u32::from_be_bytes(raw))
    }
}
