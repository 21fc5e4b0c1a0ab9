use embedded_hal::i2c::I2c;
use heapless::Vec;

use crate::error::TransportError;

/// Longest register write a driver issues in one transaction (register + payload)
const MAX_WRITE: usize = 16;

/// One I2C peripheral at a fixed address, with register-style helpers.
///
/// Every bus error is folded into a [`TransportError`] so drivers can store it
/// in their status without caring about the HAL's error type.
pub struct RegisterDevice<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> RegisterDevice<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Read `buf.len()` bytes starting at `register`.
    pub fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), TransportError> {
        self.i2c
            .write_read(self.address, &[register], buf)
            .map_err(TransportError::from_i2c)
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        self.write_raw(&[register, value])
    }

    /// Write `values` to consecutive registers starting at `register`.
    pub fn write_registers(&mut self, register: u8, values: &[u8]) -> Result<(), TransportError> {
        let mut frame: Vec<u8, MAX_WRITE> = Vec::new();
        frame.push(register).map_err(|_| TransportError::TooLong)?;
        frame
            .extend_from_slice(values)
            .map_err(|_| TransportError::TooLong)?;
        self.write_raw(&frame)
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.i2c
            .write(self.address, bytes)
            .map_err(TransportError::from_i2c)
    }

    pub fn read_raw(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        self.i2c
            .read(self.address, buf)
            .map_err(TransportError::from_i2c)
    }

    /// Empty write: succeeds iff the device acknowledges its address.
    pub fn probe(&mut self) -> Result<(), TransportError> {
        self.write_raw(&[])
    }
}
