//! Persisted device name
//!
//! The name is the only state that survives a power cycle. It is stored as a
//! postcard-encoded `heapless::String` in whatever non-volatile slot the
//! board provides (a flash page, EEPROM, a file in the simulator).

use heapless::String;
use log::{info, warn};

use crate::config::NAME_CAPACITY;
use crate::error::StoreError;

pub type DeviceName = String<NAME_CAPACITY>;

/// Length prefix plus payload
const ENCODED_CAPACITY: usize = NAME_CAPACITY + 2;

/// Raw non-volatile slot holding the encoded name.
pub trait NameBackend {
    /// Fill `buf` with the stored bytes; returns how many were stored.
    /// An empty slot reads as zero bytes.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StoreError>;

    /// Replace the stored bytes.
    fn write(&mut self, bytes: &[u8]) -> Result<(), StoreError>;
}

impl<B: NameBackend + ?Sized> NameBackend for &mut B {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StoreError> {
        (**self).read(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).write(bytes)
    }
}

/// Load the stored name; an empty slot yields an empty name.
pub fn load_name<B: NameBackend>(backend: &mut B) -> Result<DeviceName, StoreError> {
    let mut buf = [0u8; ENCODED_CAPACITY];
    let len = backend.read(&mut buf)?;
    if len == 0 {
        info!("No device name stored");
        return Ok(DeviceName::new());
    }
    let bytes = buf.get(..len).ok_or(StoreError::Decode)?;
    postcard::from_bytes(bytes).map_err(|e| {
        warn!("Stored device name is corrupt: {:?}", e);
        StoreError::Decode
    })
}

pub fn save_name<B: NameBackend>(backend: &mut B, name: &DeviceName) -> Result<(), StoreError> {
    let mut buf = [0u8; ENCODED_CAPACITY];
    let encoded = postcard::to_slice(name, &mut buf).map_err(|_| StoreError::Encode)?;
    backend.write(encoded)
}

/// Volatile backend, for hosts and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    bytes: heapless::Vec<u8, ENCODED_CAPACITY>,
}

impl NameBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StoreError> {
        let out = buf
            .get_mut(..self.bytes.len())
            .ok_or(StoreError::Backend)?;
        out.copy_from_slice(&self.bytes);
        Ok(self.bytes.len())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.bytes.clear();
        self.bytes
            .extend_from_slice(bytes)
            .map_err(|_| StoreError::Backend)
    }
}
