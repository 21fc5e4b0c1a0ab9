//! Error types for the recorder
//!
//! Nothing here is fatal. Transport errors end up in a sensor's status field,
//! everything else is logged where it happens and dropped.

use alloc::string::String;
use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use thiserror_no_std::Error;

/// Bus-level failure of a single I2C transaction.
///
/// The discriminants follow the Wire library codes the host software already
/// understands; a sensor stores the negated code as its status.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("data too long to fit in transmit buffer")]
    TooLong,
    #[error("NACK on transmit of address")]
    AddressNack,
    #[error("NACK on transmit of data")]
    DataNack,
    #[error("other bus error")]
    Other,
    #[error("bus timeout")]
    Timeout,
}

impl TransportError {
    /// Small positive error code (1..=5).
    pub const fn code(self) -> i16 {
        match self {
            Self::TooLong => 1,
            Self::AddressNack => 2,
            Self::DataNack => 3,
            Self::Other => 4,
            Self::Timeout => 5,
        }
    }

    /// Map an `embedded-hal` error onto the transport taxonomy.
    pub fn from_i2c<E: embedded_hal::i2c::Error>(error: E) -> Self {
        Self::from_kind(error.kind())
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Overrun => Self::TooLong,
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data) => Self::DataNack,
            ErrorKind::NoAcknowledge(_) => Self::AddressNack,
            _ => Self::Other,
        }
    }
}

/// Rejected configuration or sensor command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("`{0}` not found in sensor list")]
    UnknownSensor(String),
    #[error("unknown command key `{0}`")]
    UnknownKey(String),
    #[error("invalid value for `{0}`")]
    InvalidValue(String),
    #[error("frequency {requested} Hz outside [{min}, {max}] Hz")]
    FrequencyOutOfRange { requested: f32, min: f32, max: f32 },
    #[error("device name longer than {0} bytes")]
    NameTooLong(usize),
    #[error("persisting device name failed: {0}")]
    Store(StoreError),
}

/// Problems on the serial link. The offending line is discarded.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    #[error("deserialization error on input")]
    Malformed,
    #[error("unknown object, expected a mapping")]
    NotAnObject,
    #[error("inbound line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("link read failed")]
    Read,
    #[error("link write failed")]
    Write,
}

/// Failure to load or persist the device name.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("encoding failed")]
    Encode,
    #[error("stored data is corrupt")]
    Decode,
    #[error("storage backend failed")]
    Backend,
}
