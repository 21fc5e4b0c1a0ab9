//! Sensor abstraction layer
//!
//! Every chip driver implements the [`Sensor`] hooks: hardware
//! (re)configuration, an optional trigger, the raw bus read, a pure decoder
//! and chip-specific commands. The bookkeeping around those hooks lives in
//! [`SensorExt`], which is implemented for every sensor and cannot be
//! overridden, so a driver can never skip status and counter maintenance.

mod bus;
pub mod gas;
pub mod motion;
pub mod ois;
pub mod pressure;
mod registry;

pub use bus::RegisterDevice;
pub use gas::{GasKind, GasSensor};
pub use motion::MotionSensor;
pub use ois::OisSensor;
pub use pressure::PressureSensor;
pub use registry::SensorRegistry;

use serde_json::Value as JsonValue;

use crate::error::{CommandError, TransportError};
use crate::record::Record;

/// Key of the status field in sample and descriptor records
pub const STATUS_KEY: &str = "#ST";

/// Universal command toggling whether a sensor takes part in recording
pub const RECORD_KEY: &str = "record";

/// Signed sensor status: zero or positive is nominal, negative is the
/// negated [`TransportError`] code of the last failed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Status(pub i16);

impl Status {
    pub const NOMINAL: Self = Self(0);
    /// Powered and configured, readings not trustworthy yet
    pub const WARMING_UP: Self = Self(1);
    /// Configured and delivering valid readings
    pub const READY: Self = Self(5);

    pub const fn from_transport(error: TransportError) -> Self {
        Self(-error.code())
    }

    pub const fn is_error(self) -> bool {
        self.0 < 0
    }
}

/// Static identity of a sensor.
#[derive(Debug, Clone, Copy)]
pub struct SensorInfo {
    pub name: &'static str,
    pub short_name: &'static str,
    pub address: u8,
    pub parameter_names: &'static [&'static str],
    pub parameter_short_names: &'static [&'static str],
    /// JSON array describing the sensor's controls for the host UI
    pub control_schema: &'static str,
}

/// Mutable bookkeeping shared by all sensors.
#[derive(Debug, Clone)]
pub struct SensorState {
    pub status: Status,
    /// Status as of the last record that carried it
    pub last_reported_status: Status,
    pub error_count: u32,
    pub zero_run_count: u32,
    /// Consecutive all-zero reads tolerated before a reset (0 disables)
    pub zero_run_threshold: u32,
    pub connected: bool,
    pub record: bool,
}

impl Default for SensorState {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorState {
    pub const fn new() -> Self {
        Self {
            status: Status::NOMINAL,
            last_reported_status: Status::NOMINAL,
            error_count: 0,
            zero_run_count: 0,
            zero_run_threshold: 0xFD,
            connected: true,
            record: true,
        }
    }

    /// Connected and selected for recording.
    pub fn is_active(&self) -> bool {
        self.connected && self.record
    }

    /// Persistent errors or a stale run of zero readings.
    pub fn needs_reset(&self) -> bool {
        self.error_count > 0
            || (self.zero_run_threshold > 0 && self.zero_run_count > self.zero_run_threshold)
    }

    pub fn record_read_failure(&mut self, error: TransportError) {
        self.status = Status::from_transport(error);
        self.error_count += 1;
    }

    pub fn record_read_success(&mut self, all_zero: bool) {
        self.error_count = 0;
        if all_zero {
            self.zero_run_count += 1;
        } else {
            self.zero_run_count = 0;
        }
        if self.status.is_error() {
            self.status = Status::NOMINAL;
        }
    }

    /// Track the outcome of a configuration write.
    pub fn note_write(&mut self, result: Result<(), TransportError>) {
        match result {
            Ok(()) if self.status.is_error() => self.status = Status::NOMINAL,
            Ok(()) => {}
            Err(e) => self.status = Status::from_transport(e),
        }
    }

    /// Status to put in the next record: only when it changed or is an error.
    pub fn take_status_report(&mut self) -> Option<Status> {
        if self.status != self.last_reported_status || self.status.is_error() {
            self.last_reported_status = self.status;
            Some(self.status)
        } else {
            None
        }
    }

    fn clear(&mut self) {
        self.status = Status::NOMINAL;
        self.error_count = 0;
        self.zero_run_count = 0;
    }
}

/// Chip-specific hooks of a sensor driver.
///
/// Drivers implement these; callers use the [`SensorExt`] operations.
pub trait Sensor {
    fn info(&self) -> &SensorInfo;

    fn state(&self) -> &SensorState;

    fn state_mut(&mut self) -> &mut SensorState;

    /// Idempotent hardware (re)configuration.
    fn init(&mut self);

    /// Optional pre-sample kick, such as starting a one-shot conversion.
    fn trigger(&mut self) {}

    /// Bus read(s) filling the raw buffer; returns the raw bytes read.
    fn acquire(&mut self) -> Result<&[u8], TransportError>;

    /// Write decoded parameters into `out`. Must not touch the bus.
    fn decode(&self, out: &mut Record);

    /// Check presence on the bus without a full sample.
    fn probe(&mut self) -> Result<(), TransportError>;

    /// Chip-specific command handling.
    fn command(&mut self, key: &str, _value: &JsonValue) -> Result<(), CommandError> {
        Err(CommandError::UnknownKey(key.into()))
    }

    /// Chip-specific recovery run by [`SensorExt::reset`] before `init`.
    fn reset_procedure(&mut self) {}

    /// Called when recording stops.
    fn stop(&mut self) {}
}

/// Operations every sensor supports, built on the [`Sensor`] hooks.
pub trait SensorExt: Sensor {
    fn short_name(&self) -> &'static str {
        self.info().short_name
    }

    /// Read the sensor and update status and counters.
    fn sample(&mut self) {
        let outcome = self.acquire().map(|raw| raw.iter().all(|b| *b == 0));
        let state = self.state_mut();
        match outcome {
            Ok(all_zero) => state.record_read_success(all_zero),
            Err(e) => state.record_read_failure(e),
        }
    }

    /// Clear counters, run the chip recovery, then reconfigure.
    fn reset(&mut self) {
        self.state_mut().clear();
        self.reset_procedure();
        self.init();
    }

    /// Decoded sample, with the status field only when it is news.
    fn report(&mut self) -> Record {
        let mut out = Record::new();
        if let Some(status) = self.state_mut().take_status_report() {
            out.insert(STATUS_KEY, status.0);
        }
        self.decode(&mut out);
        out
    }

    /// Identity and metadata for discovery while idle.
    fn describe(&mut self) -> Record {
        let state = self.state_mut();
        state.last_reported_status = state.status;
        let status = state.status;
        let record = state.record;

        let info = self.info();
        let mut out = Record::new();
        out.insert("name", info.name);
        out.insert("control_str", info.control_schema);
        out.insert(STATUS_KEY, status.0);
        out.insert(RECORD_KEY, record);
        out.insert("parameter_names", info.parameter_names);
        out.insert("parameter_short_names", info.parameter_short_names);
        out
    }

    /// Handle the universal `record` toggle, delegate everything else.
    fn handle_command(&mut self, key: &str, value: &JsonValue) -> Result<(), CommandError> {
        if key == RECORD_KEY {
            let enabled = value
                .as_bool()
                .ok_or_else(|| CommandError::InvalidValue(key.into()))?;
            self.state_mut().record = enabled;
            return Ok(());
        }
        self.command(key, value)
    }

    /// Probe the bus and update `connected`.
    fn test_connection(&mut self) {
        let result = self.probe();
        let state = self.state_mut();
        match result {
            Ok(()) => {
                state.connected = true;
                if state.status.is_error() {
                    state.status = Status::NOMINAL;
                }
            }
            Err(e) => {
                state.connected = false;
                state.status = Status::from_transport(e);
            }
        }
    }
}

impl<S: Sensor + ?Sized> SensorExt for S {}

#[cfg(test)]
pub(crate) mod testing;
