//! LSM6DS3 six-axis motion sensor
//!
//! Angular rate on AX/AY/AZ and linear acceleration on LX/LY/LZ, both scaled
//! by the selected full-scale range. Ranges are switched at runtime with the
//! `asens` (rad/s) and `lsens` (g) commands.

use embedded_hal::i2c::I2c;
use serde_json::Value as JsonValue;

use super::bus::RegisterDevice;
use super::{Sensor, SensorInfo, SensorState, Status};
use crate::error::{CommandError, TransportError};
use crate::record::Record;

pub const ADDRESS: u8 = 0x6B;

const CTRL1_XL: u8 = 0x10;
const CTRL2_G: u8 = 0x11;
const CTRL3_C: u8 = 0x12;
const OUTX_L_G: u8 = 0x22;

/// Registers cleared before configuration
const CLEARED_REGISTERS: [u8; 14] = [
    0x01, 0x04, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x13, 0x14, 0x15, 0x16, 0x17, 0x1A,
];

/// Fixed configuration writes: data-ready routing, I2C mode, all axes on.
const SETUP: [(u8, u8); 5] = [
    (0x0D, 0b0100_0000),
    (0x0E, 0b0000_0011),
    (CTRL3_C, 0b0000_0100),
    (0x18, 0b0011_1000),
    (0x19, 0b0011_1000),
];

const ANGULAR_RANGES: [f32; 5] = [2.18, 4.36, 8.73, 17.45, 34.91];
const ANGULAR_BITS: [u8; 5] = [0b1000_0010, 0b1000_0000, 0b1000_0100, 0b1000_1000, 0b1000_1100];
const LINEAR_RANGES: [f32; 4] = [2.0, 4.0, 8.0, 16.0];
const LINEAR_BITS: [u8; 4] = [0b1001_0000, 0b1001_1000, 0b1001_1100, 0b1001_0100];

const PARAMETER_SHORT_NAMES: [&str; 6] = ["AX", "AY", "AZ", "LX", "LY", "LZ"];

const CONTROL_SCHEMA: &str = concat!(
    "[",
    r#"{"title": "Angular Sensitivity", "type": "options", "#,
    r#""desc": "Sensitivity of the angular movement sensor in rad/s.", "key": "asens", "#,
    r#""default_value": 8.73, "options": [2.18, 4.36, 8.73, 17.45, 34.91]},"#,
    r#"{"title": "Linear Sensitivity", "type": "options", "#,
    r#""desc": "Sensitivity of the linear movement sensor in g", "key": "lsens", "#,
    r#""default_value": 2, "options": [2, 4, 8, 16]}"#,
    "]"
);

const INFO: SensorInfo = SensorInfo {
    name: "Motion Sensor",
    short_name: "MOT",
    address: ADDRESS,
    parameter_names: &[
        "Motion Ang. X",
        "Motion Ang. Y",
        "Motion Ang. Z",
        "Motion Lin. X",
        "Motion Lin. Y",
        "Motion Lin. Z",
    ],
    parameter_short_names: &PARAMETER_SHORT_NAMES,
    control_schema: CONTROL_SCHEMA,
};

pub struct MotionSensor<I> {
    device: RegisterDevice<I>,
    state: SensorState,
    raw: [u8; 12],
    angular_range: usize,
    linear_range: usize,
}

impl<I: I2c> MotionSensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            device: RegisterDevice::new(i2c, ADDRESS),
            state: SensorState::new(),
            raw: [0; 12],
            angular_range: 2,
            linear_range: 0,
        }
    }

    /// Full-scale angular range in rad/s.
    pub fn angular_range(&self) -> f32 {
        ANGULAR_RANGES[self.angular_range]
    }

    /// Full-scale linear range in g.
    pub fn linear_range(&self) -> f32 {
        LINEAR_RANGES[self.linear_range]
    }

    fn configure(&mut self) -> Result<(), TransportError> {
        for register in CLEARED_REGISTERS {
            self.device.write_register(register, 0x00)?;
        }
        for (register, value) in SETUP {
            self.device.write_register(register, value)?;
        }
        self.write_linear_range()?;
        self.write_angular_range()
    }

    fn write_angular_range(&mut self) -> Result<(), TransportError> {
        self.device
            .write_register(CTRL2_G, ANGULAR_BITS[self.angular_range])
    }

    fn write_linear_range(&mut self) -> Result<(), TransportError> {
        self.device
            .write_register(CTRL1_XL, LINEAR_BITS[self.linear_range])
    }

    fn axis(&self, index: usize) -> f32 {
        let raw = i16::from_le_bytes([self.raw[2 * index], self.raw[2 * index + 1]]);
        f32::from(raw) / f32::from(i16::MAX)
    }
}

/// Index of `value` in `table`, compared loosely since hosts send floats.
fn range_index(table: &[f32], value: &JsonValue) -> Option<usize> {
    let value = value.as_f64()? as f32;
    table.iter().position(|r| (r - value).abs() < 1e-3)
}

impl<I: I2c> Sensor for MotionSensor<I> {
    fn info(&self) -> &SensorInfo {
        &INFO
    }

    fn state(&self) -> &SensorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SensorState {
        &mut self.state
    }

    fn init(&mut self) {
        let result = self.configure();
        self.state.note_write(result);
        if result.is_ok() {
            self.state.status = Status::READY;
        }
    }

    fn acquire(&mut self) -> Result<&[u8], TransportError> {
        self.device.read_registers(OUTX_L_G, &mut self.raw)?;
        Ok(&self.raw)
    }

    fn decode(&self, out: &mut Record) {
        let angular = self.angular_range();
        // the range is +/-, so the linear span is twice the nominal range
        let linear = self.linear_range() * 2.0;
        for (i, name) in PARAMETER_SHORT_NAMES.iter().enumerate() {
            let scale = if i < 3 { angular } else { linear };
            out.insert(name, self.axis(i) * scale);
        }
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        self.device.probe()
    }

    fn command(&mut self, key: &str, value: &JsonValue) -> Result<(), CommandError> {
        let result = match key {
            "asens" => {
                self.angular_range = range_index(&ANGULAR_RANGES, value)
                    .ok_or_else(|| CommandError::InvalidValue(key.into()))?;
                self.write_angular_range()
            }
            "lsens" => {
                self.linear_range = range_index(&LINEAR_RANGES, value)
                    .ok_or_else(|| CommandError::InvalidValue(key.into()))?;
                self.write_linear_range()
            }
            _ => return Err(CommandError::UnknownKey(key.into())),
        };
        self.state.note_write(result);
        Ok(())
    }

    /// Software reset through CTRL3_C.
    fn reset_procedure(&mut self) {
        let result = self.device.write_register(CTRL3_C, 0x01);
        self.state.note_write(result);
    }
}
