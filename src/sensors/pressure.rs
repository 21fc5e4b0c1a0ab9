//! Internal barometric pressure sensor

use embedded_hal::i2c::I2c;

use super::bus::RegisterDevice;
use super::{Sensor, SensorInfo, SensorState, Status};
use crate::error::TransportError;
use crate::record::Record;

pub const ADDRESS: u8 = 0x5C;

const CTRL_REG1: u8 = 0x10;
const PRESS_OUT_XL: u8 = 0x28;

/// 50 Hz output data rate
const ODR_50HZ: u8 = 0x50;

/// Raw counts per mmHg
const COUNTS_PER_MMHG: f32 = 5460.869_12;

const INFO: SensorInfo = SensorInfo {
    name: "Pressure Internal",
    short_name: "PInt",
    address: ADDRESS,
    parameter_names: &["Pressure", "Temperature"],
    parameter_short_names: &["PR", "TMP"],
    control_schema: "[]",
};

pub struct PressureSensor<I> {
    device: RegisterDevice<I>,
    state: SensorState,
    raw: [u8; 5],
}

impl<I: I2c> PressureSensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            device: RegisterDevice::new(i2c, ADDRESS),
            state: SensorState::new(),
            raw: [0; 5],
        }
    }
}

impl<I: I2c> Sensor for PressureSensor<I> {
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
        let result = self.device.write_register(CTRL_REG1, ODR_50HZ);
        self.state.note_write(result);
        if result.is_ok() {
            self.state.status = Status::READY;
        }
    }

    fn acquire(&mut self) -> Result<&[u8], TransportError> {
        self.device.read_registers(PRESS_OUT_XL, &mut self.raw)?;
        Ok(&self.raw)
    }

    fn decode(&self, out: &mut Record) {
        let [p0, p1, p2, t0, t1] = self.raw;
        let pressure = u32::from_le_bytes([p0, p1, p2, 0]);
        let temperature = i16::from_le_bytes([t0, t1]);
        out.insert("PR", pressure as f32 / COUNTS_PER_MMHG);
        out.insert("TMP", f32::from(temperature) / 100.0);
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        self.device.probe()
    }
}
