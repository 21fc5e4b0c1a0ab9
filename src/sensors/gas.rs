//! DFRobot electrochemical gas sensors
//!
//! The boards speak a small framed protocol over I2C: every request and
//! response is nine bytes, `[0xFF, 0x01, cmd, args.., checksum]`, written to
//! and read from register 0. The concentration request goes out in the
//! trigger pass so the board has the rest of the cycle to answer; the
//! temperature (a thermistor ADC reading) is fetched right after the
//! concentration response.
//!
//! Readings whose frame fails the checksum are replaced by the sentinel.

use embedded_hal::i2c::I2c;
use log::{debug, warn};
use serde_json::Value as JsonValue;

use super::bus::RegisterDevice;
use super::{Sensor, SensorInfo, SensorState, Status};
use crate::error::{CommandError, TransportError};
use crate::record::{Record, SENTINEL};

const FRAME_LEN: usize = 9;
const HEAD: u8 = 0xFF;
const BOARD: u8 = 0x01;

const CMD_CHANGE_MODE: u8 = 0x78;
const CMD_GAS_CONCENTRATION: u8 = 0x86;
const CMD_TEMPERATURE: u8 = 0x87;

/// Argument of `CMD_CHANGE_MODE` selecting continuous acquisition
const MODE_ACTIVE: u8 = 0x03;

/// Thermistor divider reference voltage
const VREF: f32 = 3.0;
const THERMISTOR_R25: f32 = 10_000.0;
const THERMISTOR_BETA: f32 = 3380.13;
const KELVIN: f32 = 273.15;

const CONTROL_SCHEMA: &str = concat!(
    "[",
    r#"{"title": "Temperature Compensation", "type": "bool", "#,
    r#""desc": "Correct the concentration for the board temperature", "#,
    r#""key": "tcomp", "default_value": false}"#,
    "]"
);

/// Gas measured by a board, with its calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasKind {
    Ammonia,
    CarbonMonoxide,
    Oxygen,
}

impl GasKind {
    /// Factory I2C address of the board.
    pub const fn default_address(self) -> u8 {
        match self {
            Self::Ammonia => 0x01,
            Self::CarbonMonoxide => 0x04,
            Self::Oxygen => 0x75,
        }
    }

    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Ammonia => "NH3",
            Self::CarbonMonoxide => "CO",
            Self::Oxygen => "O2",
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Ammonia => "Ammonia Resistance Sensor",
            Self::CarbonMonoxide => "Carbon Monoxide Resistance Sensor",
            Self::Oxygen => "Oxygen Resistance Sensor",
        }
    }

    /// Short name of the concentration parameter.
    pub const fn concentration_key(self) -> &'static str {
        match self {
            Self::Oxygen => "% Vol",
            _ => "PPM",
        }
    }

    const fn parameter_names(self) -> &'static [&'static str] {
        match self {
            Self::Oxygen => &["Temperature, deg C", "Percent by Volume"],
            _ => &["Temperature, deg C", "Parts per million, PPM"],
        }
    }

    const fn parameter_short_names(self) -> &'static [&'static str] {
        match self {
            Self::Oxygen => &["Temp", "% Vol"],
            _ => &["Temp", "PPM"],
        }
    }

    /// Units of one raw concentration count.
    pub const fn scale(self) -> f32 {
        match self {
            Self::Ammonia => 1.0,
            Self::CarbonMonoxide | Self::Oxygen => 0.1,
        }
    }

    /// Temperature-corrected concentration, `None` outside the calibrated
    /// range of the board.
    pub fn compensate(self, concentration: f32, temp_c: f32) -> Option<f32> {
        let c = concentration;
        let t = temp_c;
        match self {
            Self::Ammonia => {
                if t > -40.0 && t <= 0.0 {
                    Some(c / (0.006 * t + 0.95) - (-0.006 * t + 0.25))
                } else if t > 0.0 && t <= 20.0 {
                    Some(c / (0.006 * t + 0.95) - (-0.012 * t + 0.25))
                } else if t > 20.0 && t < 40.0 {
                    Some(c / (0.005 * t + 1.08) - (-0.1 * t + 2.0))
                } else {
                    None
                }
            }
            Self::CarbonMonoxide => {
                if t > -40.0 && t <= 20.0 {
                    Some(c / (0.005 * t + 0.9))
                } else if t > 20.0 && t < 40.0 {
                    Some(c / (0.005 * t + 0.9) - (0.3 * t - 6.0))
                } else {
                    None
                }
            }
            Self::Oxygen => Some(c),
        }
    }
}

/// Two's complement of the sum of the address, command and argument bytes.
fn checksum(frame: &[u8]) -> u8 {
    let sum = frame[1..FRAME_LEN - 1]
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

fn request(command: u8, argument: u8) -> [u8; FRAME_LEN] {
    let mut frame = [HEAD, BOARD, command, argument, 0, 0, 0, 0, 0];
    frame[FRAME_LEN - 1] = checksum(&frame);
    frame
}

/// Big-endian payload of a response, if its checksum holds.
fn payload(frame: &[u8]) -> Option<u16> {
    (frame[FRAME_LEN - 1] == checksum(frame)).then(|| u16::from_be_bytes([frame[2], frame[3]]))
}

/// Board temperature from the thermistor ADC count.
fn thermistor_celsius(adc: u16) -> Option<f32> {
    let volts = VREF * f32::from(adc) / 1024.0;
    let resistance = volts * THERMISTOR_R25 / (VREF - volts);
    if !(resistance.is_finite() && resistance > 0.0) {
        return None;
    }
    let inverse = 1.0 / (KELVIN + 25.0) + libm::logf(resistance / THERMISTOR_R25) / THERMISTOR_BETA;
    let celsius = 1.0 / inverse - KELVIN;
    celsius.is_finite().then_some(celsius)
}

pub struct GasSensor<I> {
    device: RegisterDevice<I>,
    kind: GasKind,
    info: SensorInfo,
    state: SensorState,
    /// Concentration response followed by the temperature response
    raw: [u8; 2 * FRAME_LEN],
    temperature_compensation: bool,
}

impl<I: I2c> GasSensor<I> {
    pub fn new(i2c: I, kind: GasKind) -> Self {
        Self::with_address(i2c, kind, kind.default_address())
    }

    pub fn with_address(i2c: I, kind: GasKind, address: u8) -> Self {
        Self {
            device: RegisterDevice::new(i2c, address),
            kind,
            info: SensorInfo {
                name: kind.name(),
                short_name: kind.short_name(),
                address,
                parameter_names: kind.parameter_names(),
                parameter_short_names: kind.parameter_short_names(),
                control_schema: CONTROL_SCHEMA,
            },
            state: SensorState::new(),
            raw: [0; 2 * FRAME_LEN],
            temperature_compensation: false,
        }
    }

    pub fn kind(&self) -> GasKind {
        self.kind
    }

    pub fn temperature_compensation(&self) -> bool {
        self.temperature_compensation
    }

    fn send(&mut self, command: u8, argument: u8) -> Result<(), TransportError> {
        self.device.write_registers(0, &request(command, argument))
    }

    fn receive(&mut self, frame: usize) -> Result<(), TransportError> {
        let range = frame * FRAME_LEN..(frame + 1) * FRAME_LEN;
        self.device.read_registers(0, &mut self.raw[range])
    }

    fn enter_active_mode(&mut self) -> Result<bool, TransportError> {
        self.send(CMD_CHANGE_MODE, MODE_ACTIVE)?;
        self.receive(0)?;
        Ok(payload(&self.raw[..FRAME_LEN]).is_some() && self.raw[2] == 1)
    }

    fn temperature(&self) -> Option<f32> {
        payload(&self.raw[FRAME_LEN..]).and_then(thermistor_celsius)
    }

    fn concentration(&self) -> Option<f32> {
        let raw = payload(&self.raw[..FRAME_LEN])?;
        let concentration = f32::from(raw) * self.kind.scale();
        if self.temperature_compensation {
            self.kind.compensate(concentration, self.temperature()?)
        } else {
            Some(concentration)
        }
    }
}

impl<I: I2c> Sensor for GasSensor<I> {
    fn info(&self) -> &SensorInfo {
        &self.info
    }

    fn state(&self) -> &SensorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SensorState {
        &mut self.state
    }

    fn init(&mut self) {
        match self.enter_active_mode() {
            Ok(confirmed) => {
                if !confirmed {
                    warn!("{}: mode change not confirmed", self.info.short_name);
                }
                self.state.status = Status::WARMING_UP;
            }
            Err(e) => self.state.note_write(Err(e)),
        }
    }

    fn trigger(&mut self) {
        let result = self.send(CMD_GAS_CONCENTRATION, 0);
        self.state.note_write(result);
    }

    fn acquire(&mut self) -> Result<&[u8], TransportError> {
        self.receive(0)?;
        self.send(CMD_TEMPERATURE, 0)?;
        self.receive(1)?;

        if self.state.status == Status::WARMING_UP && payload(&self.raw[..FRAME_LEN]).is_some() {
            debug!("{} warmed up", self.info.short_name);
            self.state.status = Status::READY;
        }
        Ok(&self.raw)
    }

    fn decode(&self, out: &mut Record) {
        match self.temperature() {
            Some(t) => out.insert("Temp", t),
            None => out.insert("Temp", SENTINEL),
        }
        let key = self.kind.concentration_key();
        match self.concentration() {
            Some(c) => out.insert(key, c),
            None => out.insert(key, SENTINEL),
        }
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        self.device.probe()
    }

    fn command(&mut self, key: &str, value: &JsonValue) -> Result<(), CommandError> {
        match key {
            "tcomp" => {
                self.temperature_compensation = value
                    .as_bool()
                    .ok_or_else(|| CommandError::InvalidValue(key.into()))?;
                Ok(())
            }
            _ => Err(CommandError::UnknownKey(key.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::SensorExt;
    use super::super::bus::tests::FakeBus;
    use super::*;

    fn response(value: u16) -> [u8; FRAME_LEN] {
        let [hi, lo] = value.to_be_bytes();
        let mut frame = [HEAD, 0x86, hi, lo, 0, 0, 0, 0, 0];
        frame[FRAME_LEN - 1] = checksum(&frame);
        frame
    }

    /// Sensor whose last acquisition returned `frames`.
    fn sensor_reading(kind: GasKind, frames: &[[u8; FRAME_LEN]]) -> GasSensor<FakeBus> {
        let mut sensor = GasSensor::new(FakeBus::default(), kind);
        sensor.state_mut().status = Status::WARMING_UP;
        for (i, frame) in frames.iter().enumerate() {
            sensor.raw[i * FRAME_LEN..(i + 1) * FRAME_LEN].copy_from_slice(frame);
        }
        sensor
    }

    #[test]
    fn test_request_checksum() {
        let frame = request(CMD_GAS_CONCENTRATION, 0);
        assert_eq!(frame[..3], [0xFF, 0x01, 0x86]);
        assert_eq!(frame[8], 0x79);
        let total = frame[1..].iter().fold(0u8, |a, b| a.wrapping_add(*b));
        assert_eq!(total, 0);
    }

    #[test]
    fn test_corrupt_frame_decodes_to_sentinel() {
        let mut bad = response(100);
        bad[3] ^= 0x01;
        let sensor = sensor_reading(GasKind::Ammonia, &[bad, bad]);
        let mut out = Record::new();
        sensor.decode(&mut out);
        assert_eq!(out.get("PPM"), Some(&SENTINEL));
        assert_eq!(out.get("Temp"), Some(&SENTINEL));
    }

    #[test]
    fn test_scaled_concentration() {
        let sensor = sensor_reading(GasKind::CarbonMonoxide, &[response(125), response(512)]);
        let mut out = Record::new();
        sensor.decode(&mut out);
        let ppm = out.get("PPM").unwrap().as_f32().unwrap();
        assert!((ppm - 12.5).abs() < 1e-4);
    }

    #[test]
    fn test_thermistor_at_half_scale_is_25_degrees() {
        // 512 counts is half the reference, so R equals R25
        let t = thermistor_celsius(512).unwrap();
        assert!((t - 25.0).abs() < 1e-3);
        assert!(thermistor_celsius(1024).is_none());
        assert!(thermistor_celsius(0).is_none());
    }

    #[test]
    fn test_oxygen_uses_percent_key() {
        let sensor = sensor_reading(GasKind::Oxygen, &[response(209), response(512)]);
        let mut out = Record::new();
        sensor.decode(&mut out);
        assert!((out.get("% Vol").unwrap().as_f32().unwrap() - 20.9).abs() < 1e-4);
        assert_eq!(sensor.info().short_name, "O2");
    }

    #[test]
    fn test_temperature_compensation() {
        assert_eq!(GasKind::Ammonia.compensate(10.0, 45.0), None);
        let c = GasKind::CarbonMonoxide.compensate(10.0, 10.0).unwrap();
        assert!((c - 10.0 / 0.95).abs() < 1e-4);

        let mut sensor = sensor_reading(GasKind::Ammonia, &[response(10), response(512)]);
        sensor.handle_command("tcomp", &JsonValue::Bool(true)).unwrap();
        let mut out = Record::new();
        sensor.decode(&mut out);
        let expected = GasKind::Ammonia.compensate(10.0, 25.0).unwrap();
        assert!((out.get("PPM").unwrap().as_f32().unwrap() - expected).abs() < 1e-2);
    }

    #[test]
    fn test_warming_up_until_valid_frame() {
        let mut sensor = GasSensor::new(FakeBus::default(), GasKind::Ammonia);
        sensor.init();
        assert_eq!(sensor.state().status, Status::WARMING_UP);

        // the fake echoes the last written request, whose checksum is valid
        sensor.trigger();
        sensor.sample();
        assert_eq!(sensor.state().status, Status::READY);
    }

    #[test]
    fn test_bus_failure_during_acquire() {
        let mut sensor = GasSensor::new(FakeBus::default(), GasKind::Ammonia);
        sensor.device.bus_mut().fail = Some(embedded_hal::i2c::ErrorKind::Bus);
        sensor.sample();
        assert_eq!(sensor.state().error_count, 1);
        assert!(sensor.state().status.is_error());
    }
}
