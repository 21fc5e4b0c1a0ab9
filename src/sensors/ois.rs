//! Optical intrinsic signal sensor
//!
//! A photometric front end with a green illumination LED and a blue LED used
//! for timed stimulation pulses. Each sample is a one-shot conversion started
//! by [`Sensor::trigger`]. While a pulse runs the status reads
//! [`STIMULATING`]; the pulse ends on its own once its duration elapsed on the
//! sensor's clock, or when recording stops.

use embedded_hal::i2c::I2c;
use log::debug;
use serde_json::Value as JsonValue;

use super::bus::RegisterDevice;
use super::{Sensor, SensorInfo, SensorState, Status};
use crate::clock::Clock;
use crate::error::{CommandError, TransportError};
use crate::record::Record;

pub const ADDRESS: u8 = 0x5B;

/// Status while a blue stimulation pulse is running
pub const STIMULATING: Status = Status(10);

/// Highest LED drive code
pub const MAX_AMP: u8 = 63;

const MODE: u8 = 0x41;
const LED_CURRENT: u8 = 0x42;
const ONE_SHOT: u8 = 0x47;
const DATA: u8 = 0x54;

const MODE_GREEN: u8 = 0x87;
const MODE_STIM: u8 = 0x97;

const CONTROL_SCHEMA: &str = concat!(
    "[",
    r#"{"title": "Blue Light Stimulation", "type": "stim", "#,
    r#""desc": "Create / Start / Stop blue light stimulation protocol", "key": "stim"},"#,
    r#"{"title": "Green Led Intensity", "type": "plusminin", "#,
    r#""desc": "Green LED power in %", "key": "amps", "#,
    r#""steps": [[0, 10, 1], [10, 20, 2], [20, 60, 5], [60, 200, 10]], "#,
    r#""limits": [0, 100], "default_value": 25, "live_widget": true}"#,
    "]"
);

const INFO: SensorInfo = SensorInfo {
    name: "Optical Intrinsic Signal",
    short_name: "OIS",
    address: ADDRESS,
    parameter_names: &[
        "OIS Background",
        "OIS Signal",
        "OIS Stimulation mA",
        "OIS Green LED mA",
    ],
    parameter_short_names: &["BGR", "SIG", "STIM", "PWR"],
    control_schema: CONTROL_SCHEMA,
};

/// Convert a 0-100 % power request into an LED drive code.
fn percent_to_amp(percent: f64) -> Option<u8> {
    if percent.is_nan() || percent < 0.0 {
        return None;
    }
    let amp = (percent / 100.0) * f64::from(MAX_AMP);
    Some((amp as u8).min(MAX_AMP))
}

pub struct OisSensor<I, C> {
    device: RegisterDevice<I>,
    clock: C,
    state: SensorState,
    raw: [u8; 4],
    green_amps: u8,
    stim_amps: u8,
    stim_end_ms: u64,
}

impl<I: I2c, C: Clock> OisSensor<I, C> {
    pub fn new(i2c: I, clock: C) -> Self {
        Self {
            device: RegisterDevice::new(i2c, ADDRESS),
            clock,
            state: SensorState::new(),
            raw: [0; 4],
            green_amps: 5,
            stim_amps: 0,
            stim_end_ms: 0,
        }
    }

    pub fn green_amps(&self) -> u8 {
        self.green_amps
    }

    /// Drive code of the running pulse, 0 when not stimulating.
    pub fn stim_amps(&self) -> u8 {
        self.stim_amps
    }

    fn set_green(&mut self, amp: u8) -> Result<(), TransportError> {
        self.green_amps = amp.min(MAX_AMP);
        self.device
            .write_registers(LED_CURRENT, &[self.green_amps, self.green_amps])?;
        self.device.write_register(MODE, MODE_GREEN)?;
        self.state.status = Status::READY;
        Ok(())
    }

    fn set_stim(&mut self, amp: u8) -> Result<(), TransportError> {
        let amp = amp.min(MAX_AMP);
        self.device
            .write_registers(LED_CURRENT, &[0b10 << 6 | amp, 0b1 << 7 | amp])?;
        self.device.write_register(MODE, MODE_STIM)?;
        self.stim_amps = amp;
        self.state.status = STIMULATING;
        Ok(())
    }

    /// End any pulse and go back to green illumination.
    fn end_stimulation(&mut self) {
        self.stim_amps = 0;
        let result = self.set_green(self.green_amps);
        self.state.note_write(result);
    }

    fn check_stimulation(&mut self) {
        if self.stim_amps > 0 && self.clock.now_ms() >= self.stim_end_ms {
            debug!("OIS stimulation ended");
            self.end_stimulation();
        }
    }

    /// Start a pulse from `[duration_ms, percent]`. A zero power ends any pulse.
    fn start_stimulation(&mut self, value: &JsonValue) -> Result<(), CommandError> {
        let invalid = || CommandError::InvalidValue("stim".into());
        let args = value.as_array().ok_or_else(invalid)?;
        let (duration, percent) = match args.as_slice() {
            [duration, percent] => (duration.as_u64(), percent.as_f64()),
            _ => return Err(invalid()),
        };
        let duration_ms = duration.ok_or_else(invalid)?;
        let amp = percent.and_then(percent_to_amp).ok_or_else(invalid)?;

        self.stim_end_ms = self.clock.now_ms().saturating_add(duration_ms);
        if amp > 0 {
            let result = self.set_stim(amp);
            self.state.note_write(result);
        } else {
            self.end_stimulation();
        }
        Ok(())
    }
}

impl<I: I2c, C: Clock> Sensor for OisSensor<I, C> {
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
        self.stim_amps = 0;
        let result = self.set_green(self.green_amps);
        self.state.note_write(result);
    }

    fn trigger(&mut self) {
        let result = self.device.write_register(ONE_SHOT, 0x01);
        self.state.note_write(result);
    }

    fn acquire(&mut self) -> Result<&[u8], TransportError> {
        self.check_stimulation();
        self.device.read_registers(DATA, &mut self.raw)?;
        Ok(&self.raw)
    }

    fn decode(&self, out: &mut Record) {
        let background = u16::from_le_bytes([self.raw[0], self.raw[1]]);
        let signal = u16::from_le_bytes([self.raw[2], self.raw[3]]);
        out.insert("BGR", f32::from(background) / f32::from(u16::MAX));
        out.insert("SIG", f32::from(signal) / f32::from(u16::MAX));
        out.insert("STIM", self.stim_amps);
        out.insert("PWR", self.green_amps);
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        self.device.probe()
    }

    fn command(&mut self, key: &str, value: &JsonValue) -> Result<(), CommandError> {
        match key {
            "amps" => {
                let amp = value
                    .as_f64()
                    .and_then(percent_to_amp)
                    .ok_or_else(|| CommandError::InvalidValue(key.into()))?;
                self.green_amps = amp;
                if self.stim_amps == 0 {
                    let result = self.set_green(amp);
                    self.state.note_write(result);
                }
                Ok(())
            }
            "stim" => self.start_stimulation(value),
            _ => Err(CommandError::UnknownKey(key.into())),
        }
    }

    fn stop(&mut self) {
        self.end_stimulation();
    }
}

#[cfg(test)]
mod tests {
    use super::super::SensorExt;
    use super::super::bus::tests::FakeBus;
    use super::*;
    use crate::clock::tests::FakeClock;

    fn sensor(clock: &FakeClock) -> OisSensor<FakeBus, &FakeClock> {
        OisSensor::new(FakeBus::default(), clock)
    }

    #[test]
    fn test_init_selects_green_mode() {
        let clock = FakeClock::default();
        let mut ois = sensor(&clock);
        ois.init();
        assert_eq!(ois.device.bus().register(MODE), Some(MODE_GREEN));
        assert_eq!(ois.device.bus().register(LED_CURRENT), Some(5));
        assert_eq!(ois.state().status, Status::READY);
    }

    #[test]
    fn test_trigger_starts_one_shot() {
        let clock = FakeClock::default();
        let mut ois = sensor(&clock);
        ois.trigger();
        assert_eq!(ois.device.bus().writes.last().unwrap()[..], [ONE_SHOT, 0x01]);
    }

    #[test]
    fn test_decode_normalizes_channels() {
        let clock = FakeClock::default();
        let mut ois = sensor(&clock);
        ois.device
            .bus_mut()
            .set_registers(DATA, &[0xFF, 0xFF, 0x00, 0x00]);
        ois.sample();
        let record = ois.report();
        assert_eq!(record.get("BGR").unwrap().as_f32(), Some(1.0));
        assert_eq!(record.get("SIG").unwrap().as_f32(), Some(0.0));
        assert_eq!(record.get("PWR").unwrap().as_i64(), Some(5));
    }

    #[test]
    fn test_amps_command_is_percent_of_max() {
        let clock = FakeClock::default();
        let mut ois = sensor(&clock);
        ois.handle_command("amps", &JsonValue::from(100)).unwrap();
        assert_eq!(ois.green_amps(), MAX_AMP);
        ois.handle_command("amps", &JsonValue::from(50.0)).unwrap();
        assert_eq!(ois.green_amps(), 31);
        assert!(ois.handle_command("amps", &JsonValue::from(-1)).is_err());
    }

    #[test]
    fn test_stimulation_expires_on_clock() {
        let clock = FakeClock::default();
        let mut ois = sensor(&clock);
        ois.init();
        ois.handle_command("stim", &serde_json::json!([200, 100]))
            .unwrap();
        assert_eq!(ois.stim_amps(), MAX_AMP);
        assert_eq!(ois.state().status, STIMULATING);
        assert_eq!(ois.device.bus().register(MODE), Some(MODE_STIM));
        assert_eq!(
            ois.device.bus().register(LED_CURRENT),
            Some(0b1000_0000 | MAX_AMP)
        );

        clock.advance_ms(199);
        ois.sample();
        assert_eq!(ois.stim_amps(), MAX_AMP);

        clock.advance_ms(1);
        ois.sample();
        assert_eq!(ois.stim_amps(), 0);
        assert_eq!(ois.state().status, Status::READY);
        assert_eq!(ois.device.bus().register(MODE), Some(MODE_GREEN));
    }

    #[test]
    fn test_stop_ends_stimulation() {
        let clock = FakeClock::default();
        let mut ois = sensor(&clock);
        ois.handle_command("stim", &serde_json::json!([10_000, 50]))
            .unwrap();
        ois.stop();
        assert_eq!(ois.stim_amps(), 0);
        assert_eq!(ois.device.bus().register(MODE), Some(MODE_GREEN));
    }

    #[test]
    fn test_endless_stim_duration_saturates() {
        let clock = FakeClock::default();
        let mut ois = sensor(&clock);
        clock.advance_ms(5);
        ois.handle_command("stim", &serde_json::json!([u64::MAX, 50]))
            .unwrap();
        assert_eq!(ois.stim_end_ms, u64::MAX);

        clock.advance_ms(60_000);
        ois.check_stimulation();
        assert_eq!(ois.stim_amps(), percent_to_amp(50.0).unwrap());
    }

    #[test]
    fn test_malformed_stim_is_rejected() {
        let clock = FakeClock::default();
        let mut ois = sensor(&clock);
        assert_eq!(
            ois.handle_command("stim", &serde_json::json!([100])),
            Err(CommandError::InvalidValue("stim".into()))
        );
        assert_eq!(ois.stim_amps(), 0);
    }
}
