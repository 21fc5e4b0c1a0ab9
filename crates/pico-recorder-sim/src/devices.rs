//! Simulated I2C bus with the recorder's sensor chips behind it.
//!
//! Each device keeps a register pointer set by the first byte of a write and
//! answers reads with synthetic, slowly varying data.

use std::collections::BTreeMap;
use std::f32::consts::TAU;
use std::time::Instant;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

/// Behaviour of one chip on the simulated bus.
trait SimDevice {
    fn write(&mut self, bytes: &[u8]);
    fn read(&mut self, t: f32, buf: &mut [u8]);
}

/// Register-pointer chip whose data registers follow a waveform.
struct RegisterChip {
    pointer: u8,
    registers: BTreeMap<u8, u8>,
    sample: fn(f32, u8) -> Option<u8>,
}

impl RegisterChip {
    fn new(sample: fn(f32, u8) -> Option<u8>) -> Self {
        Self {
            pointer: 0,
            registers: BTreeMap::new(),
            sample,
        }
    }
}

impl SimDevice for RegisterChip {
    fn write(&mut self, bytes: &[u8]) {
        if let Some((reg, data)) = bytes.split_first() {
            self.pointer = *reg;
            for (i, b) in data.iter().enumerate() {
                self.registers.insert(reg.wrapping_add(i as u8), *b);
            }
        }
    }

    fn read(&mut self, t: f32, buf: &mut [u8]) {
        for (i, slot) in buf.iter_mut().enumerate() {
            let reg = self.pointer.wrapping_add(i as u8);
            *slot = (self.sample)(t, reg)
                .or_else(|| self.registers.get(&reg).copied())
                .unwrap_or(0);
        }
    }
}

fn wave(t: f32, period_s: f32, amplitude: f32) -> f32 {
    amplitude * (TAU * t / period_s).sin()
}

fn le_byte(value: i32, reg: u8, base: u8) -> u8 {
    value.to_le_bytes()[usize::from(reg - base) % 4]
}

/// LSM6DS3: six little-endian axes from 0x22.
fn motion_sample(t: f32, reg: u8) -> Option<u8> {
    if !(0x22..0x2E).contains(&reg) {
        return None;
    }
    let axis = usize::from(reg - 0x22) / 2;
    let value = wave(t, 1.0 + axis as f32 * 0.37, 8_000.0) as i16;
    Some(value.to_le_bytes()[usize::from(reg - 0x22) % 2])
}

/// OIS front end: background and signal from 0x54.
fn ois_sample(t: f32, reg: u8) -> Option<u8> {
    let (background, signal) = (
        (20_000.0 + wave(t, 7.0, 500.0)) as u16,
        (30_000.0 + wave(t, 0.8, 2_000.0)) as u16,
    );
    match reg {
        0x54 | 0x55 => Some(background.to_le_bytes()[usize::from(reg - 0x54)]),
        0x56 | 0x57 => Some(signal.to_le_bytes()[usize::from(reg - 0x56)]),
        _ => None,
    }
}

/// Pressure sensor: 24-bit pressure from 0x28, temperature from 0x2B.
fn pressure_sample(t: f32, reg: u8) -> Option<u8> {
    let pressure = ((760.0 + wave(t, 30.0, 3.0)) * 5460.869) as i32;
    let temperature = (2_300.0 + wave(t, 60.0, 50.0)) as i32;
    match reg {
        0x28..=0x2A => Some(le_byte(pressure, reg, 0x28)),
        0x2B | 0x2C => Some(le_byte(temperature, reg, 0x2B)),
        _ => None,
    }
}

/// DFRobot gas board answering the framed protocol at register 0.
#[derive(Default)]
struct GasBoard {
    command: u8,
}

impl GasBoard {
    fn checksum(frame: &[u8; 9]) -> u8 {
        let sum = frame[1..8].iter().fold(0u8, |a, b| a.wrapping_add(*b));
        (!sum).wrapping_add(1)
    }
}

impl SimDevice for GasBoard {
    fn write(&mut self, bytes: &[u8]) {
        // [register 0, 0xFF, 0x01, command, ...]
        if let Some(command) = bytes.get(3) {
            self.command = *command;
        }
    }

    fn read(&mut self, t: f32, buf: &mut [u8]) {
        let payload: u16 = match self.command {
            0x78 => 0x0100,
            0x86 => (40.0 + wave(t, 20.0, 10.0)) as u16,
            0x87 => (512.0 + wave(t, 45.0, 20.0)) as u16,
            _ => 0,
        };
        let [hi, lo] = payload.to_be_bytes();
        let mut frame = [0xFF, self.command, hi, lo, 0, 0, 0, 0, 0];
        frame[8] = Self::checksum(&frame);
        for (slot, b) in buf.iter_mut().zip(frame) {
            *slot = b;
        }
    }
}

/// The simulated bus. Unknown addresses NACK.
pub struct SimBus {
    devices: BTreeMap<u8, Box<dyn SimDevice + Send>>,
    started: Instant,
}

impl SimBus {
    pub fn new() -> Self {
        let mut devices: BTreeMap<u8, Box<dyn SimDevice + Send>> = BTreeMap::new();
        devices.insert(0x6B, Box::new(RegisterChip::new(motion_sample)));
        devices.insert(0x5B, Box::new(RegisterChip::new(ois_sample)));
        devices.insert(0x5C, Box::new(RegisterChip::new(pressure_sample)));
        devices.insert(0x01, Box::new(GasBoard::default()));
        Self {
            devices,
            started: Instant::now(),
        }
    }
}

impl ErrorType for SimBus {
    type Error = ErrorKind;
}

impl I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let t = self.started.elapsed().as_secs_f32();
        let device = self
            .devices
            .get_mut(&address)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))?;
        for op in operations {
            match op {
                Operation::Write(bytes) => device.write(bytes),
                Operation::Read(buf) => device.read(t, buf),
            }
        }
        Ok(())
    }
}
