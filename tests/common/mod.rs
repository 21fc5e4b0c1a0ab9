//! Host fakes shared by the scenario tests.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use pico_recorder::{
    Clock, Feedback, Link, LinkError, MemoryBackend, Record, Recorder, Sensor, SensorInfo,
    SensorState, TickSource, TransportError,
};

/// Accepts every rate up to `max_hz` except the `refused` ones.
#[derive(Default)]
pub struct LimitedTickSource {
    pub max_hz: f32,
    pub refused: Vec<f32>,
    pub configured: Rc<RefCell<Vec<f32>>>,
    /// Rate the timer actually runs at
    pub running_hz: f32,
}

impl LimitedTickSource {
    pub fn new(max_hz: f32) -> Self {
        Self {
            max_hz,
            ..Self::default()
        }
    }
}

impl TickSource for LimitedTickSource {
    fn configure(&mut self, frequency_hz: f32) -> bool {
        self.configured.borrow_mut().push(frequency_hz);
        if frequency_hz > self.max_hz || self.refused.contains(&frequency_hz) {
            return false;
        }
        self.running_hz = frequency_hz;
        true
    }
}

/// Clock advanced by hand; shared through `Rc` so sensors can cost time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now_us: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn advance_us(&self, us: u64) {
        self.now_us.set(self.now_us.get() + us);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.get()
    }
}

#[derive(Default)]
pub struct QueueLink {
    pub inbound: VecDeque<String>,
    pub sent: Vec<String>,
}

impl Link for QueueLink {
    fn poll_line(&mut self) -> Result<Option<String>, LinkError> {
        Ok(self.inbound.pop_front())
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.sent.push(line.into());
        Ok(())
    }
}

#[derive(Default)]
pub struct Shown(pub Vec<String>);

impl Feedback for Shown {
    fn show(&mut self, text: &str) {
        self.0.push(text.into());
    }
}

/// Shared knobs and counters of a [`StubSensor`].
#[derive(Default)]
pub struct StubControl {
    pub failing: Cell<bool>,
    pub resets: Cell<u32>,
    pub samples: Cell<u32>,
    /// Time one sample costs on the shared clock
    pub sample_cost_us: Cell<u64>,
}

pub struct StubSensor {
    info: SensorInfo,
    state: SensorState,
    raw: [u8; 2],
    clock: ManualClock,
    pub control: Rc<StubControl>,
}

impl StubSensor {
    pub fn new(short_name: &'static str, clock: ManualClock) -> Self {
        Self {
            info: SensorInfo {
                name: "Stub",
                short_name,
                address: 0x20,
                parameter_names: &["Level"],
                parameter_short_names: &["LVL"],
                control_schema: "[]",
            },
            state: SensorState::new(),
            raw: [0; 2],
            clock,
            control: Rc::new(StubControl::default()),
        }
    }
}

impl Sensor for StubSensor {
    fn info(&self) -> &SensorInfo {
        &self.info
    }

    fn state(&self) -> &SensorState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut SensorState {
        &mut self.state
    }

    fn init(&mut self) {}

    fn acquire(&mut self) -> Result<&[u8], TransportError> {
        self.clock.advance_us(self.control.sample_cost_us.get());
        self.control.samples.set(self.control.samples.get() + 1);
        if self.control.failing.get() {
            return Err(TransportError::DataNack);
        }
        self.raw = [1, 2];
        Ok(&self.raw)
    }

    fn decode(&self, out: &mut Record) {
        out.insert("LVL", u16::from_le_bytes(self.raw) as u32);
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn reset_procedure(&mut self) {
        self.control.resets.set(self.control.resets.get() + 1);
    }
}

pub type TestRecorder<'a> =
    Recorder<'a, LimitedTickSource, ManualClock, QueueLink, Shown, MemoryBackend>;

/// Parse every record the link sent so far.
pub fn sent_records(recorder: &mut TestRecorder<'_>) -> Vec<serde_json::Value> {
    recorder
        .link_mut()
        .sent
        .drain(..)
        .map(|line| serde_json::from_str(&line).expect("records are valid JSON"))
        .collect()
}
