//! Scripted sensor used by the unit tests of this crate.

use std::cell::RefCell;
use std::rc::Rc;
use std::vec::Vec;

use serde_json::Value as JsonValue;

use super::{Sensor, SensorInfo, SensorState};
use crate::error::{CommandError, TransportError};
use crate::record::Record;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Init,
    Trigger,
    Acquire,
    ResetProcedure,
    Stop,
    Command(String),
}

#[derive(Default)]
pub(crate) struct Script {
    pub fail: Option<TransportError>,
    pub probe_fail: bool,
    pub raw: Vec<u8>,
}

/// Ordered log of hook calls, shareable between sensors.
pub(crate) type Journal = Rc<RefCell<Vec<(&'static str, Event)>>>;

pub(crate) struct ScriptedSensor {
    pub info: SensorInfo,
    state: SensorState,
    raw: Vec<u8>,
    script: Rc<RefCell<Script>>,
    journal: Journal,
}

impl ScriptedSensor {
    pub fn new(short_name: &'static str) -> Self {
        Self::with_journal(short_name, Journal::default())
    }

    pub fn with_journal(short_name: &'static str, journal: Journal) -> Self {
        Self {
            info: SensorInfo {
                name: "Scripted Sensor",
                short_name,
                address: 0x10,
                parameter_names: &["Value"],
                parameter_short_names: &["V"],
                control_schema: "[]",
            },
            state: SensorState::new(),
            raw: Vec::new(),
            script: Rc::new(RefCell::new(Script {
                raw: std::vec![1],
                ..Script::default()
            })),
            journal,
        }
    }

    /// Handle to change the script after the sensor was registered.
    pub fn script(&self) -> Rc<RefCell<Script>> {
        self.script.clone()
    }

    pub fn fail_with(&mut self, error: Option<TransportError>) {
        self.script.borrow_mut().fail = error;
    }

    pub fn probe_fails(&mut self, fails: bool) {
        self.script.borrow_mut().probe_fail = fails;
    }

    pub fn set_raw(&mut self, raw: &[u8]) {
        self.script.borrow_mut().raw = raw.to_vec();
    }

    /// Drain the events this sensor logged.
    pub fn take_events(&mut self) -> Vec<Event> {
        take_events(&self.journal, self.info.short_name)
    }

    fn log(&self, event: Event) {
        self.journal
            .borrow_mut()
            .push((self.info.short_name, event));
    }
}

pub(crate) fn take_events(journal: &Journal, short_name: &str) -> Vec<Event> {
    let mut journal = journal.borrow_mut();
    let (mine, rest): (Vec<_>, Vec<_>) = journal.drain(..).partition(|(n, _)| *n == short_name);
    *journal = rest;
    mine.into_iter().map(|(_, e)| e).collect()
}

impl Sensor for ScriptedSensor {
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
        self.log(Event::Init);
    }

    fn trigger(&mut self) {
        self.log(Event::Trigger);
    }

    fn acquire(&mut self) -> Result<&[u8], TransportError> {
        self.log(Event::Acquire);
        let script = self.script.borrow();
        if let Some(e) = script.fail {
            return Err(e);
        }
        self.raw = script.raw.clone();
        drop(script);
        Ok(&self.raw)
    }

    fn decode(&self, out: &mut Record) {
        out.insert("V", self.raw.first().copied().unwrap_or_default());
    }

    fn probe(&mut self) -> Result<(), TransportError> {
        if self.script.borrow().probe_fail {
            Err(TransportError::AddressNack)
        } else {
            Ok(())
        }
    }

    fn command(&mut self, key: &str, _value: &JsonValue) -> Result<(), CommandError> {
        if key == "ping" {
            self.log(Event::Command(key.into()));
            Ok(())
        } else {
            Err(CommandError::UnknownKey(key.into()))
        }
    }

    fn reset_procedure(&mut self) {
        self.log(Event::ResetProcedure);
    }

    fn stop(&mut self) {
        self.log(Event::Stop);
    }
}
