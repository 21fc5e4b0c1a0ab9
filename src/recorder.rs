//! The recorder main loop
//!
//! [`Recorder::poll`] is called from the firmware's main loop as often as it
//! likes. Each call drains inbound commands, then runs at most one pass: an
//! idle probe while standing by, or a sampling cycle while recording. Passes
//! are paced by the tick counter; a call with no pending tick returns
//! immediately.

use log::{error, info, warn};

use crate::clock::Clock;
use crate::config::NAME_CAPACITY;
use crate::cycle::{idle_cycle, record_cycle};
use crate::dispatch::{Command, ControlCommand, parse_line, route_to_sensor};
use crate::error::{CommandError, LinkError};
use crate::feedback::{self, Feedback};
use crate::link::Link;
use crate::record::Record;
use crate::scheduler::{AdaptiveScheduler, Adjustment, FrequencyChange};
use crate::sensors::SensorRegistry;
use crate::storage::{DeviceName, NameBackend, load_name, save_name};
use crate::tick::TickSource;

pub struct Recorder<'a, T, C, L, F, B> {
    scheduler: AdaptiveScheduler<'a, T>,
    registry: SensorRegistry<'a>,
    clock: C,
    link: L,
    feedback: F,
    names: B,
    name: DeviceName,
    recording_started_us: u64,
    link_up: bool,
}

impl<'a, T, C, L, F, B> Recorder<'a, T, C, L, F, B>
where
    T: TickSource,
    C: Clock,
    L: Link,
    F: Feedback,
    B: NameBackend,
{
    pub fn new(
        scheduler: AdaptiveScheduler<'a, T>,
        registry: SensorRegistry<'a>,
        clock: C,
        link: L,
        feedback: F,
        names: B,
    ) -> Self {
        Self {
            scheduler,
            registry,
            clock,
            link,
            feedback,
            names,
            name: DeviceName::new(),
            recording_started_us: 0,
            link_up: true,
        }
    }

    pub fn scheduler(&self) -> &AdaptiveScheduler<'a, T> {
        &self.scheduler
    }

    pub fn registry(&self) -> &SensorRegistry<'a> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SensorRegistry<'a> {
        &mut self.registry
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn feedback(&self) -> &F {
        &self.feedback
    }

    pub fn device_name(&self) -> &str {
        &self.name
    }

    pub fn is_recording(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Load the device name, select the idle rate and arm the first pass.
    pub fn startup(&mut self) {
        self.name = load_name(&mut self.names).unwrap_or_else(|e| {
            warn!("Could not load device name: {}", e);
            DeviceName::new()
        });
        info!("Device name: {:?}", self.name.as_str());

        let zero_run_threshold = self.scheduler.config().zero_run_threshold;
        for sensor in self.registry.iter_mut() {
            sensor.state_mut().zero_run_threshold = zero_run_threshold;
        }

        self.feedback.show(feedback::STANDBY);
        let change = self.scheduler.enter_idle();
        self.report_frequency(change);
        self.recording_started_us = self.clock.now_us();
        self.scheduler.prime();
    }

    /// Drain inbound commands and run at most one pass.
    ///
    /// Returns the record sent during this call, if a pass ran.
    pub fn poll(&mut self) -> Option<Record> {
        if !self.link.is_connected() {
            if self.link_up {
                self.feedback.show(feedback::SERIAL_DISCONNECTED);
                self.link_up = false;
            }
            self.scheduler.resync();
            return None;
        }
        if !self.link_up {
            self.link_up = true;
            self.feedback.show(if self.is_recording() {
                feedback::RECORDING
            } else {
                feedback::STANDBY
            });
        }

        self.read_commands();

        let pass = self.scheduler.begin_pass()?;
        let pass_started_us = self.clock.now_us();

        if !self.is_recording() {
            let change = self.scheduler.enter_idle();
            self.report_frequency(change);
            let record = idle_cycle(&mut self.registry, &self.name);
            self.send(&record);
            return Some(record);
        }

        let record = record_cycle(&mut self.registry, &self.clock, self.recording_started_us);
        self.send(&record);

        let pass_duration_us = self.clock.now_us().saturating_sub(pass_started_us);
        match self.scheduler.finish_pass(pass, pass_duration_us) {
            Adjustment::Steady => {}
            Adjustment::SlowedDown(change) | Adjustment::SpedUp(change) => {
                self.report_frequency(change)
            }
        }
        Some(record)
    }

    /// Decode and apply one inbound line. Failures are logged and dropped.
    pub fn handle_line(&mut self, line: &str) {
        let commands = match parse_line(line) {
            Ok(commands) => commands,
            Err(e) => {
                warn!("Discarding inbound line: {}", e);
                return;
            }
        };
        for command in commands {
            if let Err(e) = command.and_then(|c| self.apply(c)) {
                warn!("Command rejected: {}", e);
            }
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<(), CommandError> {
        match command {
            Command::Control(ControlCommand::Frequency(hz)) => {
                let change = self.scheduler.set_target_frequency(hz)?;
                self.report_frequency(change);
                Ok(())
            }
            Command::Control(ControlCommand::Run(true)) => {
                self.start_recording();
                Ok(())
            }
            Command::Control(ControlCommand::Run(false)) => {
                self.stop_recording();
                Ok(())
            }
            Command::Control(ControlCommand::Name(name)) => self.rename(&name),
            Command::Sensor { target, key, value } => {
                route_to_sensor(&mut self.registry, &target, &key, &value)
            }
        }
    }

    /// Reinitialize every sensor and switch to the target rate.
    pub fn start_recording(&mut self) {
        info!("Recording started");
        self.feedback.show(feedback::RECORDING);
        self.registry.init_all();
        self.recording_started_us = self.clock.now_us();
        let change = self.scheduler.start();
        self.report_frequency(change);
    }

    pub fn stop_recording(&mut self) {
        info!("Recording stopped");
        self.registry.stop_all();
        let change = self.scheduler.stop();
        self.feedback.show(feedback::STANDBY);
        self.report_frequency(change);
    }

    fn rename(&mut self, name: &str) -> Result<(), CommandError> {
        let name = DeviceName::try_from(name).map_err(|_| CommandError::NameTooLong(NAME_CAPACITY))?;
        save_name(&mut self.names, &name).map_err(CommandError::Store)?;
        info!("Device renamed to {:?}", name.as_str());
        self.name = name;
        Ok(())
    }

    fn read_commands(&mut self) {
        loop {
            match self.link.poll_line() {
                Ok(Some(line)) => self.handle_line(&line),
                Ok(None) => break,
                Err(e @ (LinkError::Read | LinkError::Write)) => {
                    error!("{}", e);
                    break;
                }
                Err(e) => warn!("Discarding inbound line: {}", e),
            }
        }
    }

    fn send(&mut self, record: &Record) {
        let line = match record.to_json() {
            Ok(line) => line,
            Err(e) => {
                error!("Could not serialize record: {}", e);
                return;
            }
        };
        if let Err(e) = self.link.send_line(&line) {
            warn!("Record dropped: {}", e);
        }
    }

    fn report_frequency(&mut self, change: FrequencyChange) {
        match change {
            FrequencyChange::Unchanged => {}
            FrequencyChange::Applied(hz) => self.feedback.show(&feedback::frequency_text(hz)),
            FrequencyChange::Rejected(_) => self.feedback.show(feedback::FREQUENCY_REJECTED),
        }
    }
}
