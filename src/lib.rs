//! Adaptive-rate sensor recorder core
//!
//! This crate contains the platform-agnostic logic of the recorder firmware:
//! the tick-driven adaptive scheduler, the sensor abstraction with its I2C
//! drivers, the sampling cycle and the JSON command link.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on the
//! microcontroller and on desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod cycle;
pub mod dispatch;
pub mod error;
pub mod feedback;
pub mod link;
pub mod record;
pub mod recorder;
pub mod scheduler;
pub mod sensors;
pub mod storage;
pub mod tick;

pub use clock::{Clock, EmbassyClock};
pub use config::RecorderConfig;
pub use dispatch::{Command, ControlCommand};
pub use error::{CommandError, LinkError, StoreError, TransportError};
pub use feedback::{Feedback, LogFeedback};
pub use link::{Link, SerialLink};
pub use record::{Record, Value};
pub use recorder::Recorder;
pub use scheduler::{AdaptiveScheduler, Adjustment, FrequencyChange};
pub use sensors::{Sensor, SensorExt, SensorInfo, SensorRegistry, SensorState, Status};
pub use storage::{DeviceName, MemoryBackend, NameBackend};
pub use tick::{TickCounter, TickSource};
