//! Short status texts for the operator
//!
//! The recorder reports its state through a [`Feedback`] sink: a small
//! display on the device, or just the log.

use core::fmt::Write;
use heapless::String;
use log::info;

pub const STANDBY: &str = "Standby...";
pub const RECORDING: &str = "Recording...";
pub const SERIAL_DISCONNECTED: &str = "Serial Disconnected";
pub const FREQUENCY_REJECTED: &str = "Error Select another freq. or timer";

/// Write-only status surface.
pub trait Feedback {
    fn show(&mut self, text: &str);
}

impl<F: Feedback + ?Sized> Feedback for &mut F {
    fn show(&mut self, text: &str) {
        (**self).show(text)
    }
}

/// Forwards every status text to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn show(&mut self, text: &str) {
        info!("[status] {}", text);
    }
}

/// "12.5 Hz"
pub fn frequency_text(frequency_hz: f32) -> String<48> {
    let mut text = String::new();
    let _ = write!(text, "{:.1} Hz", frequency_hz);
    text
}
