use serde::{Deserialize, Serialize};

/// Maximum number of sensors a registry can hold
pub const MAX_SENSORS: usize = 8;

/// Maximum number of decoded parameters per sensor
pub const MAX_PARAMETERS: usize = 16;

/// Maximum length of one inbound line on the serial link, in bytes
pub const LINE_CAPACITY: usize = 1024;

/// Maximum length of the persisted device name, in bytes
pub const NAME_CAPACITY: usize = 32;

/// Top-level key of inbound commands addressed to the recorder itself
pub const CONTROL_TARGET: &str = "CTRL";

/// Tunables of the adaptive scheduler and sensor staleness checks.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RecorderConfig {
    /// Requested sampling rate while recording (upper bound for adaptation)
    pub target_frequency_hz: f32,
    /// The scheduler never slows below this rate
    pub min_frequency_hz: f32,
    /// Rate used while not recording
    pub idle_frequency_hz: f32,
    /// Wall-clock window over which backlog and slack are judged above 10 Hz
    pub seconds_before_adjust: f32,
    /// Floor of the hysteresis budget, and the flat budget at or below 10 Hz
    pub min_loops_before_adjust: u32,
    /// Added to the pass duration before estimating the achievable rate
    pub speedup_epsilon_us: u64,
    /// Consecutive all-zero reads tolerated before a sensor is reset (0 disables)
    pub zero_run_threshold: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            target_frequency_hz: 256.0,
            min_frequency_hz: 1.0,
            idle_frequency_hz: 2.0,
            seconds_before_adjust: 1.0,
            min_loops_before_adjust: 10,
            speedup_epsilon_us: 10,
            zero_run_threshold: 0xFD,
        }
    }
}
