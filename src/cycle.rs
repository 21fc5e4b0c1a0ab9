//! One pass of work over the sensor registry
//!
//! While recording, a cycle triggers every active sensor (resetting the stale
//! ones first), then samples and decodes them in a second sweep so settling
//! delays overlap. While idle, a cycle probes every sensor and emits
//! descriptors for discovery instead.

use log::debug;

use crate::clock::Clock;
use crate::record::Record;
use crate::sensors::{SensorExt, SensorRegistry};

/// Field holding the time since recording started, at the start of the cycle
pub const ELAPSED_KEY: &str = "elapsed_us";
/// Field holding the time spent in the trigger and sample sweeps
pub const SAMPLE_DURATION_KEY: &str = "sample_duration_us";
/// Marker present only in idle records
pub const IDLE_KEY: &str = "idle";
/// Device name field of idle records
pub const NAME_KEY: &str = "name";

/// Reset stale sensors, then kick off their conversions.
pub fn trigger_pass(registry: &mut SensorRegistry<'_>) {
    for sensor in registry.iter_mut() {
        if !sensor.state().is_active() {
            continue;
        }
        if sensor.state().needs_reset() {
            debug!(
                "Resetting {} after {} errors",
                sensor.short_name(),
                sensor.state().error_count
            );
            sensor.reset();
        }
        sensor.trigger();
    }
}

/// Sample every active sensor and attach its readings under its short name.
pub fn sample_pass(registry: &mut SensorRegistry<'_>, out: &mut Record) {
    for sensor in registry.iter_mut() {
        if !sensor.state().is_active() {
            continue;
        }
        sensor.sample();
        out.insert(sensor.short_name(), sensor.report());
    }
}

/// Run one recording cycle and assemble its record.
pub fn record_cycle<C: Clock>(
    registry: &mut SensorRegistry<'_>,
    clock: &C,
    recording_started_us: u64,
) -> Record {
    let started_us = clock.now_us();
    let mut out = Record::new();
    out.insert(ELAPSED_KEY, started_us.saturating_sub(recording_started_us));
    // placeholder keeps the field ahead of the sensor readings
    out.insert(SAMPLE_DURATION_KEY, 0u64);

    trigger_pass(registry);
    sample_pass(registry, &mut out);

    out.insert(
        SAMPLE_DURATION_KEY,
        clock.now_us().saturating_sub(started_us),
    );
    out
}

/// Probe all sensors, active or not, and describe them.
pub fn idle_cycle(registry: &mut SensorRegistry<'_>, device_name: &str) -> Record {
    let mut out = Record::new();
    out.insert(IDLE_KEY, true);
    out.insert(NAME_KEY, device_name);
    for sensor in registry.iter_mut() {
        sensor.test_connection();
        out.insert(sensor.short_name(), sensor.describe());
    }
    out
}
