//! End-to-end runs of the recorder loop against host fakes.

mod common;

use common::{
    LimitedTickSource, ManualClock, QueueLink, Shown, StubSensor, TestRecorder, sent_records,
};
use pico_recorder::feedback::FREQUENCY_REJECTED;
use pico_recorder::{
    AdaptiveScheduler, Clock, MemoryBackend, Recorder, RecorderConfig, SensorRegistry,
    TickCounter,
};

fn recorder<'a>(
    ticks: &'a TickCounter,
    clock: &ManualClock,
    source: LimitedTickSource,
    registry: SensorRegistry<'a>,
) -> TestRecorder<'a> {
    let scheduler = AdaptiveScheduler::new(ticks, source, RecorderConfig::default());
    let mut recorder = Recorder::new(
        scheduler,
        registry,
        clock.clone(),
        QueueLink::default(),
        Shown::default(),
        MemoryBackend::default(),
    );
    recorder.startup();
    recorder
}

/// Poll until `passes` passes ran, firing ticks as the clock advances at the
/// rate the timer really runs at. Idle polls cost one millisecond.
fn drive(recorder: &mut TestRecorder<'_>, ticks: &TickCounter, clock: &ManualClock, passes: u32) {
    let mut pending = 0.0f64;
    let mut last_us = clock.now_us();
    let mut done = 0;
    while done < passes {
        if recorder.poll().is_some() {
            done += 1;
        } else {
            clock.advance_us(1_000);
        }
        let now_us = clock.now_us();
        let hz = f64::from(recorder.scheduler().tick_source().running_hz);
        pending += (now_us - last_us) as f64 * hz / 1e6;
        last_us = now_us;
        while pending >= 1.0 {
            ticks.tick();
            pending -= 1.0;
        }
    }
}

#[test]
fn frequency_then_run_converges_without_idle_marker() {
    let ticks = TickCounter::new();
    let clock = ManualClock::default();
    let mut sensor = StubSensor::new("S", clock.clone());
    sensor.control.sample_cost_us.set(200);
    let mut registry = SensorRegistry::new();
    assert!(registry.register(&mut sensor).is_ok());
    let mut rec = recorder(&ticks, &clock, LimitedTickSource::new(1_000.0), registry);

    rec.link_mut().inbound.push_back(r#"{"CTRL":{"freq":100}}"#.into());
    rec.link_mut().inbound.push_back(r#"{"CTRL":{"run":true}}"#.into());
    drive(&mut rec, &ticks, &clock, 300);

    assert_eq!(rec.scheduler().current_frequency(), 100.0);
    let records = sent_records(&mut rec);
    let recording: Vec<_> = records
        .iter()
        .skip_while(|r| r.get("idle").is_some())
        .collect();
    assert!(recording.len() >= 299);
    for record in recording {
        assert!(record.get("idle").is_none());
        assert!(record["elapsed_us"].is_u64());
        assert_eq!(record["S"]["LVL"], 513);
    }
}

#[test]
fn chronic_backlog_halves_the_rate() {
    let ticks = TickCounter::new();
    let clock = ManualClock::default();
    let mut sensor = StubSensor::new("SLOW", clock.clone());
    // 20 ms per sample: only 50 Hz is sustainable
    sensor.control.sample_cost_us.set(20_000);
    let mut registry = SensorRegistry::new();
    assert!(registry.register(&mut sensor).is_ok());
    let mut rec = recorder(&ticks, &clock, LimitedTickSource::new(1_000.0), registry);

    rec.handle_line(r#"{"CTRL":{"freq":100,"run":true}}"#);
    drive(&mut rec, &ticks, &clock, 400);

    assert_eq!(rec.scheduler().current_frequency(), 50.0);
    assert!(rec.feedback().0.iter().any(|s| s == "50.0 Hz"));
}

#[test]
fn slack_doubles_back_to_target_after_a_slow_spell() {
    let ticks = TickCounter::new();
    let clock = ManualClock::default();
    let mut sensor = StubSensor::new("VAR", clock.clone());
    let control = sensor.control.clone();
    control.sample_cost_us.set(20_000);
    let mut registry = SensorRegistry::new();
    assert!(registry.register(&mut sensor).is_ok());
    let mut rec = recorder(&ticks, &clock, LimitedTickSource::new(1_000.0), registry);

    rec.handle_line(r#"{"CTRL":{"run":true}}"#);
    assert_eq!(rec.scheduler().current_frequency(), 256.0);
    drive(&mut rec, &ticks, &clock, 600);
    // 20 ms per sample sustains 32 Hz but not 64 Hz
    assert_eq!(rec.scheduler().current_frequency(), 32.0);

    control.sample_cost_us.set(100);
    drive(&mut rec, &ticks, &clock, 400);
    let hz = rec.scheduler().current_frequency();
    assert_eq!(hz, 256.0);
    assert_eq!(hz, rec.scheduler().target_frequency());
}

#[test]
fn refused_halving_steps_down_again_next_window() {
    let ticks = TickCounter::new();
    let clock = ManualClock::default();
    let mut sensor = StubSensor::new("SLOW", clock.clone());
    sensor.control.sample_cost_us.set(20_000);
    let mut registry = SensorRegistry::new();
    assert!(registry.register(&mut sensor).is_ok());
    let mut source = LimitedTickSource::new(1_000.0);
    source.refused.push(50.0);
    let configured = source.configured.clone();
    let mut rec = recorder(&ticks, &clock, source, registry);

    rec.handle_line(r#"{"CTRL":{"freq":100,"run":true}}"#);
    drive(&mut rec, &ticks, &clock, 400);

    assert_eq!(rec.scheduler().current_frequency(), 25.0);
    assert_eq!(rec.scheduler().tick_source().running_hz, 25.0);
    assert_eq!(*configured.borrow(), [2.0, 100.0, 50.0, 25.0]);
    let shown = &rec.feedback().0;
    assert!(shown.iter().any(|s| s == FREQUENCY_REJECTED));
    assert!(shown.iter().any(|s| s == "25.0 Hz"));
}

#[test]
fn failing_sensor_is_reset_every_cycle_until_it_recovers() {
    let ticks = TickCounter::new();
    let clock = ManualClock::default();
    let mut sensor = StubSensor::new("BAD", clock.clone());
    let control = sensor.control.clone();
    control.failing.set(true);
    let mut registry = SensorRegistry::new();
    assert!(registry.register(&mut sensor).is_ok());
    let mut rec = recorder(&ticks, &clock, LimitedTickSource::new(1_000.0), registry);

    rec.handle_line(r#"{"CTRL":{"run":true}}"#);
    // starting a recording only reinitializes
    assert_eq!(control.resets.get(), 0);
    sent_records(&mut rec);

    drive(&mut rec, &ticks, &clock, 5);
    assert_eq!(control.samples.get(), 5);
    // the first cycle finds a clean sensor, every later one a failed sample
    assert_eq!(control.resets.get(), 4);
    for record in sent_records(&mut rec) {
        assert_eq!(record["BAD"]["#ST"], -3);
    }

    control.failing.set(false);
    drive(&mut rec, &ticks, &clock, 2);
    assert_eq!(control.resets.get(), 5);
    let state = rec.registry().find("BAD").unwrap().state();
    assert_eq!(state.error_count, 0);

    let records = sent_records(&mut rec);
    assert_eq!(records[0]["BAD"]["#ST"], 0);
    assert!(records[1]["BAD"].get("#ST").is_none());
}

#[test]
fn idle_descriptors_around_a_recording() {
    let ticks = TickCounter::new();
    let clock = ManualClock::default();
    let mut sensor = StubSensor::new("S", clock.clone());
    let mut registry = SensorRegistry::new();
    assert!(registry.register(&mut sensor).is_ok());
    let mut rec = recorder(&ticks, &clock, LimitedTickSource::new(1_000.0), registry);

    rec.handle_line(r#"{"CTRL":{"name":"rig-7"},"S":{"record":false}}"#);
    drive(&mut rec, &ticks, &clock, 1);
    let idle = sent_records(&mut rec).remove(0);
    assert_eq!(idle["idle"], true);
    assert_eq!(idle["name"], "rig-7");
    assert_eq!(idle["S"]["record"], false);
    assert_eq!(idle["S"]["parameter_short_names"][0], "LVL");

    rec.handle_line(r#"{"CTRL":{"run":true}}"#);
    drive(&mut rec, &ticks, &clock, 3);
    for record in sent_records(&mut rec) {
        assert!(record.get("idle").is_none());
        // excluded from recording
        assert!(record.get("S").is_none());
    }

    rec.handle_line(r#"{"CTRL":{"run":false}}"#);
    drive(&mut rec, &ticks, &clock, 1);
    assert_eq!(sent_records(&mut rec)[0]["idle"], true);
    assert_eq!(rec.scheduler().current_frequency(), 2.0);
}
