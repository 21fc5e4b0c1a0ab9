//! Desktop simulator for the pico-recorder firmware.
//!
//! Runs the real recorder loop against simulated I2C sensors. A thread stands
//! in for the hardware timer interrupt, stdin/stdout stand in for the serial
//! link, and the device name lives in a small file.
//!
//! ```text
//! $ pico-recorder-sim [config.json]
//! {"CTRL": {"freq": 100, "run": true}}
//! ```
//!
//! Records go to stdout, logs go to stderr (`RUST_LOG=debug` for detail).
//! The simulator exits once stdin is closed.

mod devices;

use std::cell::RefCell;
use std::fs;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embedded_hal_bus::i2c::RefCellDevice;
use log::{error, info, warn};

use pico_recorder::sensors::{GasKind, GasSensor, MotionSensor, OisSensor, PressureSensor};
use pico_recorder::{
    AdaptiveScheduler, Clock, EmbassyClock, Feedback, Link, LinkError, LogFeedback, NameBackend,
    Recorder, RecorderConfig, SensorRegistry, StoreError, TickCounter, TickSource,
};

use devices::SimBus;

/// Fastest rate the simulated timer accepts, like a hardware prescaler limit.
const MAX_TICK_HZ: f32 = 5_000.0;

const NAME_FILE: &str = "pico-recorder-name.bin";

static TICKS: TickCounter = TickCounter::new();

/// Timer thread ticking [`TICKS`] at the configured rate.
struct ThreadTickSource {
    /// Current rate as `f32` bits; 0 pauses the timer
    frequency_bits: Arc<AtomicU32>,
}

impl ThreadTickSource {
    fn spawn() -> Self {
        let frequency_bits = Arc::new(AtomicU32::new(0));
        let shared = frequency_bits.clone();
        thread::spawn(move || {
            loop {
                let hz = f32::from_bits(shared.load(Ordering::Relaxed));
                if hz > 0.0 {
                    thread::sleep(Duration::from_secs_f32(1.0 / hz));
                    TICKS.tick();
                } else {
                    thread::sleep(Duration::from_millis(10));
                }
            }
        });
        Self { frequency_bits }
    }
}

impl TickSource for ThreadTickSource {
    fn configure(&mut self, frequency_hz: f32) -> bool {
        if !(frequency_hz > 0.0 && frequency_hz <= MAX_TICK_HZ) {
            return false;
        }
        self.frequency_bits
            .store(frequency_hz.to_bits(), Ordering::Relaxed);
        true
    }
}

/// Stdin lines in through a reader thread, records out on stdout.
struct StdioLink {
    lines: Receiver<String>,
    closed: bool,
}

impl StdioLink {
    fn new(lines: Receiver<String>) -> Self {
        Self {
            lines,
            closed: false,
        }
    }

    fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Self::new(rx)
    }
}

impl Link for StdioLink {
    fn is_connected(&mut self) -> bool {
        !self.closed
    }

    fn poll_line(&mut self) -> Result<Option<String>, LinkError> {
        match self.lines.try_recv() {
            Ok(line) => Ok(Some(line)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    fn send_line(&mut self, line: &str) -> Result<(), LinkError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{line}").map_err(|_| LinkError::Write)?;
        stdout.flush().map_err(|_| LinkError::Write)
    }
}

/// Device name kept in a file next to the working directory.
struct FileBackend {
    path: PathBuf,
}

impl NameBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(_) => return Err(StoreError::Backend),
        };
        let slot = buf.get_mut(..bytes.len()).ok_or(StoreError::Decode)?;
        slot.copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        fs::write(&self.path, bytes).map_err(|_| StoreError::Backend)
    }
}

fn load_config() -> RecorderConfig {
    let Some(path) = std::env::args().nth(1) else {
        return RecorderConfig::default();
    };
    match fs::read_to_string(&path).map(|text| serde_json::from_str(&text)) {
        Ok(Ok(config)) => {
            info!("Loaded config from {}", path);
            config
        }
        Ok(Err(e)) => {
            error!("Invalid config {}: {}", path, e);
            RecorderConfig::default()
        }
        Err(e) => {
            error!("Cannot read config {}: {}", path, e);
            RecorderConfig::default()
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = load_config();
    info!("Simulating with {:?}", config);

    let bus = RefCell::new(SimBus::new());
    let mut motion = MotionSensor::new(RefCellDevice::new(&bus));
    let mut ois = OisSensor::new(RefCellDevice::new(&bus), EmbassyClock);
    let mut pressure = PressureSensor::new(RefCellDevice::new(&bus));
    let mut ammonia = GasSensor::new(RefCellDevice::new(&bus), GasKind::Ammonia);

    let mut registry = SensorRegistry::new();
    for sensor in [
        &mut motion as &mut dyn pico_recorder::Sensor,
        &mut ois,
        &mut pressure,
        &mut ammonia,
    ] {
        if registry.register(sensor).is_err() {
            warn!("Sensor registry full");
        }
    }

    let scheduler = AdaptiveScheduler::new(&TICKS, ThreadTickSource::spawn(), config);
    let mut recorder = Recorder::new(
        scheduler,
        registry,
        EmbassyClock,
        StdioLink::spawn(),
        LogFeedback,
        FileBackend {
            path: PathBuf::from(NAME_FILE),
        },
    );
    recorder.startup();
    run(&mut recorder);
}

/// Poll the recorder until stdin closes.
fn run<T, C, F, B>(recorder: &mut Recorder<'_, T, C, StdioLink, F, B>)
where
    T: TickSource,
    C: Clock,
    F: Feedback,
    B: NameBackend,
{
    loop {
        if recorder.poll().is_none() {
            if recorder.link_mut().closed {
                info!("stdin closed, stopping");
                break;
            }
            thread::sleep(Duration::from_micros(100));
        }
    }
    recorder.stop_recording();
}
