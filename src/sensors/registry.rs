use heapless::Vec;
use log::{info, warn};

use super::{Sensor, SensorExt};
use crate::config::{MAX_PARAMETERS, MAX_SENSORS};

/// Ordered, fixed-capacity set of the sensors attached to the recorder.
///
/// Sampling and descriptor output follow registration order.
pub struct SensorRegistry<'a> {
    sensors: Vec<&'a mut dyn Sensor, MAX_SENSORS>,
}

impl Default for SensorRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> SensorRegistry<'a> {
    pub const fn new() -> Self {
        Self {
            sensors: Vec::new(),
        }
    }

    /// Add a sensor. Hands it back when the registry is full or the sensor
    /// declares more than [`MAX_PARAMETERS`] parameters.
    pub fn register(&mut self, sensor: &'a mut dyn Sensor) -> Result<(), &'a mut dyn Sensor> {
        let parameters = sensor.info().parameter_short_names.len();
        if parameters > MAX_PARAMETERS {
            warn!(
                "{} declares {} parameters, at most {} allowed",
                sensor.short_name(),
                parameters,
                MAX_PARAMETERS
            );
            return Err(sensor);
        }
        if self.find(sensor.short_name()).is_some() {
            warn!("Duplicate sensor short name {}", sensor.short_name());
        }
        self.sensors.push(sensor)
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn find(&self, short_name: &str) -> Option<&dyn Sensor> {
        self.sensors
            .iter()
            .find(|s| s.short_name() == short_name)
            .map(|s| &**s)
    }

    pub fn find_mut(&mut self, short_name: &str) -> Option<&mut (dyn Sensor + 'a)> {
        self.sensors
            .iter_mut()
            .find(|s| s.short_name() == short_name)
            .map(|s| &mut **s)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Sensor> {
        self.sensors.iter().map(|s| &**s)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn Sensor + 'a)> {
        self.sensors.iter_mut().map(|s| &mut **s)
    }

    /// Reconfigure every sensor, active or not, ahead of a recording session.
    ///
    /// Error counters survive; a failing sensor is still reset by the first
    /// cycle that finds it.
    pub fn init_all(&mut self) {
        for sensor in self.iter_mut() {
            info!("Initializing {}", sensor.short_name());
            sensor.init();
        }
    }

    pub fn stop_all(&mut self) {
        for sensor in self.iter_mut() {
            sensor.stop();
        }
    }
}
