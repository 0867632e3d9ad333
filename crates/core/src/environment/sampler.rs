use std::sync::Arc;

use battsync_link::BatteryLevel;

use super::battery::{BatterySensor, SensorError};

/// Turns raw sensor readings into validated battery levels.
#[derive(Clone)]
pub struct LocalSampler {
    sensor: Arc<dyn BatterySensor>,
}

impl LocalSampler {
    pub fn new(sensor: Arc<dyn BatterySensor>) -> Self {
        Self { sensor }
    }

    pub fn sensor_name(&self) -> &str {
        self.sensor.name()
    }

    /// Query the platform once. Readings above 100 are rejected, not clamped.
    pub fn current_level(&self) -> Result<BatteryLevel, SensorError> {
        let pct = self.sensor.read_percent()?;
        u8::try_from(pct)
            .ok()
            .and_then(BatteryLevel::new)
            .ok_or(SensorError::OutOfRange(pct))
    }
}

impl std::fmt::Debug for LocalSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSampler")
            .field("sensor", &self.sensor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::battery::MockSensor;

    #[test]
    fn valid_reading_becomes_level() {
        let sampler = LocalSampler::new(Arc::new(MockSensor::with_percent(37)));
        assert_eq!(sampler.current_level().unwrap().percent(), Some(37));
    }

    #[test]
    fn out_of_range_reading_is_rejected() {
        let sampler = LocalSampler::new(Arc::new(MockSensor::with_percent(140)));
        assert_eq!(sampler.current_level(), Err(SensorError::OutOfRange(140)));
        let sampler = LocalSampler::new(Arc::new(MockSensor::with_percent(1000)));
        assert_eq!(sampler.current_level(), Err(SensorError::OutOfRange(1000)));
    }

    #[test]
    fn sensor_failure_propagates() {
        let sampler = LocalSampler::new(Arc::new(MockSensor::new()));
        assert!(matches!(sampler.current_level(), Err(SensorError::Unavailable(_))));
        assert_eq!(sampler.sensor_name(), "mock");
    }
}
