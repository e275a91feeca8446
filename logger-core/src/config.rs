//! Device-wide tuning knobs.

use crate::button::ButtonTiming;
use crate::logger::LoggerConfig;
use crate::sensor::{CALIBRATION_SAMPLES, SENSOR_INTERVAL_MS};
use crate::tone::TONE_INTERVAL_MS;

/// Timing configuration handed to [`Device::new`](crate::device::Device::new).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceConfig {
    pub button: ButtonTiming,
    pub logger: LoggerConfig,
    pub sensor_interval_ms: u32,
    pub calibration_samples: u16,
    pub tone_interval_ms: u32,
}

impl DeviceConfig {
    pub const DEFAULT: Self = Self {
        button: ButtonTiming::DEFAULT,
        logger: LoggerConfig::DEFAULT,
        sensor_interval_ms: SENSOR_INTERVAL_MS,
        calibration_samples: CALIBRATION_SAMPLES,
        tone_interval_ms: TONE_INTERVAL_MS,
    };

    /// Overrides the sensor polling period.
    #[must_use]
    pub const fn with_sensor_interval(mut self, interval_ms: u32) -> Self {
        self.sensor_interval_ms = interval_ms;
        self
    }

    #[must_use]
    pub const fn with_calibration_samples(mut self, samples: u16) -> Self {
        self.calibration_samples = samples;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
