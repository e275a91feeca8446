//! Inertial sensor sampling and zero-offset calibration.

use core::fmt;

use crate::record::{FLAG_CALIBRATED, FLAG_RECORDING, LogRecord};
use crate::scheduler::{Behavior, InhibitMask, TaskContext, TaskId};
use crate::telemetry::DeviceEvent;
use crate::time::Millis;

pub const SENSOR_INTERVAL_MS: u32 = 100;
pub const CALIBRATION_SAMPLES: u16 = 100;
pub const STANDARD_GRAVITY: f32 = 9.81;
pub const RAD_TO_DEG: f32 = 57.2958;

/// Three-axis quantity.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Axes {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Axes {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn offset_by(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    fn accumulate(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

/// Raw IMU snapshot in SI units.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ImuSample {
    /// Acceleration in m/s².
    pub accel: Axes,
    /// Angular rate in rad/s.
    pub gyro: Axes,
}

/// Source of IMU snapshots.
pub trait SensorProvider {
    /// Reads the sensor now; `None` when the bus transaction failed.
    fn read(&mut self) -> Option<ImuSample>;
}

/// Zero offsets subtracted from raw readings.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct CalibrationOffsets {
    pub accel: Axes,
    pub gyro: Axes,
}

/// Persistent home for calibration offsets.
pub trait CalibrationStore {
    type Error: fmt::Debug;

    /// Returns stored offsets when a valid copy exists.
    fn load(&mut self) -> Option<CalibrationOffsets>;

    fn save(&mut self, offsets: &CalibrationOffsets) -> Result<(), Self::Error>;
}

/// Store that never retains anything.
#[derive(Copy, Clone, Debug, Default)]
pub struct VolatileCalibration;

impl CalibrationStore for VolatileCalibration {
    type Error = core::convert::Infallible;

    fn load(&mut self) -> Option<CalibrationOffsets> {
        None
    }

    fn save(&mut self, _offsets: &CalibrationOffsets) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Averages a fixed number of stationary samples into offsets.
#[derive(Clone, Debug)]
pub struct Calibrator {
    target: u16,
    taken: u16,
    accel: Axes,
    gyro: Axes,
}

impl Calibrator {
    #[must_use]
    pub const fn new(target: u16) -> Self {
        Self {
            target: if target == 0 { 1 } else { target },
            taken: 0,
            accel: Axes::ZERO,
            gyro: Axes::ZERO,
        }
    }

    pub const fn taken(&self) -> u16 {
        self.taken
    }

    /// Adds one sample; returns the offsets once the target count is reached.
    ///
    /// The accelerometer is assumed level, so gravity is removed from Z.
    pub fn accumulate(&mut self, sample: &ImuSample) -> Option<CalibrationOffsets> {
        self.accel.accumulate(sample.accel);
        self.gyro.accumulate(sample.gyro);
        self.taken = self.taken.saturating_add(1);

        if self.taken < self.target {
            return None;
        }

        let scale = 1.0 / f32::from(self.taken);
        let mut accel = self.accel.scaled(scale);
        accel.z -= STANDARD_GRAVITY;
        Some(CalibrationOffsets {
            accel,
            gyro: self.gyro.scaled(scale),
        })
    }
}

/// Sample converted to logging units: g and degrees per second.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct MotionReading {
    pub accel_g: Axes,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
    pub calibrated: bool,
}

impl MotionReading {
    #[must_use]
    pub fn from_sample(sample: &ImuSample, offsets: Option<&CalibrationOffsets>) -> Self {
        let (accel, gyro) = match offsets {
            Some(offsets) => (
                sample.accel.offset_by(offsets.accel),
                sample.gyro.offset_by(offsets.gyro),
            ),
            None => (sample.accel, sample.gyro),
        };
        let rates = gyro.scaled(RAD_TO_DEG);

        Self {
            accel_g: accel.scaled(1.0 / STANDARD_GRAVITY),
            yaw: rates.x,
            pitch: rates.y,
            roll: rates.z,
            calibrated: offsets.is_some(),
        }
    }

    /// Builds the log record stamped at `now`.
    #[must_use]
    pub fn into_record(self, now: Millis) -> LogRecord {
        let mut flags = FLAG_RECORDING;
        if self.calibrated {
            flags |= FLAG_CALIBRATED;
        }
        LogRecord {
            timestamp: now.as_u32(),
            accel_x: self.accel_g.x,
            accel_y: self.accel_g.y,
            accel_z: self.accel_g.z,
            yaw: self.yaw,
            pitch: self.pitch,
            roll: self.roll,
            flags,
            padding: 0,
        }
    }
}

/// Messages the sensor behavior posts to the rest of the device.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SensorReport {
    Sample(MotionReading),
    CalibrationFinished { saved: bool },
}

/// Behavior that polls the IMU and runs calibration on demand.
pub struct SensorTask<P, C> {
    id: TaskId,
    interval_ms: u32,
    provider: P,
    store: C,
    offsets: Option<CalibrationOffsets>,
    calibrator: Option<Calibrator>,
    calibration_samples: u16,
    suppress_while_calibrating: InhibitMask,
    latest: Option<MotionReading>,
    read_failures: u32,
}

impl<P: SensorProvider, C: CalibrationStore> SensorTask<P, C> {
    /// Builds the behavior, loading stored offsets or falling back to raw
    /// readings.
    pub fn new(id: TaskId, provider: P, mut store: C, interval_ms: u32) -> Self {
        let offsets = store.load();
        Self {
            id,
            interval_ms,
            provider,
            store,
            offsets,
            calibrator: None,
            calibration_samples: CALIBRATION_SAMPLES,
            suppress_while_calibrating: InhibitMask::EMPTY,
            latest: None,
            read_failures: 0,
        }
    }

    /// Behaviors to suppress while a calibration is in progress.
    #[must_use]
    pub fn suppressing(mut self, mask: InhibitMask) -> Self {
        self.suppress_while_calibrating = mask;
        self
    }

    #[must_use]
    pub fn with_calibration_samples(mut self, samples: u16) -> Self {
        self.calibration_samples = samples;
        self
    }

    /// Begins a calibration run. Returns `false` when one is already active.
    pub fn start_calibration(&mut self) -> bool {
        if self.calibrator.is_some() {
            return false;
        }
        self.calibrator = Some(Calibrator::new(self.calibration_samples));
        self.latest = None;
        true
    }

    pub const fn is_calibrating(&self) -> bool {
        self.calibrator.is_some()
    }

    pub const fn is_calibrated(&self) -> bool {
        self.offsets.is_some()
    }

    pub const fn offsets(&self) -> Option<CalibrationOffsets> {
        self.offsets
    }

    pub const fn latest(&self) -> Option<MotionReading> {
        self.latest
    }

    pub const fn read_failures(&self) -> u32 {
        self.read_failures
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn store_mut(&mut self) -> &mut C {
        &mut self.store
    }

    fn finish_calibration(&mut self, offsets: CalibrationOffsets) -> bool {
        self.calibrator = None;
        self.offsets = Some(offsets);
        self.store.save(&offsets).is_ok()
    }
}

impl<P, C, M> Behavior<M> for SensorTask<P, C>
where
    P: SensorProvider,
    C: CalibrationStore,
    M: From<SensorReport>,
{
    fn id(&self) -> TaskId {
        self.id
    }

    fn name(&self) -> &'static str {
        "sensor"
    }

    fn run_interval_ms(&self) -> u32 {
        self.interval_ms
    }

    fn run(&mut self, ctx: &mut TaskContext<'_, M>) {
        let Some(sample) = self.provider.read() else {
            self.read_failures = self.read_failures.saturating_add(1);
            ctx.record(DeviceEvent::SensorReadFailed);
            return;
        };

        if let Some(calibrator) = self.calibrator.as_mut() {
            if let Some(offsets) = calibrator.accumulate(&sample) {
                let saved = self.finish_calibration(offsets);
                if !saved {
                    ctx.record(DeviceEvent::CalibrationSaveFailed);
                }
                ctx.record(DeviceEvent::CalibrationComplete);
                ctx.post(M::from(SensorReport::CalibrationFinished { saved }));
            }
            return;
        }

        let reading = MotionReading::from_sample(&sample, self.offsets.as_ref());
        self.latest = Some(reading);
        ctx.post(M::from(SensorReport::Sample(reading)));
    }

    fn inhibit_mask(&self) -> InhibitMask {
        if self.is_calibrating() {
            self.suppress_while_calibrating
        } else {
            InhibitMask::EMPTY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(rate: f32) -> ImuSample {
        ImuSample {
            accel: Axes::new(0.2, -0.1, 9.91),
            gyro: Axes::new(rate, 0.0, -rate),
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn calibrator_averages_and_removes_gravity() {
        let mut calibrator = Calibrator::new(4);
        for _ in 0..3 {
            assert!(calibrator.accumulate(&level(0.01)).is_none());
        }
        let offsets = calibrator.accumulate(&level(0.01)).expect("fourth sample completes");

        assert!(close(offsets.accel.x, 0.2));
        assert!(close(offsets.accel.z, 0.1));
        assert!(close(offsets.gyro.x, 0.01));
        assert!(close(offsets.gyro.z, -0.01));
    }

    #[test]
    fn readings_convert_to_g_and_degrees() {
        let sample = ImuSample {
            accel: Axes::new(0.0, 0.0, STANDARD_GRAVITY),
            gyro: Axes::new(1.0, 0.0, 0.0),
        };
        let raw = MotionReading::from_sample(&sample, None);
        assert!(close(raw.accel_g.z, 1.0));
        assert!(close(raw.yaw, RAD_TO_DEG));
        assert!(!raw.calibrated);

        let offsets = CalibrationOffsets {
            accel: Axes::new(0.0, 0.0, 0.0),
            gyro: Axes::new(1.0, 0.0, 0.0),
        };
        let corrected = MotionReading::from_sample(&sample, Some(&offsets));
        assert!(close(corrected.yaw, 0.0));

        let record = corrected.into_record(Millis::new(77));
        assert_eq!(record.timestamp, 77);
        assert_eq!(record.flags, FLAG_RECORDING | FLAG_CALIBRATED);
    }

    #[test]
    fn zero_sample_target_still_completes() {
        let mut calibrator = Calibrator::new(0);
        assert!(calibrator.accumulate(&level(0.0)).is_some());
    }
}
