use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use logger_core::logger::file_name;
use logger_core::record::{RECORD_SIZE, decode_all};
use logger_core::sensor::{
    Axes, CalibrationOffsets, ImuSample, MotionReading, SENSOR_INTERVAL_MS, STANDARD_GRAVITY,
};
use logger_core::time::Millis;

/// Samples per generated file, a little over a minute at the default rate.
const SAMPLES: u32 = 640;

#[derive(Clone, Copy)]
enum Dataset {
    Static,
    Sine,
    Calibrated,
}

impl Dataset {
    const ALL: [Dataset; 3] = [Dataset::Static, Dataset::Sine, Dataset::Calibrated];

    fn label(self) -> &'static str {
        match self {
            Dataset::Static => "static",
            Dataset::Sine => "sine",
            Dataset::Calibrated => "calibrated",
        }
    }

    fn sample(self, index: u32) -> ImuSample {
        match self {
            Dataset::Static => ImuSample {
                accel: Axes::new(0.0, 0.0, STANDARD_GRAVITY),
                gyro: Axes::ZERO,
            },
            Dataset::Sine | Dataset::Calibrated => {
                let phase = f64::from(index) * std::f64::consts::TAU / 50.0;
                #[allow(clippy::cast_possible_truncation)]
                let (sin, cos) = (phase.sin() as f32, phase.cos() as f32);
                ImuSample {
                    accel: Axes::new(2.0 * sin, 1.0 * cos, STANDARD_GRAVITY + 0.5 * sin),
                    gyro: Axes::new(0.5 * cos, 0.25 * sin, 0.1),
                }
            }
        }
    }

    fn offsets(self) -> Option<CalibrationOffsets> {
        match self {
            Dataset::Calibrated => Some(CalibrationOffsets {
                accel: Axes::new(0.05, -0.02, 0.01),
                gyro: Axes::new(0.01, 0.01, 0.1),
            }),
            Dataset::Static | Dataset::Sine => None,
        }
    }
}

fn main() -> io::Result<()> {
    let out_dir = env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("test-logs"), PathBuf::from);
    fs::create_dir_all(&out_dir)?;

    for (number, dataset) in (1..).zip(Dataset::ALL) {
        let path = write_dataset(&out_dir, number, dataset)?;
        let records = decode_all(&fs::read(&path)?);
        println!(
            "{:<10} {} ({} records)",
            dataset.label(),
            path.display(),
            records.len()
        );
    }
    Ok(())
}

fn write_dataset(out_dir: &Path, number: u32, dataset: Dataset) -> io::Result<PathBuf> {
    let offsets = dataset.offsets();
    let mut bytes = Vec::with_capacity(SAMPLES as usize * RECORD_SIZE);
    for index in 0..SAMPLES {
        let now = Millis::new((index + 1) * SENSOR_INTERVAL_MS);
        let record =
            MotionReading::from_sample(&dataset.sample(index), offsets.as_ref()).into_record(now);
        bytes.extend_from_slice(&record.encode());
    }

    let name = file_name(number);
    let path = out_dir.join(name.trim_start_matches('/'));
    fs::write(&path, bytes)?;
    Ok(path)
}
