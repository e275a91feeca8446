//! MPU-6050 over blocking I2C.

use embassy_stm32::i2c::{I2c, Master};
use embassy_stm32::mode::Blocking;
use logger_core::sensor::{Axes, ImuSample, STANDARD_GRAVITY, SensorProvider};

pub const MPU6050_ADDR: u8 = 0x68;

const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_PWR_MGMT_1: u8 = 0x6B;

/// Digital low-pass filter at 21 Hz.
const DLPF_21HZ: u8 = 0x04;
/// ±500 °/s full scale.
const GYRO_500DPS: u8 = 0x08;
/// ±8 g full scale.
const ACCEL_8G: u8 = 0x10;

const ACCEL_LSB_PER_G: f32 = 4096.0;
const GYRO_LSB_PER_DPS: f32 = 65.5;
const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;

pub struct Mpu6050<'d> {
    i2c: I2c<'d, Blocking, Master>,
}

impl<'d> Mpu6050<'d> {
    /// Wakes the sensor and programs ranges and filter.
    pub fn new(mut i2c: I2c<'d, Blocking, Master>) -> Result<Self, embassy_stm32::i2c::Error> {
        for (register, value) in [
            (REG_PWR_MGMT_1, 0x00),
            (REG_CONFIG, DLPF_21HZ),
            (REG_GYRO_CONFIG, GYRO_500DPS),
            (REG_ACCEL_CONFIG, ACCEL_8G),
        ] {
            i2c.blocking_write(MPU6050_ADDR, &[register, value])?;
        }
        Ok(Self { i2c })
    }
}

fn axis(bytes: &[u8], index: usize) -> f32 {
    f32::from(i16::from_be_bytes([bytes[index * 2], bytes[index * 2 + 1]]))
}

impl SensorProvider for Mpu6050<'_> {
    fn read(&mut self) -> Option<ImuSample> {
        // accel xyz, temperature, gyro xyz
        let mut raw = [0u8; 14];
        self.i2c
            .blocking_write_read(MPU6050_ADDR, &[REG_ACCEL_XOUT_H], &mut raw)
            .ok()?;

        let accel = Axes::new(axis(&raw, 0), axis(&raw, 1), axis(&raw, 2))
            .scaled(STANDARD_GRAVITY / ACCEL_LSB_PER_G);
        let gyro = Axes::new(axis(&raw, 4), axis(&raw, 5), axis(&raw, 6))
            .scaled(DEG_TO_RAD / GYRO_LSB_PER_DPS);
        Some(ImuSample { accel, gyro })
    }
}
