#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Shared logic for the motion logger.
//
// Everything here stays portable across the MCU firmware and host tooling:
// no standard library, bounded containers only, and hardware reached through
// the small traits each module defines.

pub mod button;
pub mod calibration;
pub mod config;
pub mod console;
pub mod device;
pub mod flashfs;
pub mod logger;
pub mod record;
pub mod scheduler;
pub mod sensor;
pub mod telemetry;
pub mod time;
pub mod tone;
