#![no_std]

// Shared logic for the two-stroke CDI controller.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and exposing the peripheral abstraction the firmware
// and the emulator implement.

pub mod calibration;
pub mod engine;
pub mod hardware;
pub mod map;
pub mod protection;
#[cfg(feature = "sim")]
pub mod sim;
pub mod telemetry;
pub mod units;

pub use engine::{Controller, EngineState};
pub use hardware::{Event, GateLevel, IgnitionHardware};
