//! Hardware-independent core library for tempsense
//!
//! This crate contains all platform-agnostic logic of the one-wire
//! temperature logger: settings parsing, the boot-time debug gate, the
//! sense-and-report cycle, the DS18B20 driver over a bit-banged one-wire bus,
//! status LED patterns, time handling and the reporting sinks.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod boot;
pub mod config;
pub mod reading;
pub mod report;
pub mod sensing;
pub mod sensors;
pub mod status;
pub mod time;
