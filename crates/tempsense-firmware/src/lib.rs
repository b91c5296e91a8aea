//! ESP32-S3 firmware-specific modules for tempsense
//!
//! This crate contains the code that cannot compile on desktop targets:
//! GPIO setup for the one-wire buses and power pins, Wi-Fi association,
//! SNTP over embassy-net and the HTTP reporting sink.

#![no_std]

extern crate alloc;

pub mod clock;
pub mod hardware;
pub mod http_sink;
pub mod net;
pub mod ntp;
pub mod wifi;
