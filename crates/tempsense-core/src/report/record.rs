//! On-card record format.
//!
//! Readings are stored as postcard frames, COBS-encoded so every frame ends
//! in a single `0x00`. A torn write only costs the frame it interrupted: the
//! decoder resynchronises at the next zero byte.

extern crate alloc;
use alloc::vec::Vec;

use log::warn;

use super::ReportError;
use crate::reading::Reading;

/// Encode one reading as a zero-terminated frame.
pub fn encode(reading: &Reading) -> Result<Vec<u8>, ReportError> {
    postcard::to_allocvec_cobs(reading).map_err(|_| ReportError::Encode)
}

/// Decode every intact frame in `bytes`, which is clobbered in the process.
///
/// Returns the readings and the number of frames that had to be skipped.
pub fn decode_all(bytes: &mut [u8]) -> (Vec<Reading>, usize) {
    let mut readings = Vec::new();
    let mut skipped = 0;

    for frame in bytes.split_mut(|b| *b == 0).filter(|f| !f.is_empty()) {
        match postcard::from_bytes_cobs::<Reading>(frame) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                warn!("Skipping damaged record frame: {:?}", e);
                skipped += 1;
            }
        }
    }

    (readings, skipped)
}
