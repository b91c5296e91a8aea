//! Jekyll post rendering for published readings.
//!
//! Each reading becomes one post under `_posts/<sensor>/`, named after the
//! local measurement time so a static site can list them chronologically.

extern crate alloc;
use alloc::format;
use alloc::string::String;

use crate::reading::Reading;

/// A rendered post and the repository path it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDocument {
    pub path: String,
    pub body: String,
}

impl PostDocument {
    pub fn new(reading: &Reading, utc_offset_hours: i8) -> Self {
        let local = reading.timestamp.to_local(utc_offset_hours);
        let id = path_safe(&reading.sensor);

        let path = format!("_posts/{id}/{local}_{id}.html");
        let body = format!(
            "---\n\
             sensor_id: {sensor}\n\
             temperature: {value:.2}\n\
             unit: {unit}\n\
             measurement_time: {local}\n\
             ---\n\
             {{}}\n",
            sensor = reading.sensor,
            value = reading.value,
            unit = reading.unit,
        );

        Self { path, body }
    }
}

/// Keep ASCII alphanumerics, `-` and `_`; anything else becomes `_`.
fn path_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
