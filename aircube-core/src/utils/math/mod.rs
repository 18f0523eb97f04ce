//! Color and filtering math for the AirCube light.
//!
//! - `color`: hue wheel, AQI→hue mapping, smoothing and pulse brightness
//! - `hysteresis`: banded index with hold zones around the band thresholds

pub mod color;
pub mod hysteresis;
