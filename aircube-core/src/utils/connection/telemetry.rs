//! Per-cycle telemetry line.

use alloc::string::String;
use serde::Serialize;

use crate::utils::controllers::{ens16x::AirStatus, sensors::SensorReading};

/// Round to two decimals for the wire.
pub fn round2(v: f32) -> f32 {
    libm::roundf(v * 100.0) / 100.0
}

#[derive(Debug, Serialize)]
struct Ens210Report {
    status: u8,
    temperature_c: f32,
    temperature_f: f32,
    humidity: f32,
}

#[derive(Debug, Serialize)]
struct Ens16xReport {
    status: AirStatus,
    etvoc: u16,
    eco2: u16,
    aqi: u16,
}

#[derive(Debug, Serialize)]
pub struct Telemetry {
    ens210: Ens210Report,
    ens16x: Ens16xReport,
    timestamp: u64,
}

impl From<&SensorReading> for Telemetry {
    fn from(r: &SensorReading) -> Self {
        Self {
            ens210: Ens210Report {
                status: r.ens210_status,
                temperature_c: round2(r.temperature_c),
                temperature_f: round2(r.temperature_f),
                humidity: round2(r.humidity),
            },
            ens16x: Ens16xReport {
                status: r.status,
                etvoc: r.etvoc_ppb,
                eco2: r.eco2_ppm,
                aqi: r.aqi,
            },
            timestamp: r.timestamp_ms,
        }
    }
}

/// Serialize a reading as one newline-terminated JSON line.
pub fn encode(reading: &SensorReading) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&Telemetry::from(reading))?;
    line.push('\n');
    Ok(line)
}
