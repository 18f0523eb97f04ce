//! Device configuration.
//!
//! Every tunable of the control loop lives here. The host binary can load the
//! struct from JSON; missing fields fall back to [`DeviceConfig::default`].

use serde::{Deserialize, Serialize};

use crate::utils::{
    controllers::leds::{ChannelOrder, MAX_STRIP_LEN},
    math::hysteresis::{BandThresholds, ColorMapping},
};

/// Core device configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    // --- Timing ---
    /// Control loop (color engine) tick in milliseconds
    pub tick_ms: u32,
    /// LED output refresh period in milliseconds
    pub render_ms: u32,
    /// Initial sensor readout period in milliseconds
    pub readout_period_ms: u32,
    /// Lower clamp for `set_readout_period`
    pub readout_min_ms: u32,
    /// Upper clamp for `set_readout_period`
    pub readout_max_ms: u32,
    /// Bounded wait on the LED state lock
    pub lock_timeout_ms: u32,
    /// Delay between ENS210 start and the first read
    pub sensor_settle_ms: u32,

    // --- Color engine ---
    /// Fraction of the remaining hue distance covered per tick
    pub transition_speed: f32,
    /// Warm-up pulse period in milliseconds
    pub pulse_period_ms: u32,
    /// AQI at or above which the hue is pinned to red
    pub aqi_max: u16,
    /// AQI at or below which the hue is pinned to green
    pub aqi_green_threshold: u16,
    /// Hue mapping or banded green/yellow/red
    pub color_mapping: ColorMapping,
    pub band_thresholds: BandThresholds,
    /// Play the green→red→green sweep once at boot
    pub startup_sweep: bool,
    pub startup_sweep_ms: u32,

    // --- LEDs ---
    /// Pixels that show the air-quality color
    pub led_count: usize,
    /// Pixels on the physical strip; the rest are forced off
    pub strip_len: usize,
    pub channel_order: ChannelOrder,

    // --- Button ---
    /// Debounce window in milliseconds
    pub debounce_ms: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            // Timing
            tick_ms: 20,                // 50 Hz
            render_ms: 20,              // 50 Hz
            readout_period_ms: 1000,    // 1 Hz
            readout_min_ms: 100,
            readout_max_ms: 10_000,
            lock_timeout_ms: 100,
            sensor_settle_ms: 250,

            // Color engine
            transition_speed: 0.02,
            pulse_period_ms: 2000,
            aqi_max: 200,
            aqi_green_threshold: 10,
            color_mapping: ColorMapping::Hue,
            band_thresholds: BandThresholds::default(),
            startup_sweep: false,
            startup_sweep_ms: 3000,

            // LEDs
            led_count: 3,
            strip_len: 4,
            channel_order: ChannelOrder::Rgb,

            // Button
            debounce_ms: 50,
        }
    }
}

/// Reasons a configuration is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A period or count that must be non-zero is zero.
    Zero(&'static str),
    /// A value lies outside its permitted range.
    OutOfRange(&'static str),
    /// A lower bound is not below its upper bound.
    Inverted(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        match self {
            Self::Zero(field) => write!(f, "{} must be non-zero", field),
            Self::OutOfRange(field) => write!(f, "{} out of range", field),
            Self::Inverted(field) => write!(f, "{} bounds inverted", field),
        }
    }
}

impl core::error::Error for ConfigError {}

impl DeviceConfig {
    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, name) in [
            (self.tick_ms, "tick_ms"),
            (self.render_ms, "render_ms"),
            (self.lock_timeout_ms, "lock_timeout_ms"),
            (self.pulse_period_ms, "pulse_period_ms"),
            (self.debounce_ms, "debounce_ms"),
            (self.readout_min_ms, "readout_min_ms"),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.readout_min_ms >= self.readout_max_ms {
            return Err(ConfigError::Inverted("readout period"));
        }
        if !(self.readout_min_ms..=self.readout_max_ms).contains(&self.readout_period_ms) {
            return Err(ConfigError::OutOfRange("readout_period_ms"));
        }
        if !(self.transition_speed > 0.0 && self.transition_speed <= 1.0) {
            return Err(ConfigError::OutOfRange("transition_speed"));
        }
        if self.aqi_green_threshold >= self.aqi_max {
            return Err(ConfigError::Inverted("aqi thresholds"));
        }
        self.band_thresholds.validate()?;
        if self.led_count == 0 {
            return Err(ConfigError::Zero("led_count"));
        }
        if self.led_count > self.strip_len || self.strip_len > MAX_STRIP_LEN {
            return Err(ConfigError::OutOfRange("strip_len"));
        }
        Ok(())
    }

    /// Clamp a requested readout period into the configured bounds.
    pub fn clamp_readout_period(
        &self,
        requested_ms: f64,
    ) -> u32 {
        if requested_ms.is_nan() {
            return self.readout_min_ms;
        }
        let lo = self.readout_min_ms as f64;
        let hi = self.readout_max_ms as f64;
        requested_ms.clamp(lo, hi) as u32
    }
}
