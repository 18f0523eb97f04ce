//! Hue wheel, AQI mapping and brightness math.
//!
//! Hues live on a 16-bit wheel (one full turn = 65536 steps). Red sits at 0,
//! green at one third of the wheel and blue at two thirds.

use core::f32::consts::PI;

use smart_leds::hsv::{hsv2rgb, Hsv};
use smart_leds_trait::RGB8;

/// Steps in one full turn of the hue wheel.
pub const HUE_WHEEL: u32 = 65_536;
pub const RED_HUE: u16 = 0;
pub const YELLOW_HUE: u16 = 10_923;
pub const GREEN_HUE: u16 = 21_845;
/// Cold hue used while the gas sensor warms up.
pub const BLUE_HUE: u16 = 43_690;

pub const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };
pub const WARMUP_COLOR: RGB8 = RGB8 { r: 0, g: 0, b: 255 };

/// Hue distance below which a transition snaps onto its target.
pub const SNAP_DISTANCE: f32 = 0.5;

/// Convert a wheel position into a fully saturated color.
///
/// Smoothing runs on the 16-bit wheel; output uses the top byte, which is
/// the resolution `hsv2rgb` works at.
pub fn hue_to_rgb(hue: u16) -> RGB8 {
    hsv2rgb(Hsv {
        hue: (hue >> 8) as u8,
        sat: 255,
        val: 255,
    })
}

/// Reduce any float hue onto the wheel.
pub fn wrap_hue(hue: f32) -> u16 {
    let wheel = HUE_WHEEL as f32;
    let mut h = libm::fmodf(libm::roundf(hue), wheel);
    if h < 0.0 {
        h += wheel;
    }
    (h as u32 % HUE_WHEEL) as u16
}

/// Map an AQI reading to a hue between green and red.
///
/// At or below `green_at` the hue is green; at or above `max` it is red; in
/// between it falls linearly.
pub fn aqi_to_hue(
    aqi: u16,
    green_at: u16,
    max: u16,
) -> u16 {
    if aqi <= green_at {
        return GREEN_HUE;
    }
    if aqi >= max {
        return RED_HUE;
    }
    let span = (max - green_at) as u32;
    let left = (max - aqi) as u32;
    (GREEN_HUE as u32 * left / span) as u16
}

/// One smoothing step from `current` toward `target`.
pub fn approach_hue(
    current: f32,
    target: f32,
    speed: f32,
) -> f32 {
    let diff = target - current;
    if libm::fabsf(diff) < SNAP_DISTANCE {
        target
    } else {
        current + diff * speed
    }
}

/// Hue for the boot sweep: green at 0, red at the midpoint, green again at 1.
pub fn sweep_hue(progress: f32) -> u16 {
    let p = progress.clamp(0.0, 1.0);
    let distance = libm::fabsf(1.0 - 2.0 * p);
    libm::roundf(GREEN_HUE as f32 * distance) as u16
}

/// Multiply every channel by `factor`, rounding to the nearest step.
pub fn scale(
    color: RGB8,
    factor: f32,
) -> RGB8 {
    let f = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
    let ch = |c: u8| libm::roundf(c as f32 * f) as u8;
    RGB8 {
        r: ch(color.r),
        g: ch(color.g),
        b: ch(color.b),
    }
}

/// Sine pulse in `[0, 1]` for a time offset within a period.
pub fn pulse_brightness(
    pulse_time_ms: u32,
    period_ms: u32,
) -> f32 {
    let period = period_ms.max(1);
    let phase = (pulse_time_ms % period) as f32 / period as f32 * 2.0 * PI;
    (libm::sinf(phase) + 1.0) / 2.0
}

pub fn pulse_color(
    base: RGB8,
    pulse_time_ms: u32,
    period_ms: u32,
) -> RGB8 {
    scale(base, pulse_brightness(pulse_time_ms, period_ms))
}
