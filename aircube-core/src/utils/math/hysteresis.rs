//! Banded air-quality index with hysteresis.
//!
//! The index runs over `[0, 100]` and is split into three bands by a low and a
//! high threshold. Near a threshold the displayed value is frozen so a reading
//! that jitters across the boundary does not make the LEDs flicker.

use serde::{Deserialize, Serialize};

use super::color::{GREEN_HUE, RED_HUE, YELLOW_HUE};
use crate::utils::config::ConfigError;

/// Upper end of the index domain.
pub const INDEX_MAX: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Band {
    Good,
    Moderate,
    Poor,
}

impl Band {
    /// Hue shown for the band: green, yellow or red.
    pub fn hue(self) -> u16 {
        match self {
            Band::Good => GREEN_HUE,
            Band::Moderate => YELLOW_HUE,
            Band::Poor => RED_HUE,
        }
    }
}

/// How the engine turns AQI into a target hue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorMapping {
    /// Continuous green→red interpolation.
    Hue,
    /// Three fixed colors chosen through [`IndexHysteresis`].
    Banded,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandThresholds {
    /// Good → Moderate boundary
    pub low: f32,
    /// Moderate → Poor boundary
    pub high: f32,
    /// Half-width of the hold zone around each boundary
    pub margin: f32,
}

impl Default for BandThresholds {
    fn default() -> Self {
        Self {
            low: 20.0,
            high: 60.0,
            margin: 5.0,
        }
    }
}

impl BandThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..INDEX_MAX).contains(&self.low) || !(0.0..=INDEX_MAX).contains(&self.high) {
            return Err(ConfigError::OutOfRange("band thresholds"));
        }
        if self.low >= self.high {
            return Err(ConfigError::Inverted("band thresholds"));
        }
        if self.margin.is_nan() || self.margin < 0.0 {
            return Err(ConfigError::OutOfRange("band margin"));
        }
        Ok(())
    }

    pub fn classify(
        &self,
        value: f32,
    ) -> Band {
        if value < self.low {
            Band::Good
        } else if value < self.high {
            Band::Moderate
        } else {
            Band::Poor
        }
    }

    fn in_margin(
        &self,
        value: f32,
    ) -> bool {
        libm::fabsf(value - self.low) < self.margin || libm::fabsf(value - self.high) < self.margin
    }
}

/// Result of feeding one raw value through the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displayed {
    pub value: f32,
    pub band: Band,
}

#[derive(Debug, Clone)]
pub struct IndexHysteresis {
    thresholds: BandThresholds,
    displayed: Option<Displayed>,
}

impl IndexHysteresis {
    pub const fn new(thresholds: BandThresholds) -> Self {
        Self {
            thresholds,
            displayed: None,
        }
    }

    /// Feed a raw index; returns what should be displayed.
    ///
    /// The first value is displayed as-is. Afterwards a value within the
    /// margin of either threshold keeps the previous display.
    pub fn update(
        &mut self,
        raw: f32,
    ) -> Displayed {
        let raw = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, INDEX_MAX) };
        let next = match self.displayed {
            Some(prev) if self.thresholds.in_margin(raw) => prev,
            _ => Displayed {
                value: raw,
                band: self.thresholds.classify(raw),
            },
        };
        self.displayed = Some(next);
        next
    }

    /// Last stable band, if any value has been seen.
    pub fn band(&self) -> Option<Band> {
        self.displayed.map(|d| d.band)
    }

    pub fn reset(&mut self) {
        self.displayed = None;
    }
}

impl Default for IndexHysteresis {
    fn default() -> Self {
        Self::new(BandThresholds::default())
    }
}

/// Scale an AQI reading from `[0, aqi_max]` onto the index domain.
pub fn aqi_to_index(
    aqi: u16,
    aqi_max: u16,
) -> f32 {
    let max = aqi_max.max(1) as f32;
    (aqi as f32 / max * INDEX_MAX).clamp(0.0, INDEX_MAX)
}
