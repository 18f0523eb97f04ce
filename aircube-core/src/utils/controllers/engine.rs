//! Color engine: turns the latest sensor reading into the LED color.
//!
//! Every tick picks a target hue (warm-up, saturated, or mapped from AQI),
//! moves the displayed hue a fraction of the way toward it and publishes the
//! resulting color. While the gas sensor warms up the published color is a
//! blue pulse instead.

use embassy_time::{Duration, Instant, Ticker};
use smart_leds_trait::RGB8;

use super::{ens16x::AirStatus, sensors::SensorReading, DeviceContext};
use crate::utils::{
    config::DeviceConfig,
    math::{
        color::{
            approach_hue, aqi_to_hue, hue_to_rgb, pulse_color, sweep_hue, wrap_hue, BLUE_HUE,
            GREEN_HUE, RED_HUE, WARMUP_COLOR,
        },
        hysteresis::{aqi_to_index, Band, ColorMapping, IndexHysteresis},
    },
};

/// The parts of a reading the engine looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineInput {
    pub status: AirStatus,
    pub aqi: u16,
}

impl From<SensorReading> for EngineInput {
    fn from(r: SensorReading) -> Self {
        Self {
            status: r.status,
            aqi: r.aqi,
        }
    }
}

pub struct ColorEngine {
    current_hue: f32,
    target_hue: u16,
    pulse_time_ms: u32,
    last_stable_band: Option<Band>,
    hysteresis: IndexHysteresis,
    mapping: ColorMapping,
    tick_ms: u32,
    speed: f32,
    pulse_period_ms: u32,
    aqi_max: u16,
    green_at: u16,
}

impl ColorEngine {
    /// Engine resting on green.
    pub fn new(config: &DeviceConfig) -> Self {
        Self {
            current_hue: GREEN_HUE as f32,
            target_hue: GREEN_HUE,
            pulse_time_ms: 0,
            last_stable_band: None,
            hysteresis: IndexHysteresis::new(config.band_thresholds),
            mapping: config.color_mapping,
            tick_ms: config.tick_ms,
            speed: config.transition_speed,
            pulse_period_ms: config.pulse_period_ms,
            aqi_max: config.aqi_max,
            green_at: config.aqi_green_threshold,
        }
    }

    /// Target hue for a reading. The band filter sees every post-warm-up
    /// reading, saturated ones included.
    fn target_for(
        &mut self,
        input: EngineInput,
    ) -> u16 {
        if input.status == AirStatus::WarmingUp {
            return BLUE_HUE;
        }
        let band = match self.mapping {
            ColorMapping::Hue => None,
            ColorMapping::Banded => Some(self.update_band(input.aqi)),
        };
        if input.aqi >= self.aqi_max {
            return RED_HUE;
        }
        match band {
            Some(band) => band.hue(),
            None => aqi_to_hue(input.aqi, self.green_at, self.aqi_max),
        }
    }

    fn update_band(
        &mut self,
        aqi: u16,
    ) -> Band {
        let shown = self.hysteresis.update(aqi_to_index(aqi, self.aqi_max));
        if self.last_stable_band != Some(shown.band) {
            tracing::info!("Air quality band now {:?}", shown.band);
            self.last_stable_band = Some(shown.band);
        }
        shown.band
    }

    /// Advance one tick. With no reading yet the engine keeps its target.
    pub fn tick(
        &mut self,
        input: Option<EngineInput>,
    ) -> RGB8 {
        if let Some(input) = input {
            self.target_hue = self.target_for(input);
        }
        self.current_hue = approach_hue(self.current_hue, self.target_hue as f32, self.speed);

        match input {
            Some(EngineInput {
                status: AirStatus::WarmingUp,
                ..
            }) => {
                self.pulse_time_ms = self.pulse_time_ms.wrapping_add(self.tick_ms);
                pulse_color(WARMUP_COLOR, self.pulse_time_ms, self.pulse_period_ms)
            }
            _ => hue_to_rgb(wrap_hue(self.current_hue)),
        }
    }

    /// Hue currently shown, on the 16-bit wheel.
    pub fn current_hue(&self) -> f32 {
        self.current_hue
    }

    /// Hue the engine is moving toward.
    pub fn target_hue(&self) -> u16 {
        self.target_hue
    }

    /// Band last reported by the banded mapping.
    pub fn last_stable_band(&self) -> Option<Band> {
        self.last_stable_band
    }

    /// Green→red→green over `duration`, then settle on green.
    pub async fn startup_sweep(
        &mut self,
        ctx: &DeviceContext,
        duration: Duration,
    ) {
        tracing::info!("Playing startup sweep");
        let start = Instant::now();
        let mut ticker = Ticker::every(Duration::from_millis(self.tick_ms as u64));
        loop {
            let elapsed = start.elapsed();
            if elapsed >= duration {
                break;
            }
            let progress = elapsed.as_millis() as f32 / duration.as_millis().max(1) as f32;
            if let Err(e) = ctx.leds.set_color(hue_to_rgb(sweep_hue(progress))).await {
                tracing::warn!("Sweep frame dropped: {}", e);
            }
            ticker.next().await;
        }
        self.current_hue = GREEN_HUE as f32;
        if let Err(e) = ctx.leds.set_color(hue_to_rgb(GREEN_HUE)).await {
            tracing::warn!("Sweep end color dropped: {}", e);
        }
    }

    /// Control loop: one tick per configured period, forever.
    pub async fn run(
        &mut self,
        ctx: &DeviceContext,
    ) -> ! {
        if ctx.config.startup_sweep {
            self.startup_sweep(ctx, Duration::from_millis(ctx.config.startup_sweep_ms as u64))
                .await;
        }
        let mut ticker = Ticker::every(Duration::from_millis(self.tick_ms as u64));
        loop {
            let color = self.tick(ctx.latest_reading().map(EngineInput::from));
            if let Err(e) = ctx.leds.set_color(color).await {
                tracing::warn!("Color update dropped: {}", e);
            }
            ticker.next().await;
        }
    }
}
