//! Controllers for the AirCube hardware.
//!
//! - `i2c`: shared bus gateway with a bounded handle cache
//! - `ens210`, `ens16x`: register-level sensor drivers
//! - `sensors`: the poll cycle tying both sensors together
//! - `engine`: AQI → color control loop
//! - `leds`: shared LED state and strip output
//! - `button`: debounced brightness button
//! - `storage`: settings store contract
//!
//! All tasks share one [`DeviceContext`], handed out as a `&'static`.

pub mod button;
pub mod engine;
pub mod ens16x;
pub mod ens210;
pub mod i2c;
pub mod leds;
pub mod sensors;
pub mod storage;

use alloc::string::String;
use core::{
    cell::Cell,
    sync::atomic::{AtomicU32, Ordering},
};

use embassy_sync::{
    blocking_mutex::{raw::CriticalSectionRawMutex, Mutex},
    channel::Channel,
};
use embassy_time::{Duration, Instant};

pub use button::{Brightness, Edge};
pub use engine::ColorEngine;
pub use i2c::{BusError, I2cGateway};
pub use leds::{LedContext, LedRenderer, LedState};
pub use sensors::{SensorHub, SensorReading};

use crate::utils::{config::DeviceConfig, math::color::hue_to_rgb, math::color::GREEN_HUE};

/// Depth of the outbound serial queue.
pub const OUTBOUND_DEPTH: usize = 8;
/// Depth of the button edge queue.
pub const EDGE_DEPTH: usize = 8;

/// State shared by every task.
pub struct DeviceContext {
    pub config: DeviceConfig,
    pub leds: LedContext,
    readout_period_ms: AtomicU32,
    latest: Mutex<CriticalSectionRawMutex, Cell<Option<SensorReading>>>,
    outbound: Channel<CriticalSectionRawMutex, String, OUTBOUND_DEPTH>,
    edges: Channel<CriticalSectionRawMutex, Edge, EDGE_DEPTH>,
}

impl DeviceContext {
    /// Build the context with LEDs green at `intensity`.
    pub fn new(
        config: DeviceConfig,
        intensity: f32,
    ) -> Self {
        Self {
            leds: LedContext::new(
                LedState::new(hue_to_rgb(GREEN_HUE), intensity),
                Duration::from_millis(config.lock_timeout_ms as u64),
            ),
            readout_period_ms: AtomicU32::new(config.readout_period_ms),
            latest: Mutex::new(Cell::new(None)),
            outbound: Channel::new(),
            edges: Channel::new(),
            config,
        }
    }

    /// Current sensor readout period in milliseconds.
    pub fn readout_period_ms(&self) -> u32 {
        self.readout_period_ms.load(Ordering::Relaxed)
    }

    /// Clamp and store a new readout period; returns the applied value.
    pub fn set_readout_period(
        &self,
        requested_ms: f64,
    ) -> u32 {
        let period = self.config.clamp_readout_period(requested_ms);
        self.readout_period_ms.store(period, Ordering::Relaxed);
        period
    }

    /// Replace the latest reading seen by the engine and `get_config`.
    pub fn publish_reading(
        &self,
        reading: SensorReading,
    ) {
        self.latest.lock(|cell| cell.set(Some(reading)));
    }

    /// Copy of the most recent poll result, if any.
    pub fn latest_reading(&self) -> Option<SensorReading> {
        self.latest.lock(|cell| cell.get())
    }

    /// Queue a telemetry line; drops it when the queue is full.
    pub fn send_telemetry(
        &self,
        line: String,
    ) {
        if self.outbound.try_send(line).is_err() {
            tracing::warn!("Outbound queue full, dropping telemetry frame");
        }
    }

    /// Queue a command reply, waiting for room.
    pub async fn send_reply(
        &self,
        line: String,
    ) {
        self.outbound.send(line).await;
    }

    /// Wait for the next line to put on the serial link.
    pub async fn next_outbound(&self) -> String {
        self.outbound.receive().await
    }

    /// Record a button edge. Safe from interrupt context; returns `false`
    /// when the queue is full and the edge was lost.
    pub fn push_edge(&self) -> bool {
        self.push_edge_at(Instant::now().as_millis())
    }

    /// Record an edge with an explicit timestamp.
    pub fn push_edge_at(
        &self,
        at_ms: u64,
    ) -> bool {
        self.edges.try_send(Edge { at_ms }).is_ok()
    }

    /// Wait for the next queued button edge.
    pub async fn next_edge(&self) -> Edge {
        self.edges.receive().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::controllers::ens16x::AirStatus;
    use futures_lite::future::block_on;

    fn reading(aqi: u16) -> SensorReading {
        SensorReading {
            ens210_status: 0,
            temperature_c: 21.0,
            temperature_f: 69.8,
            humidity: 40.0,
            status: AirStatus::Ok,
            etvoc_ppb: 100,
            eco2_ppm: 400,
            aqi,
            timestamp_ms: 1,
        }
    }

    #[test]
    fn latest_reading_is_replaced() {
        let ctx = DeviceContext::new(DeviceConfig::default(), 0.6);
        assert_eq!(ctx.latest_reading(), None);
        ctx.publish_reading(reading(10));
        ctx.publish_reading(reading(20));
        assert_eq!(ctx.latest_reading().map(|r| r.aqi), Some(20));
    }

    #[test]
    fn readout_period_is_clamped() {
        let ctx = DeviceContext::new(DeviceConfig::default(), 0.6);
        assert_eq!(ctx.readout_period_ms(), 1000);
        assert_eq!(ctx.set_readout_period(20_000.0), 10_000);
        assert_eq!(ctx.readout_period_ms(), 10_000);
        assert_eq!(ctx.set_readout_period(5.0), 100);
    }

    #[test]
    fn full_outbound_queue_drops_telemetry() {
        let ctx = DeviceContext::new(DeviceConfig::default(), 0.6);
        for i in 0..OUTBOUND_DEPTH + 2 {
            ctx.send_telemetry(alloc::format!("{}\n", i));
        }
        assert_eq!(block_on(ctx.next_outbound()), "0\n");
        let mut drained = 1;
        while ctx.outbound.try_receive().is_ok() {
            drained += 1;
        }
        assert_eq!(drained, OUTBOUND_DEPTH);
    }

    #[test]
    fn edge_queue_is_bounded() {
        let ctx = DeviceContext::new(DeviceConfig::default(), 0.6);
        for i in 0..EDGE_DEPTH as u64 {
            assert!(ctx.push_edge_at(i));
        }
        assert!(!ctx.push_edge_at(99));
        assert_eq!(block_on(ctx.next_edge()), Edge { at_ms: 0 });
    }
}
