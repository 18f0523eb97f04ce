//! LED state and output for the AirCube.
//!
//! [`LedContext`] holds the `{color, intensity}` pair shared between the color
//! engine, the command handler and the button. [`LedRenderer`] drives an
//! addressable strip via `SmartLedsWrite` from snapshots of that pair.

use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, mutex::Mutex};
use embassy_time::{with_timeout, Duration, Ticker};
use serde::{Deserialize, Serialize};
use smart_leds_trait::{SmartLedsWrite, RGB8};

use crate::utils::math::color::{scale, OFF};

/// Longest strip the renderer will address.
pub const MAX_STRIP_LEN: usize = 64;

/// The LED state lock was not acquired within the bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimeout;

impl core::fmt::Display for LockTimeout {
    fn fmt(
        &self,
        f: &mut core::fmt::Formatter<'_>,
    ) -> core::fmt::Result {
        write!(f, "led state busy")
    }
}

/// Clamp an intensity into `[0, 1]`; NaN turns the LEDs off.
pub fn clamp_intensity(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Color and intensity as seen by the output task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedState {
    pub color: RGB8,
    pub intensity: f32,
}

impl LedState {
    pub const fn new(
        color: RGB8,
        intensity: f32,
    ) -> Self {
        Self { color, intensity }
    }

    /// Color after applying intensity.
    pub fn output(&self) -> RGB8 {
        scale(self.color, self.intensity)
    }
}

/// Shared LED state guarded by an async mutex.
///
/// Every accessor waits at most `lock_timeout` for the lock and copies the
/// state out; no caller keeps a reference past the call.
pub struct LedContext {
    state: Mutex<CriticalSectionRawMutex, LedState>,
    lock_timeout: Duration,
}

impl LedContext {
    pub fn new(
        initial: LedState,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(LedState::new(initial.color, clamp_intensity(initial.intensity))),
            lock_timeout,
        }
    }

    /// Copy of the current state, waiting at most the lock timeout.
    pub async fn snapshot(&self) -> Result<LedState, LockTimeout> {
        let guard = with_timeout(self.lock_timeout, self.state.lock())
            .await
            .map_err(|_| LockTimeout)?;
        Ok(*guard)
    }

    /// Non-waiting snapshot.
    #[cfg(test)]
    pub(crate) fn try_snapshot(&self) -> Option<LedState> {
        self.state.try_lock().ok().map(|guard| *guard)
    }

    /// Replace the color, keeping the intensity.
    pub async fn set_color(
        &self,
        color: RGB8,
    ) -> Result<(), LockTimeout> {
        let mut guard = with_timeout(self.lock_timeout, self.state.lock())
            .await
            .map_err(|_| LockTimeout)?;
        guard.color = color;
        Ok(())
    }

    /// Store a clamped intensity and return the value applied.
    pub async fn set_intensity(
        &self,
        intensity: f32,
    ) -> Result<f32, LockTimeout> {
        let applied = clamp_intensity(intensity);
        let mut guard = with_timeout(self.lock_timeout, self.state.lock())
            .await
            .map_err(|_| LockTimeout)?;
        guard.intensity = applied;
        Ok(applied)
    }

    /// Current intensity, waiting at most the lock timeout.
    pub async fn intensity(&self) -> Result<f32, LockTimeout> {
        Ok(self.snapshot().await?.intensity)
    }

    #[cfg(test)]
    pub(crate) fn try_hold(
        &self,
    ) -> Option<embassy_sync::mutex::MutexGuard<'_, CriticalSectionRawMutex, LedState>> {
        self.state.try_lock().ok()
    }
}

/// Byte order expected by the strip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Grb,
}

impl ChannelOrder {
    /// Reorder `c` into the strip's byte order.
    pub fn apply(
        self,
        c: RGB8,
    ) -> RGB8 {
        match self {
            ChannelOrder::Rgb => c,
            ChannelOrder::Grb => RGB8 {
                r: c.g,
                g: c.r,
                b: c.b,
            },
        }
    }
}

/// Pushes LED snapshots to a strip.
///
/// The first `led_count` pixels show the state color; the rest of the strip
/// is held dark.
pub struct LedRenderer<Driver> {
    driver: Driver,
    led_count: usize,
    strip_len: usize,
    order: ChannelOrder,
}

impl<Driver, E> LedRenderer<Driver>
where
    Driver: SmartLedsWrite<Color = RGB8, Error = E>,
    E: core::fmt::Debug,
{
    pub fn new(
        driver: Driver,
        led_count: usize,
        strip_len: usize,
        order: ChannelOrder,
    ) -> Self {
        let strip_len = strip_len.min(MAX_STRIP_LEN);
        Self {
            driver,
            led_count: led_count.min(strip_len),
            strip_len,
            order,
        }
    }

    /// Write one frame for `state`.
    pub fn render(
        &mut self,
        state: LedState,
    ) -> Result<(), E> {
        let lit = self.order.apply(state.output());
        let dark = self.order.apply(OFF);
        let count = self.led_count;
        let frame = (0..self.strip_len).map(|i| if i < count { lit } else { dark });
        self.driver.write(frame)
    }

    /// Refresh the strip every `period`, skipping frames when the state lock
    /// is busy.
    pub async fn run(
        mut self,
        leds: &LedContext,
        period: Duration,
    ) -> ! {
        let mut ticker = Ticker::every(period);
        loop {
            match leds.snapshot().await {
                Ok(state) => {
                    if let Err(e) = self.render(state) {
                        tracing::error!("LED write failed: {:?}", e);
                    }
                }
                Err(e) => tracing::warn!("Skipping LED frame: {}", e),
            }
            ticker.next().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> Driver {
        self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_lite::future::block_on;

    struct Recorder {
        frames: std::vec::Vec<std::vec::Vec<RGB8>>,
    }

    impl SmartLedsWrite for Recorder {
        type Error = ();
        type Color = RGB8;

        fn write<T, I>(
            &mut self,
            iterator: T,
        ) -> Result<(), Self::Error>
        where
            T: IntoIterator<Item = I>,
            I: Into<Self::Color>,
        {
            self.frames.push(iterator.into_iter().map(Into::into).collect());
            Ok(())
        }
    }

    fn ctx() -> LedContext {
        LedContext::new(LedState::new(OFF, 0.6), Duration::from_millis(100))
    }

    #[test]
    fn intensity_is_clamped() {
        let leds = ctx();
        assert_eq!(block_on(leds.set_intensity(1.5)), Ok(1.0));
        assert_eq!(block_on(leds.intensity()), Ok(1.0));
        assert_eq!(block_on(leds.set_intensity(-0.2)), Ok(0.0));
        assert_eq!(block_on(leds.set_intensity(f32::NAN)), Ok(0.0));
    }

    #[test]
    fn snapshot_copies_state() {
        let leds = ctx();
        let red = RGB8 { r: 255, g: 0, b: 0 };
        block_on(leds.set_color(red)).unwrap();
        let snap = leds.try_snapshot().unwrap();
        assert_eq!(snap, LedState::new(red, 0.6));
    }

    #[test]
    fn busy_lock_times_out() {
        let leds = ctx();
        let guard = leds.state.try_lock().unwrap();
        assert!(leds.try_snapshot().is_none());
        assert_eq!(block_on(leds.snapshot()), Err(LockTimeout));
        assert_eq!(block_on(leds.set_intensity(0.3)), Err(LockTimeout));
        drop(guard);
        assert_eq!(block_on(leds.intensity()), Ok(0.6));
    }

    #[test]
    fn render_lights_controlled_pixels_only() {
        let mut renderer =
            LedRenderer::new(Recorder { frames: std::vec::Vec::new() }, 3, 5, ChannelOrder::Rgb);
        renderer
            .render(LedState::new(RGB8 { r: 200, g: 100, b: 0 }, 0.5))
            .unwrap();
        let frames = renderer.into_inner().frames;
        let lit = RGB8 { r: 100, g: 50, b: 0 };
        assert_eq!(frames, std::vec![std::vec![lit, lit, lit, OFF, OFF]]);
    }

    #[test]
    fn grb_order_swaps_red_and_green() {
        let mut renderer =
            LedRenderer::new(Recorder { frames: std::vec::Vec::new() }, 1, 1, ChannelOrder::Grb);
        renderer
            .render(LedState::new(RGB8 { r: 255, g: 0, b: 7 }, 1.0))
            .unwrap();
        assert_eq!(renderer.into_inner().frames[0][0], RGB8 { r: 0, g: 255, b: 7 });
    }
}
