//! Brightness button.
//!
//! The pin interrupt only timestamps rising edges and queues them as
//! [`Edge`]s (see [`DeviceContext::push_edge`](super::DeviceContext::push_edge)).
//! This task runs the debounce state machine and, for every accepted press,
//! steps the LED intensity through [`BRIGHTNESS_LEVELS`] and saves the choice.
//!
//! | State            | Event                      | Next             |
//! |------------------|----------------------------|------------------|
//! | Idle             | edge after quiet period    | Window           |
//! | Idle             | edge inside quiet period   | Idle (ignored)   |
//! | Window           | edge                       | Window (ignored) |
//! | Window           | window closes              | Idle             |

use embassy_time::{Instant, Timer};
use embedded_hal::digital::InputPin;

use super::{
    storage::{PersistenceError, SettingsStore},
    DeviceContext,
};

/// Selectable intensities.
pub const BRIGHTNESS_LEVELS: [f32; 4] = [0.0, 0.3, 0.6, 1.0];
pub const DEFAULT_BRIGHTNESS_INDEX: usize = 2;
/// Store key for the brightness index.
pub const BRIGHTNESS_KEY: &str = "led_brightness";

/// Rising edge seen by the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub at_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Idle,
    Window { armed_at: u64 },
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    state: DebounceState,
    interval_ms: u64,
    quiet_until: u64,
}

impl Debouncer {
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            state: DebounceState::Idle,
            interval_ms,
            quiet_until: 0,
        }
    }

    /// Feed an edge. Returns the time the window closes if this edge opened
    /// one, `None` if the edge was ignored.
    pub fn on_edge(
        &mut self,
        edge: Edge,
    ) -> Option<u64> {
        match self.state {
            DebounceState::Idle if edge.at_ms >= self.quiet_until => {
                self.state = DebounceState::Window {
                    armed_at: edge.at_ms,
                };
                Some(edge.at_ms + self.interval_ms)
            }
            _ => None,
        }
    }

    /// Close the window. Returns `true` when the press is accepted, i.e. the
    /// input is still asserted.
    pub fn settle(
        &mut self,
        asserted: bool,
    ) -> bool {
        match self.state {
            DebounceState::Window { armed_at } => {
                self.quiet_until = armed_at + self.interval_ms;
                self.state = DebounceState::Idle;
                asserted
            }
            DebounceState::Idle => false,
        }
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        self.state == DebounceState::Idle
    }
}

/// Index into [`BRIGHTNESS_LEVELS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Brightness {
    index: usize,
}

impl Default for Brightness {
    fn default() -> Self {
        Self {
            index: DEFAULT_BRIGHTNESS_INDEX,
        }
    }
}

impl Brightness {
    pub fn from_index(index: i32) -> Result<Self, PersistenceError> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < BRIGHTNESS_LEVELS.len())
            .map(|index| Self { index })
            .ok_or(PersistenceError::OutOfRange)
    }

    /// Read the saved preference; anything missing or unusable gives the
    /// default.
    pub fn load<S: SettingsStore>(store: &S) -> Self {
        let stored = store
            .get(BRIGHTNESS_KEY)
            .and_then(|raw| raw.map(Self::from_index).transpose());
        match stored {
            Ok(Some(b)) => {
                tracing::info!("Loaded brightness index {} ({})", b.index, b.level());
                b
            }
            Ok(None) => {
                tracing::info!("No saved brightness, using default");
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Saved brightness rejected ({}), using default", e);
                Self::default()
            }
        }
    }

    pub fn persist<S: SettingsStore>(
        &self,
        store: &mut S,
    ) -> Result<(), PersistenceError> {
        store.set(BRIGHTNESS_KEY, self.index as i32)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn level(&self) -> f32 {
        BRIGHTNESS_LEVELS[self.index]
    }

    /// Step to the next level, wrapping to off after full.
    pub fn advance(&mut self) -> f32 {
        self.index = (self.index + 1) % BRIGHTNESS_LEVELS.len();
        self.level()
    }
}

/// Button task: debounce queued edges and cycle the brightness.
pub async fn run<P, S>(
    ctx: &DeviceContext,
    mut pin: P,
    mut store: S,
    mut brightness: Brightness,
) -> !
where
    P: InputPin,
    S: SettingsStore,
{
    let mut debouncer = Debouncer::new(ctx.config.debounce_ms as u64);
    loop {
        let edge = ctx.next_edge().await;
        let Some(closes_at) = debouncer.on_edge(edge) else {
            tracing::debug!("Ignoring bounce at {} ms", edge.at_ms);
            continue;
        };
        Timer::at(Instant::from_millis(closes_at)).await;

        let asserted = pin.is_high().unwrap_or_else(|_| {
            tracing::warn!("Button pin read failed");
            false
        });
        if !debouncer.settle(asserted) {
            continue;
        }

        let level = brightness.advance();
        match ctx.leds.set_intensity(level).await {
            Ok(applied) => tracing::info!("Button pressed, brightness now {}", applied),
            Err(e) => tracing::warn!("Brightness change not applied: {}", e),
        }
        if let Err(e) = brightness.persist(&mut store) {
            tracing::warn!("Failed to save brightness: {}", e);
        }
    }
}
