//! Utility re-exports and helper macros for the AirCube.
//!
//! - `config`: device tunables and their validation
//! - `connection`: serial command protocol and telemetry
//! - `controllers`: I2C gateway, sensor drivers, color engine, LEDs and button
//! - `math`: hue wheel, AQI mapping and index hysteresis
//!
//! The `mk_static!` macro simplifies static initialization in no-std contexts.

pub mod config;
pub mod connection;
pub mod controllers;
pub mod math;

pub use config::DeviceConfig;
pub use controllers::{ColorEngine, DeviceContext, I2cGateway, LedRenderer, SensorHub};

#[doc(hidden)]
pub use static_cell;

#[macro_export]
/// Initialize a no-std static cell and write the given value into it.
///
/// This macro creates a `static_cell::StaticCell` for type `$t` and initializes
/// it with `$val`, returning a mutable reference to the stored value.
macro_rules! mk_static {
    ($t:ty, $val:expr) => {{
        static STATIC_CELL: $crate::utils::static_cell::StaticCell<$t> =
            $crate::utils::static_cell::StaticCell::new();
        STATIC_CELL.uninit().write($val)
    }};
}
