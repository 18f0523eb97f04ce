//! Serial connection: command protocol, telemetry lines and the rx/tx tasks.

pub mod protocol;
pub mod serial;
pub mod telemetry;
