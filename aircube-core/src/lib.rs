//! Core drivers and control loop for the AirCube air-quality light.
//!
//! The crate is `no_std`; the host simulation lives in `aircube-app/mock-mcu`.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod utils;
