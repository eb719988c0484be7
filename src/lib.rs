#![cfg_attr(not(feature = "std"), no_std)]

//! Control core for a fluid-bed coffee roaster.
//!
//! The crate is hardware-agnostic: everything that touches a pin goes
//! through the [`hal::Hardware`] port, and everything that touches the host
//! goes through the [`transport::Link`] byte-stream boundary. The owned
//! [`controller::Controller`] value aggregates the whole machine and is
//! advanced by calling [`controller::Controller::tick`] from a single loop.

pub mod config;
pub mod controller;
pub mod fan;
pub mod filter;
pub mod hal;
pub mod heater;
pub mod pid;
pub mod protocol;
pub mod safety;
pub mod state;
pub mod thermistor;
pub mod thermocouple;
pub mod transport;

#[cfg(feature = "defmt")]
pub use defmt as log;

#[cfg(feature = "std")]
pub use log;

#[cfg(feature = "std")]
pub mod sim;

pub use controller::Controller;
pub use hal::Hardware;
pub use state::{Event, Phase};
pub use transport::Link;

/// Firmware version reported in the `connected` handshake.
pub static VERSION: &str = "3.0.0";

/// Nominal loop period in milliseconds. The control loop is tolerant of
/// jitter; only the monotonic clock from the hardware port is trusted.
pub static SYSTEM_TICK_MILLIS: u32 = 1;
