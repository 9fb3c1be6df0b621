//! siobridge-core - Core library for a host-to-bus serial I/O bridge
//!
//! This crate implements the device-resident side of a packet-oriented
//! serial I/O bridge: a host sends fixed-size request packets over an
//! interrupt transport, the bridge executes them against I2C, SPI and GPIO
//! controllers and queues fixed-size responses back. It is designed to be
//! `no_std` compatible so the same core runs in firmware and in host-side
//! test harnesses.
//!
//! The bridge is split across two execution contexts:
//!
//! - **interrupt context**: the transport delivers received packets via
//!   [`bridge::Bridge::rx_complete`] and reports transmit completion via
//!   [`bridge::Bridge::tx_complete`]. Neither blocks.
//! - **dispatch context**: a cooperative loop calls
//!   [`bridge::Bridge::process`], which pops one request, runs exactly one
//!   handler (possibly driving a blocking bus transaction to completion)
//!   and publishes the response.
//!
//! The two contexts share only the lock-free packet rings in [`ring`] and
//! a handful of atomic flags; see the module docs for the exact discipline.
//!
//! # Example
//!
//! ```ignore
//! use siobridge_core::bridge::{Bridge, BridgeIo};
//!
//! static BRIDGE: Bridge = Bridge::new();
//!
//! fn dispatch_loop(link: &mut impl HostLink, io: &mut BridgeIo<'_, I, S, G>) -> ! {
//!     loop {
//!         BRIDGE.process(link, io);
//!     }
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "std")]
extern crate std;

#[cfg(all(test, not(feature = "std")))]
extern crate std;

pub mod bridge;
pub mod controller;
pub mod error;
pub mod gpio;
pub mod i2c;
pub mod protocol;
pub mod ring;
pub mod spi;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
