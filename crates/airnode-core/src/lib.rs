//! Hardware-independent core library for airnode
//!
//! This crate contains all platform-agnostic logic for the airnode
//! air-quality telemetry node: register-level bus transactions, the BMP180
//! pressure/temperature driver, MQ-series gas and humidity sampling with
//! moving-average smoothing, the fixed 20-byte telemetry frame codec, and
//! the cooperative sensing loop that drives the serial radio link.
//!
//! It is `#![no_std]` and generic over `embedded-hal` / `embedded-io`
//! traits so it compiles on both embedded targets and desktop hosts (for
//! the simulator and tests).

#![no_std]

pub mod bus;
pub mod config;
pub mod payload;
pub mod sampling;
pub mod sensors;
