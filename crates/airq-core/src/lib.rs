//! Hardware-independent core library for the air-quality sensing board
//!
//! This crate contains the platform-agnostic logic of the board: the BME688
//! gas sensor driver with its compensation and air-quality pipeline, the
//! storage collaborator used for baselines and data logging, the board
//! resource allocator, the output peripherals, and real-time clock helpers.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both the
//! embedded target (RP2040) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod async_i2c_bus;
pub mod board;
pub mod clock;
pub mod config;
pub mod metrics;
pub mod outputs;
pub mod rtc;
pub mod sensors;
pub mod storage;

#[cfg(any(test, feature = "sim"))]
pub mod sim;
