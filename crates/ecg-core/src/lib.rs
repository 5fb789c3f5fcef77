//! Hardware-independent core library for ecg-stream
//!
//! This crate contains all platform-agnostic logic for the ECG streaming
//! device: configuration, analog sample conversion, the WebSocket server and
//! its codec, the wireless join loop and the sampling/broadcast loop that ties
//! them together.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).
//! Hardware is reached only through the small traits at the seams:
//! [`sampling::AnalogSource`], [`wifi::NetworkLink`] and [`ws::Transport`].

#![no_std]

extern crate alloc;

pub mod config;
pub mod sampling;
pub mod streamer;
pub mod wifi;
pub mod ws;

#[cfg(test)]
mod testing;
