//! ESP32-S3 board support for the wake clock.
#![no_std]

pub mod network;
pub mod platform;
pub mod storage;
