#![cfg_attr(not(test), no_std)]

//! Sharp LS027B7DH01 400x240 memory LCD over `embedded-hal` SPI and GPIO.

pub mod display;
pub mod protocol;

pub use display::{DisplayError, SharpDisplay, SharpDisplayResult};
pub use protocol::{HEIGHT, LINE_BYTES, WIDTH};
