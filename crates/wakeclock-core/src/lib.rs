#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

//! Platform-independent core of the wake-on-button clock: data model,
//! capability traits, the boot/sync/render sequence and the small codecs the
//! firmware owns (NTP packets, credential records, broadcast provisioning).

extern crate alloc;

pub mod boot;
pub mod credentials;
pub mod power;
pub mod provision;
pub mod render;
pub mod sync;
pub mod time;

#[cfg(test)]
mod testing;
