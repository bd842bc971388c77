// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! retrorom serving engine
//!
//! Everything the firmware does between reset and serving, plus the
//! serving loops themselves, written against the [`Bus`], [`StatusLed`]
//! and [`Platform`] traits so it can be driven by real GPIO or by a
//! simulated bus on the host.
//!
//! - [`layout`] reads the firmware blob embedded by `retrorom-gen`, in
//!   place.
//! - [`select`] turns the image select jumpers into a ROM set index.
//! - [`boot`] runs the one-shot bootstrap and hands over to the engine.
//! - [`serve`] holds the serving algorithms.
//! - [`runtime`] is the information published for debug probes.
//! - [`fault`] signals processor faults on the status LED.

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod bus;
pub mod fault;
pub mod layout;
pub mod runtime;
pub mod select;
pub mod serve;

pub use boot::{BootConfig, BootError, Detected, Platform};
pub use bus::{Bus, StatusLed};
pub use fault::{FaultKind, signal_fault};
pub use layout::{ImageDesc, Layout, LayoutError, SetDesc};
pub use runtime::RuntimeInfo;
pub use serve::{Engine, ServeMasks};

pub fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
