// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Shared configuration for retrorom.
//!
//! Holds the vocabulary used by both the offline image codec and the
//! on-device serving engine:
//! - [`chip`] - the emulated ROM classes and chip select polarity
//! - [`fw`] - serving algorithms
//! - [`mcu`] - supported microcontroller variants
//! - [`hw`] - pin mappings and built-in hardware profiles, plus the bit
//!   permutations between logical and physical values
//! - [`layout`] - constants describing the firmware blob layout

#![no_std]

pub mod chip;
pub mod fw;
pub mod hw;
pub mod layout;
pub mod mcu;
