// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Generates the firmware blob for retrorom.
//!
//! - [`image`] turns logical ROM images into combined images, indexed the
//!   way the serving engine reads the address and chip select port.
//! - [`builder`] drives that from a JSON ROM configuration.
//! - [`meta`] lays the result out as the blob embedded in the firmware.

#![no_std]

extern crate alloc;

pub mod builder;
pub mod image;
pub mod meta;

pub use builder::{BuildProperties, Builder, Config, FileData, FileSpec, RomConfig};
pub use image::{CombinedImage, CsConfig, RomImage, RomSet, RomSetType, SizeHandling};
pub use image::{PAD_BLANK_BYTE, PAD_NO_CHIP_BYTE, decode, encode};
pub use meta::Metadata;

use alloc::string::String;
use core::fmt;

use retrorom_config::chip::{ChipClass, CsLine, CsLogic};
use retrorom_config::fw::ServeAlg;
use retrorom_config::hw::MappingError;

/// Version of ROM configuration understood by this crate
pub const CONFIG_VERSION: u32 = 1;

/// Flash reserved at the start of flash for the firmware itself
pub const FIRMWARE_SIZE: usize = 48 * 1024;

/// Error type
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Error {
    ImageTooSmall {
        index: usize,
        expected: usize,
        actual: usize,
    },
    ImageTooLarge {
        index: usize,
        image_size: usize,
        expected_size: usize,
    },
    DuplicationNotExactDivisor {
        index: usize,
        image_size: usize,
        expected_size: usize,
    },
    BufferTooSmall {
        location: &'static str,
        expected: usize,
        actual: usize,
    },
    NoImages,
    TooManyImages {
        expected: usize,
        actual: usize,
    },
    TooManySets {
        count: usize,
        max: usize,
    },
    WrongImageCount {
        set_type: RomSetType,
        actual: usize,
    },
    MissingCsConfig {
        index: usize,
        line: CsLine,
    },
    InvalidServeAlg {
        serve_alg: ServeAlg,
    },
    InconsistentCsLogic {
        first: CsLogic,
        other: CsLogic,
    },
    UnsupportedMapping {
        class: ChipClass,
        reason: &'static str,
    },
    InvalidMapping {
        error: MappingError,
    },
    InvalidConfig {
        error: String,
    },
    UnsupportedConfigVersion {
        version: u32,
    },
    DuplicateFile {
        id: usize,
    },
    MissingFile {
        id: usize,
    },
    TooLargeForFlash {
        size: usize,
        available: usize,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ImageTooSmall {
                index,
                expected,
                actual,
            } => write!(
                f,
                "ROM {index} is {actual} bytes, expected {expected} - set size_handling to pad or duplicate"
            ),
            Error::ImageTooLarge {
                index,
                image_size,
                expected_size,
            } => write!(
                f,
                "ROM {index} is {image_size} bytes, larger than its class ({expected_size} bytes)"
            ),
            Error::DuplicationNotExactDivisor {
                index,
                image_size,
                expected_size,
            } => write!(
                f,
                "ROM {index} is {image_size} bytes, which does not divide {expected_size}"
            ),
            Error::BufferTooSmall {
                location,
                expected,
                actual,
            } => write!(
                f,
                "{location}: buffer too small, need {expected} bytes, have {actual}"
            ),
            Error::NoImages => write!(f, "ROM set contains no images"),
            Error::TooManyImages { expected, actual } => {
                write!(f, "ROM set has {actual} images, maximum {expected}")
            }
            Error::TooManySets { count, max } => {
                write!(f, "{count} ROM sets configured, maximum {max}")
            }
            Error::WrongImageCount { set_type, actual } => {
                write!(f, "{set_type:?} ROM set cannot hold {actual} images")
            }
            Error::MissingCsConfig { index, line } => {
                write!(f, "ROM {index} is missing {line} configuration")
            }
            Error::InvalidServeAlg { serve_alg } => {
                write!(f, "Serving algorithm {serve_alg} is not valid for this set")
            }
            Error::InconsistentCsLogic { first, other } => write!(
                f,
                "Inconsistent chip select logic within set: {first} and {other}"
            ),
            Error::UnsupportedMapping { class, reason } => {
                write!(f, "Pin mapping cannot serve {class}: {reason}")
            }
            Error::InvalidMapping { error } => write!(f, "Invalid pin mapping: {error}"),
            Error::InvalidConfig { error } => write!(f, "Invalid config: {error}"),
            Error::UnsupportedConfigVersion { version } => {
                write!(f, "Unsupported config version {version}")
            }
            Error::DuplicateFile { id } => write!(f, "File {id} supplied twice"),
            Error::MissingFile { id } => write!(f, "File {id} not supplied"),
            Error::TooLargeForFlash { size, available } => write!(
                f,
                "Firmware blob is {size} bytes, only {available} bytes of flash available"
            ),
        }
    }
}

impl core::error::Error for Error {}

impl From<MappingError> for Error {
    fn from(error: MappingError) -> Self {
        Error::InvalidMapping { error }
    }
}

type Result<T> = core::result::Result<T, Error>;

pub fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
