// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! retrorom-fw-parser
//!
//! Decodes the two structures a host sees when inspecting a retrorom
//! device: the firmware blob's ROM set layout, as stored in flash, and the
//! runtime info block the firmware publishes in RAM for debug probes.
//!
//! ```ignore
//! let layout = retrorom_fw_parser::parse_layout(&flash_bytes)?;
//! for set in &layout.rom_sets {
//!     println!("{set}");
//! }
//!
//! let info = retrorom_fw_parser::parse_runtime_info(&ram_bytes)?;
//! println!("Serving set {} ({} accesses)", info.rom_set_index, info.access_count);
//! ```
//!
//! Both entry points return `Err(String)` describing the first problem
//! found.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

use core::fmt;

use retrorom_config::chip::{ChipClass, CsLogic};
use retrorom_config::fw::ServeAlg;

mod parsing;

pub use parsing::{RUNTIME_INFO_ACCESS_COUNT_OFFSET, RUNTIME_INFO_SIZE};

/// Highest layout version this crate understands
pub const MAX_LAYOUT_VERSION: u32 = retrorom_config::layout::LAYOUT_VERSION;

/// Runtime information published by the firmware.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RuntimeInfo {
    /// Raw image select jumper value, or 0xFF before selection
    pub image_sel: u8,

    /// Index of the set being served, or 0xFF before selection
    pub rom_set_index: u8,

    pub count_rom_access: bool,

    /// Chip select activations since boot, if counting
    pub access_count: u32,

    /// Address of the combined image being served
    pub rom_table_ptr: u32,

    pub rom_table_size: u32,
}

impl RuntimeInfo {
    /// Whether the firmware got as far as selecting a set
    pub fn is_selected(&self) -> bool {
        self.rom_set_index != 0xFF
    }
}

/// The ROM set layout of a firmware blob.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LayoutInfo {
    pub version: u32,

    /// Offset of the first combined image
    pub data_offset: u32,

    pub rom_sets: Vec<RomSetInfo>,
}

/// One ROM set in the blob.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RomSetInfo {
    pub index: usize,

    /// Offset of this set's combined image within the blob
    pub data_offset: u32,

    /// Size of the combined image
    pub size: u32,

    pub serve_alg: ServeAlg,

    /// Select line logic, for sets of more than one image
    pub multi_cs: CsLogic,

    pub roms: Vec<RomInfo>,
}

/// One ROM image within a set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RomInfo {
    pub class: ChipClass,
    pub cs1: CsLogic,
    pub cs2: Option<CsLogic>,
    pub cs3: Option<CsLogic>,

    /// Filename or label, if the blob was built with them
    pub filename: Option<String>,
}

impl fmt::Display for RomInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} CS1 {:?}", self.class, self.cs1)?;
        if let Some(cs2) = self.cs2 {
            write!(f, " CS2 {cs2:?}")?;
        }
        if let Some(cs3) = self.cs3 {
            write!(f, " CS3 {cs3:?}")?;
        }
        if let Some(filename) = &self.filename {
            write!(f, " {filename}")?;
        }
        Ok(())
    }
}

impl fmt::Display for RomSetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Set {}: {} image(s), {} bytes at {:#010X}, {}",
            self.index,
            self.roms.len(),
            self.size,
            self.data_offset,
            self.serve_alg
        )?;
        if self.roms.len() > 1 {
            write!(f, ", select lines {:?}", self.multi_cs)?;
        }
        Ok(())
    }
}

/// Parses a runtime info block read from the device.
pub fn parse_runtime_info(data: &[u8]) -> Result<RuntimeInfo, String> {
    let header = parsing::parse_and_validate_runtime_info(data)?;
    Ok(RuntimeInfo {
        image_sel: header.image_sel,
        rom_set_index: header.rom_set_index,
        count_rom_access: header.count_rom_access != 0,
        access_count: header.access_count,
        rom_table_ptr: header.rom_table_ptr,
        rom_table_size: header.rom_table_size,
    })
}

/// Reads just the access counter from a runtime info block, for probes
/// polling it without re-reading the whole block.
pub fn parse_access_count(data: &[u8]) -> Result<u32, String> {
    let end = RUNTIME_INFO_ACCESS_COUNT_OFFSET + 4;
    let bytes = data
        .get(RUNTIME_INFO_ACCESS_COUNT_OFFSET..end)
        .ok_or_else(|| String::from("Access count data too small"))?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Parses the ROM set layout of a firmware blob.
pub fn parse_layout(blob: &[u8]) -> Result<LayoutInfo, String> {
    let header = parsing::parse_and_validate_layout_header(blob)?;
    let rom_sets = parsing::read_rom_sets(blob, &header)?;
    Ok(LayoutInfo {
        version: header.version,
        data_offset: header.data_offset,
        rom_sets,
    })
}
