// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Internal structures for parsing the retrorom firmware blob and runtime
//! info.

use deku::prelude::*;
use log::trace;
use static_assertions::const_assert_eq;

use retrorom_config::chip::{ChipClass, CsLogic};
use retrorom_config::fw::ServeAlg;
use retrorom_config::layout::{
    IMAGE_INFO_LEN, LAYOUT_HEADER_LEN, LAYOUT_MAGIC, NO_FILENAME, SET_ENTRY_LEN,
};

use crate::{MAX_LAYOUT_VERSION, RomInfo, RomSetInfo};

#[cfg(not(feature = "std"))]
use alloc::{format, string::String, vec::Vec};

/// Size of the runtime info block, including its magic
pub const RUNTIME_INFO_SIZE: usize = 20;

/// Offset of the access counter within the runtime info block
pub const RUNTIME_INFO_ACCESS_COUNT_OFFSET: usize = 8;

// Longest filename read from a blob
const MAX_STRING_LEN: usize = 256;

// Chip select byte for a line the class doesn't have
const CS_NONE: u8 = 0xFF;

// Reflects `RuntimeInfo` in retrorom-engine
#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little", magic = b"rrom")]
pub(crate) struct RuntimeInfoHeader {
    pub runtime_info_size: u8,
    pub image_sel: u8,
    pub rom_set_index: u8,
    pub count_rom_access: u8,
    pub access_count: u32,
    pub rom_table_ptr: u32,
    pub rom_table_size: u32,
}

// Struct size excludes the magic
const_assert_eq!(core::mem::size_of::<RuntimeInfoHeader>(), RUNTIME_INFO_SIZE - 4);

#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little", magic = b"RETROROM_LAYOUT\0")]
pub(crate) struct LayoutHeader {
    pub version: u32,
    #[deku(pad_bytes_after = "3")]
    pub set_count: u8,
    pub sets_offset: u32,
    pub data_offset: u32,
}

const_assert_eq!(
    core::mem::size_of::<LayoutHeader>() + LAYOUT_MAGIC.len(),
    LAYOUT_HEADER_LEN
);

#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little")]
struct SetEntry {
    data_offset: u32,
    size: u32,
    images_offset: u32,
    image_count: u8,
    serve_alg: u8,
    multi_cs: u8,
    _pad: u8,
}

const_assert_eq!(core::mem::size_of::<SetEntry>(), SET_ENTRY_LEN);

#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little")]
struct ImageInfo {
    class: u8,
    cs1: u8,
    cs2: u8,
    cs3: u8,
    filename_offset: u32,
}

const_assert_eq!(core::mem::size_of::<ImageInfo>(), IMAGE_INFO_LEN);

/// Parse and validate runtime information from buffer
pub(crate) fn parse_and_validate_runtime_info(data: &[u8]) -> Result<RuntimeInfoHeader, String> {
    if data.len() < RUNTIME_INFO_SIZE {
        return Err("Runtime info data too small".into());
    }

    let (_, header) = RuntimeInfoHeader::from_bytes((data, 0))
        .map_err(|e| format!("Failed to parse runtime info: {e}"))?;

    if (header.runtime_info_size as usize) < RUNTIME_INFO_SIZE {
        return Err(format!(
            "Invalid runtime info size: {} < {RUNTIME_INFO_SIZE}",
            header.runtime_info_size
        ));
    }

    Ok(header)
}

/// Parse and validate the layout header from the start of a blob
pub(crate) fn parse_and_validate_layout_header(blob: &[u8]) -> Result<LayoutHeader, String> {
    if blob.len() < LAYOUT_HEADER_LEN {
        return Err("Layout header data too small".into());
    }

    let (_, header) = LayoutHeader::from_bytes((blob, 0))
        .map_err(|e| format!("Failed to parse layout header: {e}"))?;

    if header.version == 0 || header.version > MAX_LAYOUT_VERSION {
        return Err(format!(
            "Layout version {} unsupported - max version {MAX_LAYOUT_VERSION}",
            header.version
        ));
    }

    if header.data_offset as usize > blob.len() {
        return Err(format!(
            "Data offset {:#010X} beyond end of blob",
            header.data_offset
        ));
    }

    Ok(header)
}

// Returns the `len` bytes at `offset`, or an error naming `what`
fn slice_at<'a>(blob: &'a [u8], offset: u32, len: usize, what: &str) -> Result<&'a [u8], String> {
    let start = offset as usize;
    start
        .checked_add(len)
        .and_then(|end| blob.get(start..end))
        .ok_or_else(|| format!("{what} at {offset:#010X} beyond end of blob"))
}

/// Read a NUL terminated string at the given offset
pub(crate) fn read_string_at_offset(blob: &[u8], offset: u32) -> Result<String, String> {
    let start = offset as usize;
    let tail = blob
        .get(start..)
        .ok_or_else(|| format!("Invalid string offset: {offset:#010X}"))?;
    let tail = &tail[..tail.len().min(MAX_STRING_LEN + 1)];

    let Some(nul) = tail.iter().position(|&b| b == 0) else {
        return Err(format!("String at {offset:#010X} unterminated or too long"));
    };

    String::from_utf8(tail[..nul].to_vec()).map_err(|_| "Invalid UTF-8 string".into())
}

fn cs_logic(value: u8, what: &str) -> Result<CsLogic, String> {
    CsLogic::from_wire(value).ok_or_else(|| format!("Invalid {what} state {value}"))
}

fn optional_cs_logic(value: u8, what: &str) -> Result<Option<CsLogic>, String> {
    if value == CS_NONE {
        Ok(None)
    } else {
        cs_logic(value, what).map(Some)
    }
}

/// Read ROM sets from the blob
pub(crate) fn read_rom_sets(blob: &[u8], header: &LayoutHeader) -> Result<Vec<RomSetInfo>, String> {
    let count = header.set_count as usize;
    let mut rom_sets = Vec::with_capacity(count);

    for ii in 0..count {
        let offset = header.sets_offset + (ii * SET_ENTRY_LEN) as u32;
        let buf = slice_at(blob, offset, SET_ENTRY_LEN, "ROM set header")?;
        let (_, entry) = SetEntry::from_bytes((buf, 0))
            .map_err(|e| format!("Failed to parse ROM set header {ii}: {e}"))?;
        trace!("ROM set {ii}: {entry:?}");

        slice_at(blob, entry.data_offset, entry.size as usize, "ROM set data")?;

        let serve_alg = ServeAlg::from_wire(entry.serve_alg)
            .ok_or_else(|| format!("Invalid serving algorithm {} in set {ii}", entry.serve_alg))?;
        let multi_cs = cs_logic(entry.multi_cs, "multi-image CS")?;
        let roms = read_rom_infos(blob, &entry, ii)?;

        rom_sets.push(RomSetInfo {
            index: ii,
            data_offset: entry.data_offset,
            size: entry.size,
            serve_alg,
            multi_cs,
            roms,
        });
    }

    Ok(rom_sets)
}

// Read ROM info structures
fn read_rom_infos(blob: &[u8], entry: &SetEntry, set: usize) -> Result<Vec<RomInfo>, String> {
    let count = entry.image_count as usize;
    let mut rom_infos = Vec::with_capacity(count);

    for ii in 0..count {
        let offset = entry.images_offset + (ii * IMAGE_INFO_LEN) as u32;
        let buf = slice_at(blob, offset, IMAGE_INFO_LEN, "ROM info")?;
        let (_, info) = ImageInfo::from_bytes((buf, 0))
            .map_err(|e| format!("Failed to parse ROM info {ii} of set {set}: {e}"))?;

        let class = ChipClass::from_wire(info.class)
            .ok_or_else(|| format!("Invalid ROM type {} in set {set}", info.class))?;

        // An unreadable filename isn't worth failing the whole parse over
        let filename = if info.filename_offset != NO_FILENAME {
            read_string_at_offset(blob, info.filename_offset).ok()
        } else {
            None
        };

        rom_infos.push(RomInfo {
            class,
            cs1: cs_logic(info.cs1, "CS1")?,
            cs2: optional_cs_logic(info.cs2, "CS2")?,
            cs3: optional_cs_logic(info.cs3, "CS3")?,
            filename,
        });
    }

    Ok(rom_infos)
}
