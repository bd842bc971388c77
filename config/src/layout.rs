// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Firmware blob layout.
//!
//! The blob is written by the image generator and read in place by the
//! firmware.  All multi-byte fields are little endian and all offsets are
//! relative to the start of the blob.
//!
//! ```text
//! header       LAYOUT_HEADER_LEN bytes
//! sets         SET_ENTRY_LEN bytes per ROM set
//! image infos  IMAGE_INFO_LEN bytes per image, grouped by set
//! filenames    NUL terminated, optional
//! tables       one combined image per set, each 4 byte aligned
//! ```

/// Magic at the start of the blob.
pub const LAYOUT_MAGIC: &[u8; 16] = b"RETROROM_LAYOUT\0";

/// Version of the layout described here.
pub const LAYOUT_VERSION: u32 = 1;

pub const LAYOUT_HEADER_LEN: usize = 32;
pub const SET_ENTRY_LEN: usize = 16;
pub const IMAGE_INFO_LEN: usize = 8;

/// Most ROM sets the header's one byte count can describe.
pub const MAX_ROM_SETS: usize = u8::MAX as usize;

/// Alignment of each combined image within the blob.
pub const TABLE_ALIGN: usize = 4;

/// Filename offset recorded for images without one.
pub const NO_FILENAME: u32 = 0xFFFF_FFFF;

// Header field offsets
pub const HDR_MAGIC: usize = 0;
pub const HDR_VERSION: usize = 16;
pub const HDR_SET_COUNT: usize = 20;
pub const HDR_SETS_OFFSET: usize = 24;
pub const HDR_DATA_OFFSET: usize = 28;

// Set entry field offsets
pub const SET_DATA_OFFSET: usize = 0;
pub const SET_DATA_SIZE: usize = 4;
pub const SET_IMAGES_OFFSET: usize = 8;
pub const SET_IMAGE_COUNT: usize = 12;
pub const SET_SERVE_ALG: usize = 13;
pub const SET_MULTI_CS_STATE: usize = 14;

// Image info field offsets
pub const IMAGE_CLASS: usize = 0;
pub const IMAGE_CS1: usize = 1;
pub const IMAGE_CS2: usize = 2;
pub const IMAGE_CS3: usize = 3;
pub const IMAGE_FILENAME_OFFSET: usize = 4;

/// Combined image size of a single image set.
pub const SINGLE_TABLE_LEN: usize = 16 * 1024;

/// Combined image size of a multi-image set.
pub const MULTI_TABLE_LEN: usize = 64 * 1024;

/// Rounds `len` up to the table alignment.
pub const fn align_table(len: usize) -> usize {
    (len + TABLE_ALIGN - 1) & !(TABLE_ALIGN - 1)
}
