// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Firmware blob generator for retrorom.
//!
//! Lays out the ROM sets as described in [`retrorom_config::layout`]: a
//! header, one entry per set, one entry per image, optional filenames and
//! finally the combined images themselves.

use alloc::vec::Vec;

use retrorom_config::fw::ServeAlg;
use retrorom_config::hw::PinMapping;
use retrorom_config::layout::{
    HDR_DATA_OFFSET, HDR_MAGIC, HDR_SET_COUNT, HDR_SETS_OFFSET, HDR_VERSION, IMAGE_CLASS,
    IMAGE_CS1, IMAGE_CS2, IMAGE_CS3, IMAGE_FILENAME_OFFSET, IMAGE_INFO_LEN, LAYOUT_HEADER_LEN,
    LAYOUT_MAGIC, LAYOUT_VERSION, NO_FILENAME, SET_DATA_OFFSET, SET_DATA_SIZE, SET_ENTRY_LEN,
    MAX_ROM_SETS, SET_IMAGE_COUNT, SET_IMAGES_OFFSET, SET_MULTI_CS_STATE, SET_SERVE_ALG,
    align_table,
};

use crate::image::RomSet;
use crate::{Error, Result};

/// Value of padding bytes - erased flash
pub const PAD_METADATA_BYTE: u8 = 0xFF;

/// Where a set's combined image lives within the blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetLayout {
    pub id: usize,
    pub data_offset: usize,
    pub data_size: usize,
    pub image_count: usize,
    pub serve_alg: ServeAlg,
}

/// Firmware blob for a group of ROM sets
#[derive(Debug)]
pub struct Metadata {
    mapping: PinMapping,
    rom_sets: Vec<RomSet>,
    filenames: bool,
}

impl Metadata {
    pub fn new(mapping: PinMapping, rom_sets: Vec<RomSet>, filenames: bool) -> Self {
        Self {
            mapping,
            rom_sets,
            filenames,
        }
    }

    pub fn rom_sets(&self) -> &[RomSet] {
        &self.rom_sets
    }

    fn total_image_count(&self) -> usize {
        self.rom_sets.iter().map(|set| set.image_count()).sum()
    }

    fn sets_offset(&self) -> usize {
        LAYOUT_HEADER_LEN
    }

    fn images_offset(&self) -> usize {
        self.sets_offset() + self.rom_sets.len() * SET_ENTRY_LEN
    }

    fn filenames_offset(&self) -> usize {
        self.images_offset() + self.total_image_count() * IMAGE_INFO_LEN
    }

    // Each filename is NUL terminated
    fn filenames_len(&self) -> usize {
        if !self.filenames {
            return 0;
        }
        self.rom_sets
            .iter()
            .flat_map(|set| set.images())
            .map(|image| image.filename().len() + 1)
            .sum()
    }

    /// Offset of the first combined image.
    pub fn data_offset(&self) -> usize {
        align_table(self.filenames_offset() + self.filenames_len())
    }

    /// Where each set's combined image is placed.
    pub fn set_layouts(&self) -> Vec<SetLayout> {
        let mut offset = self.data_offset();
        self.rom_sets
            .iter()
            .map(|set| {
                let layout = SetLayout {
                    id: set.id,
                    data_offset: offset,
                    data_size: set.table_len(),
                    image_count: set.image_count(),
                    serve_alg: set.serve_alg,
                };
                offset += align_table(set.table_len());
                layout
            })
            .collect()
    }

    /// Total length of the blob.
    pub fn len(&self) -> usize {
        self.data_offset()
            + self
                .rom_sets
                .iter()
                .map(|set| align_table(set.table_len()))
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.rom_sets.is_empty()
    }

    /// Writes the whole blob to `buf`, returning the number of bytes
    /// written.
    pub fn write_all(&self, buf: &mut [u8]) -> Result<usize> {
        if self.rom_sets.len() > MAX_ROM_SETS {
            return Err(Error::TooManySets {
                count: self.rom_sets.len(),
                max: MAX_ROM_SETS,
            });
        }

        let len = self.len();
        if buf.len() < len {
            return Err(Error::BufferTooSmall {
                location: "Metadata::write_all",
                expected: len,
                actual: buf.len(),
            });
        }
        let buf = &mut buf[..len];
        buf.fill(PAD_METADATA_BYTE);

        let layouts = self.set_layouts();
        self.write_header(buf);
        self.write_sets(buf, &layouts)?;

        for (set, layout) in self.rom_sets.iter().zip(layouts.iter()) {
            let image = set.encode(&self.mapping)?;
            buf[layout.data_offset..layout.data_offset + image.len()]
                .copy_from_slice(image.as_bytes());
        }

        Ok(len)
    }

    fn write_header(&self, buf: &mut [u8]) {
        buf[HDR_MAGIC..HDR_MAGIC + LAYOUT_MAGIC.len()].copy_from_slice(LAYOUT_MAGIC);
        put_u32(buf, HDR_VERSION, LAYOUT_VERSION);
        buf[HDR_SET_COUNT] = self.rom_sets.len() as u8;
        put_u32(buf, HDR_SETS_OFFSET, self.sets_offset() as u32);
        put_u32(buf, HDR_DATA_OFFSET, self.data_offset() as u32);
    }

    fn write_sets(&self, buf: &mut [u8], layouts: &[SetLayout]) -> Result<()> {
        let mut image_offset = self.images_offset();
        let mut filename_offset = self.filenames_offset();

        for (ii, (set, layout)) in self.rom_sets.iter().zip(layouts).enumerate() {
            let entry = self.sets_offset() + ii * SET_ENTRY_LEN;
            put_u32(buf, entry + SET_DATA_OFFSET, layout.data_offset as u32);
            put_u32(buf, entry + SET_DATA_SIZE, layout.data_size as u32);
            put_u32(buf, entry + SET_IMAGES_OFFSET, image_offset as u32);
            buf[entry + SET_IMAGE_COUNT] = set.image_count() as u8;
            buf[entry + SET_SERVE_ALG] = set.serve_alg.wire_value();
            buf[entry + SET_MULTI_CS_STATE] = set.multi_cs_logic()?.wire_value();

            for image in set.images() {
                let cs = image.cs_config();
                buf[image_offset + IMAGE_CLASS] = image.class().wire_value();
                buf[image_offset + IMAGE_CS1] = cs.cs1.wire_value();
                buf[image_offset + IMAGE_CS2] = cs.cs2.map_or(PAD_METADATA_BYTE, |l| l.wire_value());
                buf[image_offset + IMAGE_CS3] = cs.cs3.map_or(PAD_METADATA_BYTE, |l| l.wire_value());

                let name_ptr = if self.filenames {
                    let name = image.filename().as_bytes();
                    buf[filename_offset..filename_offset + name.len()].copy_from_slice(name);
                    buf[filename_offset + name.len()] = 0;
                    let ptr = filename_offset as u32;
                    filename_offset += name.len() + 1;
                    ptr
                } else {
                    NO_FILENAME
                };
                put_u32(buf, image_offset + IMAGE_FILENAME_OFFSET, name_ptr);

                image_offset += IMAGE_INFO_LEN;
            }
        }

        Ok(())
    }
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
