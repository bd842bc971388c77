// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Image codec for retrorom
//!
//! Turns logical ROM images into the combined image the firmware serves
//! from.
//!
//! Create one or more [`RomImage`] instances, and group them into a
//! [`RomSet`].  Then use [`encode()`] with the hardware's
//! [`PinMapping`] to produce the [`CombinedImage`].  The combined image is
//! indexed by the raw value of the address/chip select port, so the
//! firmware does no bit manipulation when serving: it reads the port, masks
//! it, looks the byte up and writes it straight to the data port.
//!
//! [`decode()`] is the inverse of the data permutation, for checking what
//! the host will see for any stored byte.

use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

use retrorom_config::chip::{ChipClass, CsLine, CsLogic};
use retrorom_config::fw::ServeAlg;
use retrorom_config::hw::PinMapping;
use retrorom_config::layout::{MULTI_TABLE_LEN, SINGLE_TABLE_LEN};

use crate::{Error, Result};

/// Value to use when told to pad a ROM image
pub const PAD_BLANK_BYTE: u8 = 0xAA;

/// Value to use when no ROM in a multi-image set is selected
pub const PAD_NO_CHIP_BYTE: u8 = 0xAA;

/// Maximum number of images in a set, one per select line
pub const MAX_SET_IMAGES: usize = 3;

/// How to handle ROM images that are smaller than their class
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeHandling {
    /// No special handling.  Errors if the image size does not exactly match
    /// the ROM size.
    #[default]
    None,

    /// Duplicates the image as many times as needed to fill the ROM.  Errors
    /// if the image size is not an exact divisor of the ROM size.
    Duplicate,

    /// Pads the image out with [`PAD_BLANK_BYTE`].
    Pad,
}

/// Chip select configuration of a ROM image
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CsConfig {
    /// CS1 is always required
    pub cs1: CsLogic,

    /// Second chip select line, required for 2316 and 2332 single images
    pub cs2: Option<CsLogic>,

    /// Third chip select line, required for 2316 single images
    pub cs3: Option<CsLogic>,
}

impl CsConfig {
    pub fn new(cs1: CsLogic, cs2: Option<CsLogic>, cs3: Option<CsLogic>) -> Self {
        Self { cs1, cs2, cs3 }
    }

    pub fn logic(&self, line: CsLine) -> Option<CsLogic> {
        match line {
            CsLine::Cs1 => Some(self.cs1),
            CsLine::Cs2 => self.cs2,
            CsLine::Cs3 => self.cs3,
        }
    }
}

/// A logical ROM image, expanded to the full size of its class.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RomImage {
    index: usize,

    filename: String,

    // Optional alternative label for the ROM, replacing filename
    label: Option<String>,

    class: ChipClass,

    cs_config: CsConfig,

    data: Vec<u8>,
}

impl RomImage {
    /// Returns a [`RomImage`] instance.
    ///
    /// Takes a raw ROM image (binary data, loaded from file) and processes it
    /// according to the specified size handling to ensure it matches the
    /// size of the given ROM class.  An image which already matches is
    /// accepted whatever the size handling.
    pub fn from_raw_rom_image(
        index: usize,
        filename: String,
        label: Option<String>,
        source: &[u8],
        class: ChipClass,
        cs_config: CsConfig,
        size_handling: SizeHandling,
    ) -> Result<Self> {
        let expected_size = class.size_bytes();
        let mut data = Vec::with_capacity(expected_size);

        match source.len().cmp(&expected_size) {
            Ordering::Equal => data.extend_from_slice(source),
            Ordering::Greater => {
                return Err(Error::ImageTooLarge {
                    index,
                    image_size: source.len(),
                    expected_size,
                });
            }
            Ordering::Less => match size_handling {
                SizeHandling::None => {
                    return Err(Error::ImageTooSmall {
                        index,
                        expected: expected_size,
                        actual: source.len(),
                    });
                }
                SizeHandling::Duplicate => {
                    if source.is_empty() || expected_size % source.len() != 0 {
                        return Err(Error::DuplicationNotExactDivisor {
                            index,
                            image_size: source.len(),
                            expected_size,
                        });
                    }
                    while data.len() < expected_size {
                        data.extend_from_slice(source);
                    }
                }
                SizeHandling::Pad => {
                    data.extend_from_slice(source);
                    data.resize(expected_size, PAD_BLANK_BYTE);
                }
            },
        }

        Ok(Self {
            index,
            filename,
            label,
            class,
            cs_config,
            data,
        })
    }

    /// Returns the index of the ROM in the configuration
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the ROM filename to use in metadata.  Uses label if specified,
    /// otherwise the actual filename string.
    pub fn filename(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.filename)
    }

    pub fn class(&self) -> ChipClass {
        self.class
    }

    pub fn cs_config(&self) -> &CsConfig {
        &self.cs_config
    }

    /// The image after size handling, exactly the size of its class.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte at a logical address.  Addresses beyond the class size mirror.
    pub fn byte(&self, addr: usize) -> u8 {
        self.data[addr % self.data.len()]
    }
}

/// Type of ROM set
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RomSetType {
    /// Single ROM - the default
    #[default]
    Single,

    /// Up to 3 ROMs sharing the address and data bus, each selected by its
    /// own chip select line
    Multi,
}

/// A set of ROMs served together
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RomSet {
    /// ID of the ROM set
    pub id: usize,

    pub set_type: RomSetType,

    /// Serving algorithm for the set, corrected for multi-image sets
    pub serve_alg: ServeAlg,

    images: Vec<RomImage>,
}

impl RomSet {
    /// Creates a new ROM set of the specified ID and type, containing the
    /// given images.
    ///
    /// The position of each image within `images` determines the select
    /// line which selects it: CS1, then X1, then X2.
    pub fn new(
        id: usize,
        set_type: RomSetType,
        serve_alg: ServeAlg,
        images: Vec<RomImage>,
    ) -> Result<Self> {
        if images.is_empty() {
            return Err(Error::NoImages);
        }
        if images.len() > MAX_SET_IMAGES {
            return Err(Error::TooManyImages {
                expected: MAX_SET_IMAGES,
                actual: images.len(),
            });
        }
        let count_ok = match set_type {
            RomSetType::Single => images.len() == 1,
            RomSetType::Multi => images.len() > 1,
        };
        if !count_ok {
            return Err(Error::WrongImageCount {
                set_type,
                actual: images.len(),
            });
        }

        // Multi sets only work with the any CS algorithm, so correct them.
        // Single sets must not ask for it.
        let serve_alg = match set_type {
            RomSetType::Single => {
                if serve_alg == ServeAlg::AddrOnAnyCs {
                    return Err(Error::InvalidServeAlg { serve_alg });
                }
                serve_alg
            }
            RomSetType::Multi => ServeAlg::AddrOnAnyCs,
        };

        let set = Self {
            id,
            set_type,
            serve_alg,
            images,
        };
        set.check_cs_config()?;

        Ok(set)
    }

    // Single images must configure every chip select their class has.
    // Multi-image sets share CS1 logic and must ignore CS2/CS3.
    fn check_cs_config(&self) -> Result<()> {
        match self.set_type {
            RomSetType::Single => {
                let image = &self.images[0];
                if image.cs_config.cs1 == CsLogic::Ignore {
                    return Err(Error::MissingCsConfig {
                        index: image.index,
                        line: CsLine::Cs1,
                    });
                }
                for &line in image.class.cs_lines() {
                    if image.cs_config.logic(line).is_none() {
                        return Err(Error::MissingCsConfig {
                            index: image.index,
                            line,
                        });
                    }
                }
                Ok(())
            }
            RomSetType::Multi => self.multi_cs_logic().map(|_| ()),
        }
    }

    /// Returns the CS1 logic shared by all images of a multi-image set, or
    /// [`CsLogic::Ignore`] for a single image set.
    pub fn multi_cs_logic(&self) -> Result<CsLogic> {
        if self.images.len() == 1 {
            return Ok(CsLogic::Ignore);
        }

        let first = self.images[0].cs_config.cs1;
        for image in &self.images {
            let cs = &image.cs_config;
            if cs.cs1 != first || cs.cs1 == CsLogic::Ignore {
                return Err(Error::InconsistentCsLogic {
                    first,
                    other: cs.cs1,
                });
            }
            for other in [cs.cs2, cs.cs3].into_iter().flatten() {
                if other != CsLogic::Ignore {
                    return Err(Error::InconsistentCsLogic {
                        first: CsLogic::Ignore,
                        other,
                    });
                }
            }
        }

        Ok(first)
    }

    /// Returns a slice of the images in this set.
    pub fn images(&self) -> &[RomImage] {
        &self.images
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Size of this set's combined image, in bytes.
    pub fn table_len(&self) -> usize {
        match self.set_type {
            RomSetType::Single => SINGLE_TABLE_LEN,
            RomSetType::Multi => MULTI_TABLE_LEN,
        }
    }

    /// Checks `mapping` can serve this set.
    pub fn check_mapping(&self, mapping: &PinMapping) -> Result<()> {
        mapping.validate()?;

        if self.images.len() > mapping.max_set_images() {
            return Err(Error::UnsupportedMapping {
                class: self.images[mapping.max_set_images()].class,
                reason: "no select line for this position in the set",
            });
        }

        Ok(())
    }

    // Select line pins of each position in a multi-image set.
    fn select_pins(&self, mapping: &PinMapping) -> [Option<u8>; MAX_SET_IMAGES] {
        let mut pins = [None; MAX_SET_IMAGES];
        for (position, image) in self.images.iter().enumerate() {
            pins[position] = mapping.select_pin(image.class, position);
        }
        pins
    }

    /// Gets a byte from the ROM set at the given physical index - the raw
    /// port value, as far as the MCU is concerned - and returns the byte,
    /// ready for the MCU to serve.
    ///
    /// For multi-image sets the earliest image whose select line is
    /// asserted wins, so CS1 takes precedence over X1, and X1 over X2.
    pub fn get_byte(&self, phys: usize, mapping: &PinMapping) -> u8 {
        let phys = phys as u32;

        let image = match self.set_type {
            // Chip select lines are tested by the firmware, so don't matter
            // here
            RomSetType::Single => Some(&self.images[0]),
            RomSetType::Multi => {
                let logic = self.images[0].cs_config.cs1;
                self.images
                    .iter()
                    .zip(self.select_pins(mapping))
                    .find_map(|(image, pin)| {
                        let pin = pin?;
                        logic.is_active(phys & (1 << pin) != 0).then_some(image)
                    })
            }
        };

        match image {
            Some(image) => {
                let addr = mapping.gather_addr(phys, image.class);
                mapping.encode_data(image.byte(addr))
            }
            None => mapping.encode_data(PAD_NO_CHIP_BYTE),
        }
    }

    /// Canonical physical index of logical address `addr` of the image at
    /// `position`: chip select lines asserted, other select lines
    /// deasserted, every don't care bit clear.
    pub fn physical_index(&self, position: usize, addr: usize, mapping: &PinMapping) -> usize {
        let image = &self.images[position];
        let mut phys = mapping.scatter_addr(addr, image.class);

        match self.set_type {
            RomSetType::Single => {
                for &line in image.class.cs_lines() {
                    let level = image.cs_config.logic(line).and_then(|l| l.active_level());
                    if let (Some(true), Some(pin)) = (level, mapping.cs_pin(line, image.class)) {
                        phys |= 1 << pin;
                    }
                }
            }
            RomSetType::Multi => {
                let logic = image.cs_config.cs1;
                for (other, pin) in self.select_pins(mapping).into_iter().enumerate() {
                    let Some(pin) = pin else { continue };
                    let high = if other == position {
                        logic == CsLogic::ActiveHigh
                    } else {
                        logic == CsLogic::ActiveLow
                    };
                    if high {
                        phys |= 1 << pin;
                    }
                }
            }
        }

        phys as usize
    }

    /// Port bits which have no effect on the byte served for the image at
    /// `position`, while it is selected.
    pub fn dont_care_mask(&self, position: usize, mapping: &PinMapping) -> u32 {
        let image = &self.images[position];
        let table_mask = (self.table_len() - 1) as u32;
        let mut relevant = mapping.addr_mask(image.class);

        // Select lines of higher priority images must stay deasserted
        if self.set_type == RomSetType::Multi {
            for pin in self.select_pins(mapping)[..=position].iter().flatten() {
                relevant |= 1 << pin;
            }
        }

        table_mask & !relevant
    }

    /// Builds the combined image for this set.
    pub fn encode(&self, mapping: &PinMapping) -> Result<CombinedImage> {
        self.check_mapping(mapping)?;

        let data = (0..self.table_len())
            .map(|phys| self.get_byte(phys, mapping))
            .collect();

        Ok(CombinedImage { data })
    }
}

impl fmt::Display for RomSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Set {}: ", self.id)?;
        for (ii, image) in self.images.iter().enumerate() {
            if ii > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} ({}, CS1 {})", image.filename(), image.class, image.cs_config.cs1)?;
        }
        write!(f, " - {}", self.serve_alg)
    }
}

/// The flat lookup table served at runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedImage {
    data: Vec<u8>,
}

impl CombinedImage {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Byte served for a raw port value.  Bits above the table size are
    /// masked off, as the firmware does.
    pub fn byte(&self, raw: u32) -> u8 {
        self.data[raw as usize & (self.data.len() - 1)]
    }
}

/// Encodes a ROM set, with its images' chip select logic, into the combined
/// image for `mapping`.
pub fn encode(set: &RomSet, mapping: &PinMapping) -> Result<CombinedImage> {
    set.encode(mapping)
}

/// Recovers the logical byte from a byte as stored in a combined image.
pub fn decode(physical_byte: u8, mapping: &PinMapping) -> u8 {
    mapping.decode_data(physical_byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn image(source: &[u8], class: ChipClass, handling: SizeHandling) -> Result<RomImage> {
        RomImage::from_raw_rom_image(
            0,
            "test.bin".to_string(),
            None,
            source,
            class,
            CsConfig::new(CsLogic::ActiveLow, None, None),
            handling,
        )
    }

    #[test]
    fn duplicate_fills_class() {
        let source: Vec<u8> = (0..=255).collect();
        let image = image(&source, ChipClass::Chip2316, SizeHandling::Duplicate).unwrap();
        assert_eq!(image.data().len(), 2048);
        assert_eq!(image.byte(0x100), 0);
        assert_eq!(image.byte(0x7FF), 255);
    }

    #[test]
    fn pad_uses_blank_byte() {
        let image = image(&[1, 2, 3], ChipClass::Chip2316, SizeHandling::Pad).unwrap();
        assert_eq!(&image.data()[..4], &[1, 2, 3, PAD_BLANK_BYTE]);
        assert!(image.data()[3..].iter().all(|&b| b == PAD_BLANK_BYTE));
    }

    #[test]
    fn size_errors() {
        assert_eq!(
            image(&[0; 3000], ChipClass::Chip2364, SizeHandling::Duplicate).unwrap_err(),
            Error::DuplicationNotExactDivisor {
                index: 0,
                image_size: 3000,
                expected_size: 8192
            }
        );
        assert!(matches!(
            image(&[0; 4096], ChipClass::Chip2316, SizeHandling::Pad),
            Err(Error::ImageTooLarge { .. })
        ));
        assert!(matches!(
            image(&[0; 1024], ChipClass::Chip2316, SizeHandling::None),
            Err(Error::ImageTooSmall { .. })
        ));
        assert!(image(&vec![0; 8192], ChipClass::Chip2364, SizeHandling::Pad).is_ok());
    }
}
