// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Zero-copy reader for the firmware blob.
//!
//! The blob is fully validated by [`Layout::parse`], so the accessors
//! afterwards cannot fail other than by being asked for an index that
//! doesn't exist.

use core::fmt;

use retrorom_config::chip::{ChipClass, CsLine, CsLogic};
use retrorom_config::fw::ServeAlg;
use retrorom_config::layout::{
    HDR_DATA_OFFSET, HDR_MAGIC, HDR_SET_COUNT, HDR_SETS_OFFSET, HDR_VERSION, IMAGE_CLASS,
    IMAGE_CS1, IMAGE_CS2, IMAGE_CS3, IMAGE_FILENAME_OFFSET, IMAGE_INFO_LEN, LAYOUT_HEADER_LEN,
    LAYOUT_MAGIC, LAYOUT_VERSION, MULTI_TABLE_LEN, NO_FILENAME, SET_DATA_OFFSET, SET_DATA_SIZE,
    SET_ENTRY_LEN, SET_IMAGE_COUNT, SET_IMAGES_OFFSET, SET_MULTI_CS_STATE, SET_SERVE_ALG,
    SINGLE_TABLE_LEN,
};

/// Longest filename read from the blob
const MAX_FILENAME_LEN: usize = 256;

// Blob byte for an absent CS2/CS3 line
const CS_NONE: u8 = 0xFF;

/// Problems found in a firmware blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    TooShort { needed: usize, actual: usize },
    BadMagic,
    UnsupportedVersion { version: u32 },
    NoSets,
    OutOfBounds { what: &'static str, offset: usize },
    BadTableSize { set: usize, size: usize },
    BadImageCount { set: usize, count: u8 },
    BadValue { what: &'static str, value: u8 },
    BadFilename { offset: usize },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::TooShort { needed, actual } => {
                write!(f, "Blob too short: need {needed} bytes, have {actual}")
            }
            LayoutError::BadMagic => write!(f, "Blob magic not found"),
            LayoutError::UnsupportedVersion { version } => {
                write!(f, "Unsupported blob version {version}")
            }
            LayoutError::NoSets => write!(f, "Blob contains no ROM sets"),
            LayoutError::OutOfBounds { what, offset } => {
                write!(f, "{what} at {offset:#x} is outside the blob")
            }
            LayoutError::BadTableSize { set, size } => {
                write!(f, "Set {set} table size {size} invalid")
            }
            LayoutError::BadImageCount { set, count } => {
                write!(f, "Set {set} image count {count} invalid")
            }
            LayoutError::BadValue { what, value } => write!(f, "Invalid {what} {value:#04x}"),
            LayoutError::BadFilename { offset } => write!(f, "Invalid filename at {offset:#x}"),
        }
    }
}

impl core::error::Error for LayoutError {}

type Result<T> = core::result::Result<T, LayoutError>;

/// A validated firmware blob.
#[derive(Debug, Clone, Copy)]
pub struct Layout<'a> {
    blob: &'a [u8],
    set_count: usize,
    sets_offset: usize,
}

impl<'a> Layout<'a> {
    /// Validates `blob` and everything it describes.
    pub fn parse(blob: &'a [u8]) -> Result<Self> {
        if blob.len() < LAYOUT_HEADER_LEN {
            return Err(LayoutError::TooShort {
                needed: LAYOUT_HEADER_LEN,
                actual: blob.len(),
            });
        }
        if &blob[HDR_MAGIC..HDR_MAGIC + LAYOUT_MAGIC.len()] != LAYOUT_MAGIC {
            return Err(LayoutError::BadMagic);
        }
        let version = read_u32(blob, HDR_VERSION)?;
        if version != LAYOUT_VERSION {
            return Err(LayoutError::UnsupportedVersion { version });
        }

        let set_count = blob[HDR_SET_COUNT] as usize;
        if set_count == 0 {
            return Err(LayoutError::NoSets);
        }
        let sets_offset = read_u32(blob, HDR_SETS_OFFSET)? as usize;
        region(blob, sets_offset, set_count * SET_ENTRY_LEN, "Set table")?;
        let data_offset = read_u32(blob, HDR_DATA_OFFSET)? as usize;
        if data_offset > blob.len() {
            return Err(LayoutError::OutOfBounds {
                what: "Data",
                offset: data_offset,
            });
        }

        let layout = Self {
            blob,
            set_count,
            sets_offset,
        };
        for index in 0..set_count {
            let set = layout.decode_set(index)?;
            for image in 0..set.image_count() {
                set.decode_image(image)?;
            }
        }

        Ok(layout)
    }

    pub fn set_count(&self) -> usize {
        self.set_count
    }

    /// The set at `index`, if there is one.
    pub fn set(&self, index: usize) -> Option<SetDesc<'a>> {
        if index >= self.set_count {
            return None;
        }
        self.decode_set(index).ok()
    }

    pub fn sets(&self) -> impl Iterator<Item = SetDesc<'a>> + '_ {
        (0..self.set_count).filter_map(|index| self.set(index))
    }

    fn decode_set(&self, index: usize) -> Result<SetDesc<'a>> {
        let blob = self.blob;
        let entry = self.sets_offset + index * SET_ENTRY_LEN;

        let data_offset = read_u32(blob, entry + SET_DATA_OFFSET)? as usize;
        let size = read_u32(blob, entry + SET_DATA_SIZE)? as usize;
        let images_offset = read_u32(blob, entry + SET_IMAGES_OFFSET)? as usize;
        let image_count = blob[entry + SET_IMAGE_COUNT];

        let expected = match image_count {
            1 => SINGLE_TABLE_LEN,
            2 | 3 => MULTI_TABLE_LEN,
            count => return Err(LayoutError::BadImageCount { set: index, count }),
        };
        if size != expected {
            return Err(LayoutError::BadTableSize { set: index, size });
        }

        let table = region(blob, data_offset, size, "Table")?;
        let images = region(
            blob,
            images_offset,
            image_count as usize * IMAGE_INFO_LEN,
            "Image infos",
        )?;

        let serve_alg = blob[entry + SET_SERVE_ALG];
        let serve_alg = ServeAlg::from_wire(serve_alg).ok_or(LayoutError::BadValue {
            what: "serving algorithm",
            value: serve_alg,
        })?;
        let multi_cs = cs_logic(blob[entry + SET_MULTI_CS_STATE])?;

        Ok(SetDesc {
            index,
            blob,
            table,
            images,
            image_count,
            serve_alg,
            multi_cs,
        })
    }
}

/// One ROM set within the blob.
#[derive(Debug, Clone, Copy)]
pub struct SetDesc<'a> {
    index: usize,
    blob: &'a [u8],
    table: &'a [u8],
    images: &'a [u8],
    image_count: u8,
    serve_alg: ServeAlg,
    multi_cs: CsLogic,
}

impl<'a> SetDesc<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The combined image, as stored in the blob.
    pub fn table(&self) -> &'a [u8] {
        self.table
    }

    pub fn image_count(&self) -> usize {
        self.image_count as usize
    }

    /// Serving algorithm recorded by the generator, before any correction.
    pub fn serve_alg(&self) -> ServeAlg {
        self.serve_alg
    }

    /// CS1 logic shared by a multi-image set.  [`CsLogic::Ignore`] for
    /// single image sets.
    pub fn multi_cs(&self) -> CsLogic {
        self.multi_cs
    }

    pub fn image(&self, index: usize) -> Option<ImageDesc<'a>> {
        if index >= self.image_count() {
            return None;
        }
        self.decode_image(index).ok()
    }

    pub fn images(&self) -> impl Iterator<Item = ImageDesc<'a>> + '_ {
        (0..self.image_count()).filter_map(|index| self.image(index))
    }

    fn decode_image(&self, index: usize) -> Result<ImageDesc<'a>> {
        let info = &self.images[index * IMAGE_INFO_LEN..(index + 1) * IMAGE_INFO_LEN];

        let class = ChipClass::from_wire(info[IMAGE_CLASS]).ok_or(LayoutError::BadValue {
            what: "ROM class",
            value: info[IMAGE_CLASS],
        })?;
        let cs1 = cs_logic(info[IMAGE_CS1])?;
        let cs2 = optional_cs_logic(info[IMAGE_CS2])?;
        let cs3 = optional_cs_logic(info[IMAGE_CS3])?;

        let filename = match read_u32(info, IMAGE_FILENAME_OFFSET)? {
            NO_FILENAME => None,
            offset => Some(read_str(self.blob, offset as usize)?),
        };

        Ok(ImageDesc {
            class,
            cs1,
            cs2,
            cs3,
            filename,
        })
    }
}

/// One ROM image within a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc<'a> {
    pub class: ChipClass,
    pub cs1: CsLogic,
    pub cs2: Option<CsLogic>,
    pub cs3: Option<CsLogic>,
    pub filename: Option<&'a str>,
}

impl ImageDesc<'_> {
    pub fn cs(&self, line: CsLine) -> Option<CsLogic> {
        match line {
            CsLine::Cs1 => Some(self.cs1),
            CsLine::Cs2 => self.cs2,
            CsLine::Cs3 => self.cs3,
        }
    }
}

fn cs_logic(value: u8) -> Result<CsLogic> {
    CsLogic::from_wire(value).ok_or(LayoutError::BadValue {
        what: "CS logic",
        value,
    })
}

fn optional_cs_logic(value: u8) -> Result<Option<CsLogic>> {
    match value {
        CS_NONE => Ok(None),
        value => cs_logic(value).map(Some),
    }
}

// Offsets come straight from the blob, so the end may not be representable
fn region<'a>(blob: &'a [u8], offset: usize, len: usize, what: &'static str) -> Result<&'a [u8]> {
    offset
        .checked_add(len)
        .and_then(|end| blob.get(offset..end))
        .ok_or(LayoutError::OutOfBounds { what, offset })
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let bytes = region(buf, offset, 4, "Field")?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_str(blob: &[u8], offset: usize) -> Result<&str> {
    let tail = blob.get(offset..).ok_or(LayoutError::OutOfBounds {
        what: "Filename",
        offset,
    })?;
    let tail = &tail[..tail.len().min(MAX_FILENAME_LEN)];
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(LayoutError::BadFilename { offset })?;
    core::str::from_utf8(&tail[..len]).map_err(|_| LayoutError::BadFilename { offset })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single 2364 set, filename "a.bin", 16KB table of 0x5A
    fn blob() -> Vec<u8> {
        let names = LAYOUT_HEADER_LEN + SET_ENTRY_LEN + IMAGE_INFO_LEN;
        let data = names + 8;
        let mut blob = vec![0xFF; data + SINGLE_TABLE_LEN];

        blob[..16].copy_from_slice(LAYOUT_MAGIC);
        blob[16..20].copy_from_slice(&1u32.to_le_bytes());
        blob[20] = 1;
        blob[24..28].copy_from_slice(&(LAYOUT_HEADER_LEN as u32).to_le_bytes());
        blob[28..32].copy_from_slice(&(data as u32).to_le_bytes());

        let set = LAYOUT_HEADER_LEN;
        blob[set..set + 4].copy_from_slice(&(data as u32).to_le_bytes());
        blob[set + 4..set + 8].copy_from_slice(&(SINGLE_TABLE_LEN as u32).to_le_bytes());
        blob[set + 8..set + 12].copy_from_slice(&((set + SET_ENTRY_LEN) as u32).to_le_bytes());
        blob[set + 12] = 1;
        blob[set + 13] = 1;
        blob[set + 14] = 2;

        let image = set + SET_ENTRY_LEN;
        blob[image..image + 4].copy_from_slice(&[2, 0, 0xFF, 0xFF]);
        blob[image + 4..image + 8].copy_from_slice(&(names as u32).to_le_bytes());
        blob[names..names + 6].copy_from_slice(b"a.bin\0");

        blob[data..].fill(0x5A);
        blob
    }

    #[test]
    fn parses_valid_blob() {
        let blob = blob();
        let layout = Layout::parse(&blob).unwrap();
        assert_eq!(layout.set_count(), 1);

        let set = layout.set(0).unwrap();
        assert_eq!(set.image_count(), 1);
        assert_eq!(set.serve_alg(), ServeAlg::AddrOnCs);
        assert_eq!(set.multi_cs(), CsLogic::Ignore);
        assert_eq!(set.table().len(), SINGLE_TABLE_LEN);
        assert!(set.table().iter().all(|&b| b == 0x5A));

        let image = set.image(0).unwrap();
        assert_eq!(image.class, ChipClass::Chip2364);
        assert_eq!(image.cs1, CsLogic::ActiveLow);
        assert_eq!(image.cs2, None);
        assert_eq!(image.filename, Some("a.bin"));

        assert!(layout.set(1).is_none());
        assert!(set.image(1).is_none());
    }

    #[test]
    fn rejects_bad_headers() {
        assert!(matches!(
            Layout::parse(&[0u8; 8]),
            Err(LayoutError::TooShort { needed: 32, actual: 8 })
        ));

        let mut bad = blob();
        bad[0] = b'X';
        assert_eq!(Layout::parse(&bad).unwrap_err(), LayoutError::BadMagic);

        let mut bad = blob();
        bad[16] = 9;
        assert_eq!(
            Layout::parse(&bad).unwrap_err(),
            LayoutError::UnsupportedVersion { version: 9 }
        );

        let mut bad = blob();
        bad[20] = 0;
        assert_eq!(Layout::parse(&bad).unwrap_err(), LayoutError::NoSets);

        let mut bad = blob();
        bad[24..28].copy_from_slice(&(u32::MAX - 4).to_le_bytes());
        assert_eq!(
            Layout::parse(&bad).unwrap_err(),
            LayoutError::OutOfBounds {
                what: "Set table",
                offset: (u32::MAX - 4) as usize,
            }
        );
    }

    #[test]
    fn rejects_bad_sets() {
        let mut bad = blob();
        bad[LAYOUT_HEADER_LEN + 12] = 4;
        assert_eq!(
            Layout::parse(&bad).unwrap_err(),
            LayoutError::BadImageCount { set: 0, count: 4 }
        );

        let mut bad = blob();
        bad[LAYOUT_HEADER_LEN + 13] = 7;
        assert!(matches!(
            Layout::parse(&bad),
            Err(LayoutError::BadValue { value: 7, .. })
        ));

        let mut bad = blob();
        let len = bad.len();
        bad.truncate(len - 1);
        assert!(matches!(
            Layout::parse(&bad),
            Err(LayoutError::OutOfBounds { what: "Table", .. })
        ));

        let mut bad = blob();
        bad[LAYOUT_HEADER_LEN..LAYOUT_HEADER_LEN + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            Layout::parse(&bad),
            Err(LayoutError::OutOfBounds { what: "Table", .. })
        ));

        // Filename never terminated
        let mut bad = blob();
        let names = LAYOUT_HEADER_LEN + SET_ENTRY_LEN + IMAGE_INFO_LEN;
        bad[names..].fill(b'x');
        assert!(matches!(
            Layout::parse(&bad),
            Err(LayoutError::BadFilename { .. })
        ));
    }
}
