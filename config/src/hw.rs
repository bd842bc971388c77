// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Hardware pin mappings.
//!
//! A [`PinMapping`] describes which physical GPIO carries each logical
//! address, data, chip select and selector jumper line.  Address and chip
//! select lines share one port, so a single read of that port's input
//! register captures the whole bus state - the value the combined image is
//! indexed by.
//!
//! The permutations between logical and physical values live here so the
//! image codec and the serving engine share one implementation.

use core::fmt;

use crate::chip::{ChipClass, CsLine};

/// Number of address lines on the largest supported ROM class.
pub const MAX_ADDR_LINES: usize = 13;

/// Number of data lines.
pub const NUM_DATA_LINES: usize = 8;

/// Maximum number of image select jumpers.
pub const MAX_SEL_PINS: usize = 4;

/// Port bits indexing a single image table.  All address and chip select
/// pins must be below this.
pub const SINGLE_TABLE_BITS: u32 = 14;

/// Port bits indexing a multi-image table.
pub const MULTI_TABLE_BITS: u32 = 16;

/// Highest valid pin number on a port.
pub const MAX_PORT_PIN: u8 = 15;

/// GPIO port.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Port {
    #[default]
    A,
    B,
    C,
    D,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Port::A => "PA",
            Port::B => "PB",
            Port::C => "PC",
            Port::D => "PD",
        };
        write!(f, "{s}")
    }
}

/// Direction selector jumpers are pulled by the MCU.  A fitted jumper
/// connects the pin to the opposite rail.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JumperPull {
    /// Pulled low, a fitted jumper reads high
    #[default]
    Down,

    /// Pulled high, a fitted jumper reads low
    Up,
}

impl JumperPull {
    /// Port level of a pin with its jumper fitted.
    pub const fn asserted_level(&self) -> bool {
        matches!(self, JumperPull::Down)
    }
}

/// Ports each group of lines lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Ports {
    pub data: Port,
    pub addr: Port,
    pub cs: Port,
    pub sel: Port,
    pub status: Port,
}

/// A pin which differs per ROM class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClassPins {
    #[serde(rename = "2316", default)]
    pub chip_2316: Option<u8>,
    #[serde(rename = "2332", default)]
    pub chip_2332: Option<u8>,
    #[serde(rename = "2364", default)]
    pub chip_2364: Option<u8>,
}

impl ClassPins {
    pub const NONE: ClassPins = ClassPins {
        chip_2316: None,
        chip_2332: None,
        chip_2364: None,
    };

    pub const fn get(&self, class: ChipClass) -> Option<u8> {
        match class {
            ChipClass::Chip2316 => self.chip_2316,
            ChipClass::Chip2332 => self.chip_2332,
            ChipClass::Chip2364 => self.chip_2364,
        }
    }
}

/// Maps logical lines to physical pins for one hardware revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PinMapping {
    pub ports: Ports,

    /// Address line A`n` is at `addr[n]` on the address port.  Pins used
    /// as chip selects by smaller classes double as upper address lines.
    pub addr: [Option<u8>; MAX_ADDR_LINES],

    /// Data line D`n` is at `data[n]` on the data port.
    pub data: [u8; NUM_DATA_LINES],

    pub cs1: ClassPins,
    #[serde(default)]
    pub cs2: ClassPins,
    #[serde(default)]
    pub cs3: ClassPins,

    /// Select line for the second image of a multi-image set.
    #[serde(default)]
    pub x1: Option<u8>,

    /// Select line for the third image of a multi-image set.
    #[serde(default)]
    pub x2: Option<u8>,

    /// Image select jumpers, least significant first.
    #[serde(default)]
    pub sel: [Option<u8>; MAX_SEL_PINS],

    #[serde(default)]
    pub sel_pull: JumperPull,

    #[serde(default)]
    pub status: Option<u8>,
}

impl PinMapping {
    pub const fn cs_pin(&self, line: CsLine, class: ChipClass) -> Option<u8> {
        match line {
            CsLine::Cs1 => self.cs1.get(class),
            CsLine::Cs2 => self.cs2.get(class),
            CsLine::Cs3 => self.cs3.get(class),
        }
    }

    /// Pin selecting the image at `position` within a multi-image set.
    pub const fn select_pin(&self, class: ChipClass, position: usize) -> Option<u8> {
        match position {
            0 => self.cs1.get(class),
            1 => self.x1,
            2 => self.x2,
            _ => None,
        }
    }

    /// Number of images a set may hold with this mapping.
    pub const fn max_set_images(&self) -> usize {
        match (self.x1, self.x2) {
            (Some(_), Some(_)) => 3,
            (Some(_), None) => 2,
            _ => 1,
        }
    }

    /// Number of image select jumpers fitted.
    pub fn sel_count(&self) -> usize {
        self.sel.iter().flatten().count()
    }

    /// Mask of the image select jumper pins on the selector port.
    pub fn sel_mask(&self) -> u32 {
        self.sel.iter().flatten().fold(0, |mask, &pin| mask | (1 << pin))
    }

    /// Scatters a logical address onto its physical port positions, using
    /// the address lines of `class`.
    pub fn scatter_addr(&self, addr: usize, class: ChipClass) -> u32 {
        let mut phys = 0;
        for (bit, pin) in self.addr[..class.num_addr_lines()].iter().enumerate() {
            if let Some(pin) = pin {
                if addr & (1 << bit) != 0 {
                    phys |= 1 << pin;
                }
            }
        }
        phys
    }

    /// Gathers the logical address for `class` out of a raw port value.
    /// Bits not used as address lines by `class` are ignored.
    pub fn gather_addr(&self, raw: u32, class: ChipClass) -> usize {
        let mut addr = 0;
        for (bit, pin) in self.addr[..class.num_addr_lines()].iter().enumerate() {
            if let Some(pin) = pin {
                if raw & (1 << pin) != 0 {
                    addr |= 1 << bit;
                }
            }
        }
        addr
    }

    /// Mask of the port bits `class` uses as address lines.
    pub fn addr_mask(&self, class: ChipClass) -> u32 {
        self.addr[..class.num_addr_lines()]
            .iter()
            .flatten()
            .fold(0, |mask, &pin| mask | (1 << pin))
    }

    /// Places logical data bits at their physical output positions.
    pub fn encode_data(&self, byte: u8) -> u8 {
        let mut phys = 0;
        for (bit, &pin) in self.data.iter().enumerate() {
            if byte & (1 << bit) != 0 {
                phys |= 1 << (pin & 7);
            }
        }
        phys
    }

    /// Inverse of [`PinMapping::encode_data`].
    pub fn decode_data(&self, phys: u8) -> u8 {
        let mut byte = 0;
        for (bit, &pin) in self.data.iter().enumerate() {
            if phys & (1 << (pin & 7)) != 0 {
                byte |= 1 << bit;
            }
        }
        byte
    }

    /// Value of the image select jumpers, from a raw read of the selector
    /// port.  Bit `n` is set when jumper `n` is fitted.
    pub fn jumper_value(&self, raw: u32) -> u8 {
        let asserted_high = self.sel_pull.asserted_level();
        let mut value = 0;
        for (bit, pin) in self.sel.iter().flatten().enumerate() {
            let high = raw & (1 << pin) != 0;
            if high == asserted_high {
                value |= 1 << bit;
            }
        }
        value
    }

    /// Checks the mapping is usable for every ROM class.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.ports.addr != self.ports.cs {
            return Err(MappingError::AddressCsPortMismatch);
        }

        let mut used = 0u32;
        for &pin in self.data.iter() {
            if pin > 7 {
                return Err(MappingError::DataPinOutOfRange { pin });
            }
            claim(&mut used, pin)?;
        }

        let mut all_class_pins = 0u32;
        for class in ChipClass::ALL {
            let mut used = 0u32;
            for (line, pin) in self.addr[..class.num_addr_lines()].iter().enumerate() {
                let pin = pin.ok_or(MappingError::MissingAddressLine {
                    class,
                    line: line as u8,
                })?;
                check_range(pin, SINGLE_TABLE_BITS as u8 - 1)?;
                claim(&mut used, pin)?;
            }
            for &line in class.cs_lines() {
                let pin = self
                    .cs_pin(line, class)
                    .ok_or(MappingError::MissingCsPin { class, line })?;
                check_range(pin, SINGLE_TABLE_BITS as u8 - 1)?;
                claim(&mut used, pin)?;
            }
            all_class_pins |= used;
        }

        let mut used = all_class_pins;
        for pin in [self.x1, self.x2].into_iter().flatten() {
            check_range(pin, MAX_PORT_PIN)?;
            claim(&mut used, pin)?;
        }
        if self.x1.is_none() && self.x2.is_some() {
            return Err(MappingError::X2WithoutX1);
        }

        let mut used = 0u32;
        for pin in self.sel.iter().flatten() {
            check_range(*pin, MAX_PORT_PIN)?;
            claim(&mut used, *pin)?;
        }

        if let Some(pin) = self.status {
            check_range(pin, MAX_PORT_PIN)?;
        }

        Ok(())
    }
}

fn check_range(pin: u8, max: u8) -> Result<(), MappingError> {
    if pin > max {
        Err(MappingError::PinOutOfRange { pin, max })
    } else {
        Ok(())
    }
}

fn claim(used: &mut u32, pin: u8) -> Result<(), MappingError> {
    let bit = 1 << pin;
    if *used & bit != 0 {
        return Err(MappingError::DuplicatePin { pin });
    }
    *used |= bit;
    Ok(())
}

/// Problems found validating a [`PinMapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MappingError {
    /// Address and chip select lines must be read in one port access
    AddressCsPortMismatch,
    DataPinOutOfRange { pin: u8 },
    PinOutOfRange { pin: u8, max: u8 },
    DuplicatePin { pin: u8 },
    MissingAddressLine { class: ChipClass, line: u8 },
    MissingCsPin { class: ChipClass, line: CsLine },
    X2WithoutX1,
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::AddressCsPortMismatch => {
                write!(f, "Address and chip select lines must share a port")
            }
            MappingError::DataPinOutOfRange { pin } => {
                write!(f, "Data pin {pin} out of range, must be 0-7")
            }
            MappingError::PinOutOfRange { pin, max } => {
                write!(f, "Pin {pin} out of range, maximum {max}")
            }
            MappingError::DuplicatePin { pin } => write!(f, "Pin {pin} used more than once"),
            MappingError::MissingAddressLine { class, line } => {
                write!(f, "No pin for address line A{line} of {class}")
            }
            MappingError::MissingCsPin { class, line } => {
                write!(f, "No pin for {line} of {class}")
            }
            MappingError::X2WithoutX1 => write!(f, "X2 configured without X1"),
        }
    }
}

impl core::error::Error for MappingError {}

// Address and chip select layout common to all 24 pin revisions.  A12 of
// the 2364 is CS3 of the 2316 and CS2 of the 2332, A11 of the 2332/2364
// is CS2 of the 2316.
const ADDR_24: [Option<u8>; MAX_ADDR_LINES] = [
    Some(5),
    Some(4),
    Some(6),
    Some(7),
    Some(3),
    Some(2),
    Some(1),
    Some(0),
    Some(8),
    Some(13),
    Some(11),
    Some(12),
    Some(9),
];
const DATA_24: [u8; NUM_DATA_LINES] = [7, 6, 5, 4, 3, 2, 1, 0];
const CS1_24: ClassPins = ClassPins {
    chip_2316: Some(10),
    chip_2332: Some(10),
    chip_2364: Some(10),
};
const CS2_24: ClassPins = ClassPins {
    chip_2316: Some(12),
    chip_2332: Some(9),
    chip_2364: None,
};
const CS3_24: ClassPins = ClassPins {
    chip_2316: Some(9),
    chip_2332: None,
    chip_2364: None,
};
const PORTS_24: Ports = Ports {
    data: Port::A,
    addr: Port::C,
    cs: Port::C,
    sel: Port::B,
    status: Port::B,
};

const REV_24_D: PinMapping = PinMapping {
    ports: PORTS_24,
    addr: ADDR_24,
    data: DATA_24,
    cs1: CS1_24,
    cs2: CS2_24,
    cs3: CS3_24,
    x1: None,
    x2: None,
    sel: [Some(0), Some(1), Some(2), None],
    sel_pull: JumperPull::Down,
    status: Some(15),
};

const REV_24_E: PinMapping = PinMapping {
    sel: [Some(0), Some(1), Some(2), Some(7)],
    ..REV_24_D
};

const REV_24_F: PinMapping = PinMapping {
    x1: Some(14),
    x2: Some(15),
    ..REV_24_E
};

/// Hardware revision, selected once at build or boot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareProfile {
    /// 24 pin, three image select jumpers
    Rev24D,
    /// 24 pin, four image select jumpers
    Rev24E,
    /// 24 pin, four image select jumpers, multi-image select lines
    Rev24F,
    /// Mapping loaded from a hardware description
    Custom(PinMapping),
}

impl HardwareProfile {
    pub const BUILT_IN: [HardwareProfile; 3] = [Self::Rev24D, Self::Rev24E, Self::Rev24F];

    pub const fn mapping(&self) -> PinMapping {
        match self {
            Self::Rev24D => REV_24_D,
            Self::Rev24E => REV_24_E,
            Self::Rev24F => REV_24_F,
            Self::Custom(mapping) => *mapping,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rev24D => "24-d",
            Self::Rev24E => "24-e",
            Self::Rev24F => "24-f",
            Self::Custom(_) => "custom",
        }
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        let s = s.strip_prefix("rev-").unwrap_or(s);
        Self::BUILT_IN
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for HardwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
