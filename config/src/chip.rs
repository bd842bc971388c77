// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ROM classes emulated by retrorom, and chip select handling.

use core::fmt;

/// A mask-programmed ROM class.
///
/// All three are 24-pin parts sharing a pinout, differing in how many of
/// the upper pins are address lines and how many are chip selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ChipClass {
    /// 2KB, 11 address lines, three chip selects
    #[serde(rename = "2316")]
    Chip2316,
    /// 4KB, 12 address lines, two chip selects
    #[serde(rename = "2332")]
    Chip2332,
    /// 8KB, 13 address lines, one chip select
    #[serde(rename = "2364")]
    Chip2364,
}

impl ChipClass {
    pub const ALL: [ChipClass; 3] = [Self::Chip2316, Self::Chip2332, Self::Chip2364];

    /// Size of the ROM in bytes.
    pub const fn size_bytes(&self) -> usize {
        match self {
            Self::Chip2316 => 2048,
            Self::Chip2332 => 4096,
            Self::Chip2364 => 8192,
        }
    }

    pub const fn num_addr_lines(&self) -> usize {
        match self {
            Self::Chip2316 => 11,
            Self::Chip2332 => 12,
            Self::Chip2364 => 13,
        }
    }

    /// Chip select lines present on this class, in order.
    pub fn cs_lines(&self) -> &'static [CsLine] {
        match self {
            Self::Chip2316 => &[CsLine::Cs1, CsLine::Cs2, CsLine::Cs3],
            Self::Chip2332 => &[CsLine::Cs1, CsLine::Cs2],
            Self::Chip2364 => &[CsLine::Cs1],
        }
    }

    pub fn has_cs_line(&self, line: CsLine) -> bool {
        self.cs_lines().contains(&line)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Chip2316 => "2316",
            Self::Chip2332 => "2332",
            Self::Chip2364 => "2364",
        }
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        match s {
            "2316" => Some(Self::Chip2316),
            "2332" => Some(Self::Chip2332),
            "2364" => Some(Self::Chip2364),
            _ => None,
        }
    }

    /// Value used to encode this class in the firmware blob.
    pub const fn wire_value(&self) -> u8 {
        match self {
            Self::Chip2316 => 0,
            Self::Chip2332 => 1,
            Self::Chip2364 => 2,
        }
    }

    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Chip2316),
            1 => Some(Self::Chip2332),
            2 => Some(Self::Chip2364),
            _ => None,
        }
    }
}

impl fmt::Display for ChipClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One of the chip select lines of a ROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsLine {
    Cs1,
    Cs2,
    Cs3,
}

impl CsLine {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cs1 => "cs1",
            Self::Cs2 => "cs2",
            Self::Cs3 => "cs3",
        }
    }
}

impl fmt::Display for CsLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Chip select line logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsLogic {
    /// Chip select line is active low
    #[serde(alias = "0")]
    ActiveLow,

    /// Chip select line is active high
    #[serde(alias = "1")]
    ActiveHigh,

    /// Chip select line is not used by this image
    Ignore,
}

impl CsLogic {
    pub fn try_from_str(s: &str) -> Option<Self> {
        match s {
            "0" | "active_low" => Some(CsLogic::ActiveLow),
            "1" | "active_high" => Some(CsLogic::ActiveHigh),
            "ignore" => Some(CsLogic::Ignore),
            _ => None,
        }
    }

    /// Value used to encode this logic in the firmware blob.
    pub const fn wire_value(&self) -> u8 {
        match self {
            CsLogic::ActiveLow => 0,
            CsLogic::ActiveHigh => 1,
            CsLogic::Ignore => 2,
        }
    }

    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(CsLogic::ActiveLow),
            1 => Some(CsLogic::ActiveHigh),
            2 => Some(CsLogic::Ignore),
            _ => None,
        }
    }

    /// Physical pin level that asserts the line, or `None` if unused.
    pub const fn active_level(&self) -> Option<bool> {
        match self {
            CsLogic::ActiveLow => Some(false),
            CsLogic::ActiveHigh => Some(true),
            CsLogic::Ignore => None,
        }
    }

    /// Whether a line at `level` is asserted.  Ignored lines never are.
    pub const fn is_active(&self, level: bool) -> bool {
        match self {
            CsLogic::ActiveLow => !level,
            CsLogic::ActiveHigh => level,
            CsLogic::Ignore => false,
        }
    }
}

impl fmt::Display for CsLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CsLogic::ActiveLow => "active low",
            CsLogic::ActiveHigh => "active high",
            CsLogic::Ignore => "ignore",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_geometry() {
        for class in ChipClass::ALL {
            assert_eq!(class.size_bytes(), 1 << class.num_addr_lines());
            assert_eq!(class.num_addr_lines() + class.cs_lines().len(), 14);
            assert_eq!(ChipClass::from_wire(class.wire_value()), Some(class));
        }
    }

    #[test]
    fn cs_logic_levels() {
        assert!(CsLogic::ActiveLow.is_active(false));
        assert!(!CsLogic::ActiveLow.is_active(true));
        assert!(CsLogic::ActiveHigh.is_active(true));
        assert!(!CsLogic::Ignore.is_active(true));
        assert!(!CsLogic::Ignore.is_active(false));
        assert_eq!(CsLogic::try_from_str("1"), Some(CsLogic::ActiveHigh));
        assert_eq!(CsLogic::try_from_str("low"), None);
    }
}
