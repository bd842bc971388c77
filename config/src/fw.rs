// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Firmware serving properties.

use core::fmt;

/// Algorithm used by the serving engine to respond to chip select and
/// address changes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServeAlg {
    /// Tests chip select twice for every address lookup.  Default for
    /// single image sets.
    #[default]
    TwoCsOneAddr,

    /// Tests chip select once per address lookup, loading the byte and
    /// enabling outputs only once chip select is seen.
    AddrOnCs,

    /// Serves when any of the set's select lines is asserted.  Required by
    /// multi-image sets.
    AddrOnAnyCs,
}

impl ServeAlg {
    pub const fn wire_value(&self) -> u8 {
        match self {
            ServeAlg::TwoCsOneAddr => 0,
            ServeAlg::AddrOnCs => 1,
            ServeAlg::AddrOnAnyCs => 2,
        }
    }

    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(ServeAlg::TwoCsOneAddr),
            1 => Some(ServeAlg::AddrOnCs),
            2 => Some(ServeAlg::AddrOnAnyCs),
            _ => None,
        }
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        match s {
            "two_cs_one_addr" | "default" => Some(ServeAlg::TwoCsOneAddr),
            "addr_on_cs" => Some(ServeAlg::AddrOnCs),
            "addr_on_any_cs" => Some(ServeAlg::AddrOnAnyCs),
            _ => None,
        }
    }

    /// Returns the algorithm appropriate for a set of `image_count`
    /// images, starting from this one.
    pub const fn corrected_for(self, image_count: usize) -> Self {
        match (self, image_count > 1) {
            (_, true) => ServeAlg::AddrOnAnyCs,
            (ServeAlg::AddrOnAnyCs, false) => ServeAlg::TwoCsOneAddr,
            (alg, false) => alg,
        }
    }
}

impl fmt::Display for ServeAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServeAlg::TwoCsOneAddr => "two CS one address",
            ServeAlg::AddrOnCs => "address on CS",
            ServeAlg::AddrOnAnyCs => "address on any CS",
        };
        write!(f, "{s}")
    }
}

/// Where the active combined image is served from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Read in place from flash
    #[default]
    Flash,

    /// Copied to RAM at boot
    Ram,
}
