// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Supported microcontrollers.

use core::fmt;

/// STM32F4 variants retrorom can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    F401RE,
    F411RE,
    F405RG,
    F446RE,
}

impl Variant {
    pub const ALL: [Variant; 4] = [Self::F401RE, Self::F411RE, Self::F405RG, Self::F446RE];

    pub const fn flash_kb(&self) -> usize {
        match self {
            Self::F401RE | Self::F411RE | Self::F446RE => 512,
            Self::F405RG => 1024,
        }
    }

    pub const fn ram_kb(&self) -> usize {
        match self {
            Self::F401RE => 96,
            Self::F411RE | Self::F405RG | Self::F446RE => 128,
        }
    }

    /// Maximum system clock in MHz.
    pub const fn max_sysclk_mhz(&self) -> u32 {
        match self {
            Self::F401RE => 84,
            Self::F411RE => 100,
            Self::F405RG => 168,
            Self::F446RE => 180,
        }
    }

    /// Device ID as reported in DBGMCU_IDCODE.
    pub const fn device_id(&self) -> u16 {
        match self {
            Self::F401RE => 0x433,
            Self::F411RE => 0x431,
            Self::F405RG => 0x413,
            Self::F446RE => 0x421,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::F401RE => "f401re",
            Self::F411RE => "f411re",
            Self::F405RG => "f405rg",
            Self::F446RE => "f446re",
        }
    }

    /// Full part name, as used by probe tooling.
    pub const fn part(&self) -> &'static str {
        match self {
            Self::F401RE => "STM32F401RE",
            Self::F411RE => "STM32F411RE",
            Self::F405RG => "STM32F405RG",
            Self::F446RE => "STM32F446RE",
        }
    }

    pub fn try_from_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.part())
    }
}
