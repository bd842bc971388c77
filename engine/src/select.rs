// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ROM set selection from the image select jumpers.

use retrorom_config::hw::PinMapping;

/// Result of reading the image select jumpers at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Raw jumper value, bit `n` set when jumper `n` is fitted
    pub image_sel: u8,

    /// Index of the ROM set to serve
    pub set_index: usize,
}

/// Index of the set selected by `jumper_value`, wrapping round if there
/// are fewer sets installed than jumper combinations.
pub fn select_set(jumper_value: u8, set_count: usize) -> Option<usize> {
    if set_count == 0 {
        return None;
    }
    Some(jumper_value as usize % set_count)
}

/// Reads the selection out of a raw read of the selector port.
pub fn selection(mapping: &PinMapping, raw: u32, set_count: usize) -> Option<Selection> {
    let image_sel = mapping.jumper_value(raw);
    select_set(image_sel, set_count).map(|set_index| Selection {
        image_sel,
        set_index,
    })
}

/// Whether the jumpers ask for the MCU's built-in bootloader: every jumper
/// fitted, on hardware with at least one.
pub fn maintenance_requested(mapping: &PinMapping, raw: u32, enabled: bool) -> bool {
    let count = mapping.sel_count();
    if !enabled || count == 0 {
        return false;
    }
    let all = (1u16 << count) - 1;
    mapping.jumper_value(raw) as u16 == all
}
