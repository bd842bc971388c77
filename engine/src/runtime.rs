// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Runtime information published for debug probes.
//!
//! The firmware places a single [`RuntimeInfo`] in RAM where a probe can
//! find it by its magic and read it without the firmware's cooperation.
//! Bootstrap fills in the selection once, and the serving engine only ever
//! touches the access counter.

/// Magic at the start of [`RuntimeInfo`]
pub const RUNTIME_INFO_MAGIC: [u8; 4] = *b"rrom";

/// Size of [`RuntimeInfo`] in bytes, as recorded in its `size` field
pub const RUNTIME_INFO_SIZE: usize = 20;

/// Offset of `access_count`, for probes polling the counter alone
pub const ACCESS_COUNT_OFFSET: usize = 8;

/// Index value before bootstrap has run
pub const UNSET_INDEX: u8 = 0xFF;

/// Table pointer value before bootstrap has run
pub const UNSET_PTR: u32 = 0xFFFF_FFFF;

#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub magic: [u8; 4],
    pub size: u8,

    /// Raw image select jumper value
    pub image_sel: u8,

    pub rom_set_index: u8,

    /// Non-zero if `access_count` is maintained
    pub count_rom_access: u8,

    /// Number of times the ROM has been selected
    pub access_count: u32,

    /// Address of the combined image being served
    pub rom_table_ptr: u32,

    pub rom_table_size: u32,
}

const _: () = assert!(core::mem::size_of::<RuntimeInfo>() == RUNTIME_INFO_SIZE);

impl RuntimeInfo {
    /// Link time values, before bootstrap has run.
    pub const fn new() -> Self {
        Self {
            magic: RUNTIME_INFO_MAGIC,
            size: RUNTIME_INFO_SIZE as u8,
            image_sel: UNSET_INDEX,
            rom_set_index: UNSET_INDEX,
            count_rom_access: 0,
            access_count: 0,
            rom_table_ptr: UNSET_PTR,
            rom_table_size: 0,
        }
    }

    /// Records the selection made at boot and the table being served.
    pub fn publish(&mut self, image_sel: u8, set_index: usize, count_access: bool, table: &[u8]) {
        self.image_sel = image_sel;
        self.rom_set_index = set_index as u8;
        self.count_rom_access = count_access as u8;
        self.access_count = 0;
        // Addresses are 32 bit on target
        self.rom_table_ptr = table.as_ptr() as usize as u32;
        self.rom_table_size = table.len() as u32;
    }

    /// Bumps the access counter.  Volatile, as nothing on the device reads
    /// it back.
    #[inline(always)]
    pub fn record_access(&mut self) {
        let count = &raw mut self.access_count;
        unsafe { count.write_volatile(count.read_volatile().wrapping_add(1)) };
    }

    pub fn access_count(&self) -> u32 {
        let count = &raw const self.access_count;
        unsafe { count.read_volatile() }
    }

    /// The bytes a probe would read.
    pub fn to_bytes(&self) -> [u8; RUNTIME_INFO_SIZE] {
        let mut buf = [0u8; RUNTIME_INFO_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4] = self.size;
        buf[5] = self.image_sel;
        buf[6] = self.rom_set_index;
        buf[7] = self.count_rom_access;
        buf[8..12].copy_from_slice(&self.access_count().to_le_bytes());
        buf[12..16].copy_from_slice(&self.rom_table_ptr.to_le_bytes());
        buf[16..20].copy_from_slice(&self.rom_table_size.to_le_bytes());
        buf
    }
}

impl Default for RuntimeInfo {
    fn default() -> Self {
        Self::new()
    }
}
