// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! The serving loops.
//!
//! The engine is either IDLE, with the data lines released, or ACTIVE,
//! driving the byte for the current address.  It only drives the data
//! lines while a qualifying chip select is asserted.
//!
//! Everything that varies between ROM sets (which chip select test to use,
//! whether to count accesses, which algorithm) is resolved once by
//! [`Engine::serve`] into a monomorphised loop, so the loops themselves do
//! nothing but read the port, test it, look up and write.

use log::{debug, warn};

use retrorom_config::chip::CsLogic;
use retrorom_config::fw::ServeAlg;
use retrorom_config::hw::PinMapping;

use crate::bus::Bus;
use crate::layout::SetDesc;
use crate::runtime::RuntimeInfo;

/// Bit masks used by the hot loop, derived once per boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeMasks {
    /// Chip select bits monitored
    pub cs_check: u32,

    /// Monitored bits which are active high
    pub cs_invert: u32,

    /// Table length - 1
    pub index_mask: u32,
}

impl ServeMasks {
    /// Masks for `set` on `mapping`.
    ///
    /// Single image sets need every chip select the image declares to be
    /// asserted.  Multi-image sets need any one of their select lines.
    /// Configurations the engine can't honour degrade to monitoring CS1
    /// alone.
    pub fn for_set(set: &SetDesc<'_>, mapping: &PinMapping) -> Self {
        let index_mask = (set.table().len() as u32).wrapping_sub(1);
        let mut cs_check = 0;
        let mut cs_invert = 0;

        let Some(first) = set.image(0) else {
            warn!("Set {} has no images", set.index());
            return Self {
                cs_check,
                cs_invert,
                index_mask,
            };
        };
        let class = first.class;

        if set.image_count() == 1 {
            for &line in class.cs_lines() {
                let Some(logic) = first.cs(line).filter(|l| *l != CsLogic::Ignore) else {
                    continue;
                };
                let Some(pin) = mapping.cs_pin(line, class) else {
                    warn!("No pin for {line} of {class}, not monitored");
                    continue;
                };
                cs_check |= 1 << pin;
                if logic == CsLogic::ActiveHigh {
                    cs_invert |= 1 << pin;
                }
            }
        } else {
            let logic = set.multi_cs();
            let mut count = set.image_count();
            if !(2..=3).contains(&count) {
                warn!("Unsupported image count {count} - serving CS1 only");
                count = 1;
            }
            if (0..count).any(|pos| mapping.select_pin(class, pos).is_none()) {
                warn!("Select lines missing for {count} images - serving CS1 only");
                count = 1;
            }
            for pin in (0..count).filter_map(|pos| mapping.select_pin(class, pos)) {
                cs_check |= 1 << pin;
                if logic == CsLogic::ActiveHigh {
                    cs_invert |= 1 << pin;
                }
            }
        }

        if cs_check == 0 {
            warn!("No chip select monitored for set {}", set.index());
        }

        Self {
            cs_check,
            cs_invert,
            index_mask,
        }
    }
}

// How the hot loop decides chip select is asserted
trait CsTest {
    fn active(raw: u32, masks: &ServeMasks) -> bool;
}

// Every monitored line asserted
struct AllCs;

impl CsTest for AllCs {
    #[inline(always)]
    fn active(raw: u32, masks: &ServeMasks) -> bool {
        ((raw ^ masks.cs_invert) & masks.cs_check) == 0
    }
}

// Any monitored line asserted
struct AnyCs;

impl CsTest for AnyCs {
    #[inline(always)]
    fn active(raw: u32, masks: &ServeMasks) -> bool {
        (masks.cs_check & !(raw ^ masks.cs_invert)) != 0
    }
}

// Called on every IDLE to ACTIVE transition
trait AccessCounter {
    fn selected(&mut self);
}

struct NoCount;

impl AccessCounter for NoCount {
    #[inline(always)]
    fn selected(&mut self) {}
}

struct CountAccess<'a>(&'a mut RuntimeInfo);

impl AccessCounter for CountAccess<'_> {
    #[inline(always)]
    fn selected(&mut self) {
        self.0.record_access();
    }
}

/// A resolved serving engine for one ROM set.
#[derive(Debug, Clone, Copy)]
pub struct Engine<'a> {
    table: &'a [u8],
    masks: ServeMasks,
    serve_alg: ServeAlg,
    count_access: bool,
}

impl<'a> Engine<'a> {
    /// Resolves the engine for `set`, serving from `table` (the set's own
    /// table, or a copy of it).
    ///
    /// An algorithm which doesn't suit the set's image count is corrected,
    /// with a warning.  So is a copy whose length differs from the set's
    /// table, which is replaced by the set's own.
    pub fn new(set: &SetDesc<'a>, table: &'a [u8], mapping: &PinMapping, count_access: bool) -> Self {
        let table = if table.len() == set.table().len() {
            table
        } else {
            warn!(
                "Table copy is {} bytes, set {} table is {} - serving the set's own",
                table.len(),
                set.index(),
                set.table().len()
            );
            set.table()
        };

        let requested = set.serve_alg();
        let serve_alg = requested.corrected_for(set.image_count());
        if serve_alg != requested {
            warn!(
                "Set {} has {} image(s), serving algorithm {requested} corrected to {serve_alg}",
                set.index(),
                set.image_count()
            );
        }

        let masks = ServeMasks::for_set(set, mapping);
        debug!(
            "CS check {:#06X} invert {:#06X} index mask {:#06X}",
            masks.cs_check, masks.cs_invert, masks.index_mask
        );

        Self {
            table,
            masks,
            serve_alg,
            count_access,
        }
    }

    pub fn serve_alg(&self) -> ServeAlg {
        self.serve_alg
    }

    pub fn masks(&self) -> &ServeMasks {
        &self.masks
    }

    pub fn table(&self) -> &'a [u8] {
        self.table
    }

    /// Serves until `bus` stops serving, which on hardware is never.
    pub fn serve<B: Bus>(&self, bus: &mut B, info: &mut RuntimeInfo) {
        let table = self.table;
        let masks = &self.masks;
        bus.data_inputs();

        match (self.serve_alg, self.count_access) {
            (ServeAlg::TwoCsOneAddr, false) => {
                two_cs_one_addr::<_, AllCs, _>(bus, table, masks, &mut NoCount)
            }
            (ServeAlg::TwoCsOneAddr, true) => {
                two_cs_one_addr::<_, AllCs, _>(bus, table, masks, &mut CountAccess(info))
            }
            (ServeAlg::AddrOnCs, false) => {
                addr_on_cs::<_, AllCs, _>(bus, table, masks, &mut NoCount)
            }
            (ServeAlg::AddrOnCs, true) => {
                addr_on_cs::<_, AllCs, _>(bus, table, masks, &mut CountAccess(info))
            }
            (ServeAlg::AddrOnAnyCs, false) => {
                addr_on_cs::<_, AnyCs, _>(bus, table, masks, &mut NoCount)
            }
            (ServeAlg::AddrOnAnyCs, true) => {
                addr_on_cs::<_, AnyCs, _>(bus, table, masks, &mut CountAccess(info))
            }
        }
    }
}

#[inline(always)]
fn lookup(table: &[u8], raw: u32, masks: &ServeMasks) -> u8 {
    table[(raw & masks.index_mask) as usize]
}

// Tests chip select about twice for every address lookup, loading the byte
// speculatively while idle so it is ready the moment chip select asserts.
// Once active, each reload is followed by a chip select test, so
// deassertion is spotted within one reload.
#[inline(always)]
fn two_cs_one_addr<B: Bus, T: CsTest, C: AccessCounter>(
    bus: &mut B,
    table: &[u8],
    masks: &ServeMasks,
    counter: &mut C,
) {
    while bus.serving() {
        // IDLE
        let mut raw = bus.read_addr_cs();
        if !T::active(raw, masks) {
            let byte = lookup(table, raw, masks);
            raw = bus.read_addr_cs();
            // Data lines are inputs, so this only primes the port
            bus.write_data(byte);
            if !T::active(raw, masks) {
                continue;
            }
        }

        // ACTIVE
        counter.selected();
        let mut byte = lookup(table, raw, masks);
        bus.write_data(byte);
        bus.data_outputs();
        loop {
            raw = bus.read_addr_cs();
            if !T::active(raw, masks) {
                bus.data_inputs();
                break;
            }
            byte = lookup(table, raw, masks);
            raw = bus.read_addr_cs();
            if !T::active(raw, masks) {
                bus.data_inputs();
                bus.write_data(byte);
                break;
            }
            bus.write_data(byte);
        }
    }
}

// Tests chip select once per address lookup.  The byte is only loaded and
// the outputs enabled once chip select is seen.
#[inline(always)]
fn addr_on_cs<B: Bus, T: CsTest, C: AccessCounter>(
    bus: &mut B,
    table: &[u8],
    masks: &ServeMasks,
    counter: &mut C,
) {
    while bus.serving() {
        // IDLE
        let mut raw = bus.read_addr_cs();
        if !T::active(raw, masks) {
            continue;
        }

        // ACTIVE
        counter.selected();
        bus.write_data(lookup(table, raw, masks));
        bus.data_outputs();
        loop {
            raw = bus.read_addr_cs();
            if !T::active(raw, masks) {
                break;
            }
            bus.write_data(lookup(table, raw, masks));
        }
        bus.data_inputs();
    }
}
