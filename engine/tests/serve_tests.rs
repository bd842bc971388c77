// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! End to end tests of the serving engine
//!
//! Each test builds a firmware blob from a JSON ROM configuration, reads it
//! back with the engine's layout reader and serves it through a simulated
//! bus.  The bus replays a script of port reads and checks the engine only
//! drives the data lines while a qualifying chip select is asserted.

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::sync::Once;

    use log::{Level, LevelFilter, Log, Metadata, Record};

    use retrorom_config::chip::ChipClass;
    use retrorom_config::fw::ServeAlg;
    use retrorom_config::hw::{HardwareProfile, PinMapping};
    use retrorom_config::layout::{LAYOUT_HEADER_LEN, SET_SERVE_ALG};
    use retrorom_config::mcu::Variant;
    use retrorom_engine::{Bus, Engine, Layout, RuntimeInfo};
    use retrorom_gen::builder::{BuildProperties, Builder, FileData};
    use retrorom_gen::decode;

    const CS1: u32 = 1 << 10;
    const X1: u32 = 1 << 14;
    const X2: u32 = 1 << 15;

    // ========================================================================
    // Simulated bus
    // ========================================================================

    struct SimBus<F: Fn(u32) -> bool> {
        script: VecDeque<u32>,
        idle: u32,
        qualifies: F,
        last_raw: u32,
        outputs: bool,
        release_pending: bool,
        violations: Vec<String>,
        driven: Vec<(u32, u8)>,
        selects: usize,
    }

    impl<F: Fn(u32) -> bool> SimBus<F> {
        fn new(script: Vec<u32>, idle: u32, qualifies: F) -> Self {
            Self {
                script: script.into(),
                idle,
                qualifies,
                last_raw: idle,
                outputs: false,
                release_pending: false,
                violations: Vec::new(),
                driven: Vec::new(),
                selects: 0,
            }
        }

        fn check_clean(&self) {
            assert!(self.violations.is_empty(), "{:?}", self.violations);
            assert!(!self.outputs, "Outputs left enabled");
        }
    }

    impl<F: Fn(u32) -> bool> Bus for SimBus<F> {
        fn read_addr_cs(&mut self) -> u32 {
            if self.release_pending {
                self.violations
                    .push(format!("Read after deselect {:#06X} with outputs on", self.last_raw));
            }
            let raw = self.script.pop_front().unwrap_or(self.idle);
            self.last_raw = raw;
            if self.outputs && !(self.qualifies)(raw) {
                self.release_pending = true;
            }
            raw
        }

        fn write_data(&mut self, byte: u8) {
            if self.release_pending {
                self.violations
                    .push(format!("Write after deselect {:#06X}", self.last_raw));
            }
            if self.outputs {
                self.driven.push((self.last_raw, byte));
            }
        }

        fn data_outputs(&mut self) {
            if !(self.qualifies)(self.last_raw) {
                self.violations
                    .push(format!("Outputs enabled on {:#06X}", self.last_raw));
            }
            if !self.outputs {
                self.selects += 1;
            }
            self.outputs = true;
        }

        fn data_inputs(&mut self) {
            self.outputs = false;
            self.release_pending = false;
        }

        fn serving(&self) -> bool {
            !self.script.is_empty()
        }
    }

    // Each access holds the port steady for a few reads, then deselects
    fn script(accesses: &[u32], idle: u32) -> Vec<u32> {
        let mut script = vec![idle; 3];
        for &raw in accesses {
            script.extend([raw; 4]);
            script.extend([idle; 3]);
        }
        script
    }

    // ========================================================================
    // Log capture
    // ========================================================================

    // Records are kept per thread, as tests run in parallel
    thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
    }

    struct CaptureLogger;

    impl Log for CaptureLogger {
        fn enabled(&self, _metadata: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            RECORDS.with(|records| {
                records
                    .borrow_mut()
                    .push((record.level(), record.args().to_string()))
            });
        }

        fn flush(&self) {}
    }

    static LOGGER: CaptureLogger = CaptureLogger;
    static LOGGER_INIT: Once = Once::new();

    // Runs `f`, returning its result and the warnings it logged
    fn warnings<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        LOGGER_INIT.call_once(|| {
            log::set_logger(&LOGGER).unwrap();
            log::set_max_level(LevelFilter::Trace);
        });
        RECORDS.with(|records| records.borrow_mut().clear());

        let result = f();
        let warnings = RECORDS.with(|records| {
            records
                .borrow_mut()
                .drain(..)
                .filter(|(level, _)| *level == Level::Warn)
                .map(|(_, message)| message)
                .collect()
        });
        (result, warnings)
    }

    fn assert_warned(warnings: &[String], text: &str) {
        assert!(
            warnings.iter().any(|w| w.contains(text)),
            "No warning containing {text:?} in {warnings:?}"
        );
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|ii| (ii as u8).wrapping_mul(31) ^ (ii >> 7) as u8 ^ seed)
            .collect()
    }

    fn build(json: &str, files: &[Vec<u8>], profile: HardwareProfile) -> Vec<u8> {
        let mut builder = Builder::from_json(json).unwrap();
        for spec in builder.file_specs() {
            builder
                .add_file(FileData {
                    id: spec.id,
                    data: files[spec.id].clone(),
                })
                .unwrap();
        }
        builder
            .build(&BuildProperties::new(profile, Variant::F411RE))
            .unwrap()
    }

    fn single_json(serve_alg: &str) -> String {
        format!(
            r#"{{
                "version": 1,
                "description": "Kernal",
                "roms": [{{ "file": "kernal.bin", "type": "2364", "cs1": "active_low", "serve_alg": "{serve_alg}" }}]
            }}"#
        )
    }

    const MULTI_JSON: &str = r#"{
        "version": 1,
        "description": "Three in one",
        "roms": [
            { "file": "a.bin", "type": "2364", "cs1": "active_low", "set": 0 },
            { "file": "b.bin", "type": "2364", "cs1": "active_low", "set": 0 },
            { "file": "c.bin", "type": "2364", "cs1": "active_low", "set": 0 }
        ]
    }"#;

    fn check_driven(driven: &[(u32, u8)], mapping: &PinMapping, expected: impl Fn(u32) -> u8) {
        assert!(!driven.is_empty());
        for &(raw, byte) in driven {
            assert_eq!(decode(byte, mapping), expected(raw), "raw {raw:#06X}");
        }
    }

    // ========================================================================
    // Single image sets
    // ========================================================================

    #[test]
    fn test_single_serves_source_bytes() {
        let mapping = HardwareProfile::Rev24F.mapping();
        let source = pattern(8192, 0x3C);

        for alg in ["two_cs_one_addr", "addr_on_cs"] {
            let blob = build(&single_json(alg), &[source.clone()], HardwareProfile::Rev24F);
            let layout = Layout::parse(&blob).unwrap();
            let set = layout.set(0).unwrap();
            let engine = Engine::new(&set, set.table(), &mapping, false);
            assert_eq!(engine.serve_alg(), ServeAlg::try_from_str(alg).unwrap());

            let addrs = [0usize, 1, 0x155, 0xAAA, 0x1000, 0x1FFF];
            let accesses: Vec<u32> = addrs
                .iter()
                .map(|&a| mapping.scatter_addr(a, ChipClass::Chip2364))
                .collect();
            let mut bus = SimBus::new(script(&accesses, CS1), CS1, |raw| raw & CS1 == 0);
            let mut info = RuntimeInfo::new();
            engine.serve(&mut bus, &mut info);

            bus.check_clean();
            assert_eq!(bus.selects, addrs.len());
            check_driven(&bus.driven, &mapping, |raw| {
                source[mapping.gather_addr(raw, ChipClass::Chip2364)]
            });
        }
    }

    #[test]
    fn test_zeroed_rom_end_to_end() {
        let json = r#"{
            "version": 1,
            "description": "Zeroes",
            "roms": [{ "file": "zero.bin", "type": "2364", "cs1": "active_low", "size_handling": "duplicate" }]
        }"#;
        let mapping = HardwareProfile::Rev24F.mapping();
        let blob = build(json, &[vec![0; 8192]], HardwareProfile::Rev24F);
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        assert_eq!(set.table().len(), 16384);

        let engine = Engine::new(&set, set.table(), &mapping, false);
        let accesses = [
            mapping.scatter_addr(0x0000, ChipClass::Chip2364),
            mapping.scatter_addr(0x1FFF, ChipClass::Chip2364),
        ];
        let mut bus = SimBus::new(script(&accesses, CS1), CS1, |raw| raw & CS1 == 0);
        engine.serve(&mut bus, &mut RuntimeInfo::new());

        bus.check_clean();
        check_driven(&bus.driven, &mapping, |_| 0);
    }

    #[test]
    fn test_never_selected_never_drives() {
        let mapping = HardwareProfile::Rev24F.mapping();
        let blob = build(
            &single_json("two_cs_one_addr"),
            &[pattern(8192, 0)],
            HardwareProfile::Rev24F,
        );
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        let engine = Engine::new(&set, set.table(), &mapping, false);

        // Address lines toggling, CS1 held high
        let script: Vec<u32> = (0..64).map(|ii| CS1 | (ii * 0x81 & 0x3BFF)).collect();
        let mut bus = SimBus::new(script, CS1, |raw| raw & CS1 == 0);
        engine.serve(&mut bus, &mut RuntimeInfo::new());

        bus.check_clean();
        assert_eq!(bus.selects, 0);
        assert!(bus.driven.is_empty());
    }

    #[test]
    fn test_2332_needs_both_selects() {
        let json = r#"{
            "version": 1,
            "description": "BASIC",
            "roms": [{ "file": "basic.bin", "type": "2332", "cs1": "active_low", "cs2": "active_high" }]
        }"#;
        let mapping = HardwareProfile::Rev24F.mapping();
        let source = pattern(4096, 0x77);
        let blob = build(json, &[source.clone()], HardwareProfile::Rev24F);
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        let engine = Engine::new(&set, set.table(), &mapping, false);

        // 2332 CS2 is on PC9
        let cs2 = 1 << 9;
        assert_eq!(engine.masks().cs_check, CS1 | cs2);
        assert_eq!(engine.masks().cs_invert, cs2);

        let addr = mapping.scatter_addr(0x123, ChipClass::Chip2332);
        let idle = CS1;
        let accesses = [
            addr,             // CS2 low, not selected
            addr | CS1 | cs2, // CS1 high, not selected
            addr | cs2,       // selected
        ];
        let qualifies = move |raw: u32| raw & CS1 == 0 && raw & cs2 != 0;
        let mut bus = SimBus::new(script(&accesses, idle), idle, qualifies);
        engine.serve(&mut bus, &mut RuntimeInfo::new());

        bus.check_clean();
        assert_eq!(bus.selects, 1);
        check_driven(&bus.driven, &mapping, |_| source[0x123]);
    }

    #[test]
    fn test_access_counting() {
        let mapping = HardwareProfile::Rev24F.mapping();
        let blob = build(
            &single_json("two_cs_one_addr"),
            &[pattern(8192, 1)],
            HardwareProfile::Rev24F,
        );
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();

        let accesses = [0, 0x10, 0x20, 0x30, 0x40];
        for count_access in [false, true] {
            let engine = Engine::new(&set, set.table(), &mapping, count_access);
            let mut bus = SimBus::new(script(&accesses, CS1), CS1, |raw| raw & CS1 == 0);
            let mut info = RuntimeInfo::new();
            info.publish(0, 0, count_access, set.table());
            engine.serve(&mut bus, &mut info);

            bus.check_clean();
            let expected = if count_access { 5 } else { 0 };
            assert_eq!(info.access_count(), expected);
        }
    }

    // ========================================================================
    // Multi-image sets
    // ========================================================================

    fn multi_files() -> Vec<Vec<u8>> {
        vec![vec![0x11; 8192], vec![0x22; 8192], vec![0x33; 8192]]
    }

    #[test]
    fn test_multi_serves_selected_image() {
        let mapping = HardwareProfile::Rev24F.mapping();
        let blob = build(MULTI_JSON, &multi_files(), HardwareProfile::Rev24F);
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        assert_eq!(set.image_count(), 3);

        let engine = Engine::new(&set, set.table(), &mapping, false);
        assert_eq!(engine.serve_alg(), ServeAlg::AddrOnAnyCs);
        assert_eq!(engine.masks().cs_check, CS1 | X1 | X2);
        assert_eq!(engine.masks().cs_invert, 0);
        assert_eq!(engine.masks().index_mask, 0xFFFF);

        let idle = CS1 | X1 | X2;
        let addr = mapping.scatter_addr(0x0ABC, ChipClass::Chip2364);
        let accesses = [addr | X1 | X2, addr | CS1 | X2, addr | CS1 | X1, addr | idle];
        let qualifies = move |raw: u32| raw & idle != idle;
        let mut bus = SimBus::new(script(&accesses, idle), idle, qualifies);
        engine.serve(&mut bus, &mut RuntimeInfo::new());

        bus.check_clean();
        assert_eq!(bus.selects, 3);
        check_driven(&bus.driven, &mapping, |raw| {
            if raw & CS1 == 0 {
                0x11
            } else if raw & X1 == 0 {
                0x22
            } else {
                0x33
            }
        });
    }

    #[test]
    fn test_multi_active_high() {
        let json = MULTI_JSON.replace("active_low", "active_high");
        let mapping = HardwareProfile::Rev24F.mapping();
        let blob = build(&json, &multi_files(), HardwareProfile::Rev24F);
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        let engine = Engine::new(&set, set.table(), &mapping, false);
        assert_eq!(engine.masks().cs_invert, CS1 | X1 | X2);

        let addr = mapping.scatter_addr(0x0001, ChipClass::Chip2364);
        // Two lines at once, CS1 wins
        let accesses = [addr | CS1 | X1, addr | X2];
        let qualifies = |raw: u32| raw & (CS1 | X1 | X2) != 0;
        let mut bus = SimBus::new(script(&accesses, 0), 0, qualifies);
        engine.serve(&mut bus, &mut RuntimeInfo::new());

        bus.check_clean();
        assert_eq!(bus.selects, 2);
        check_driven(&bus.driven, &mapping, |raw| if raw & CS1 != 0 { 0x11 } else { 0x33 });
    }

    #[test]
    fn test_multi_without_select_lines_degrades() {
        let blob = build(MULTI_JSON, &multi_files(), HardwareProfile::Rev24F);
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();

        // Rev D has no X1/X2
        let mapping = HardwareProfile::Rev24D.mapping();
        let (engine, warned) = warnings(|| Engine::new(&set, set.table(), &mapping, false));
        assert_eq!(engine.serve_alg(), ServeAlg::AddrOnAnyCs);
        assert_eq!(engine.masks().cs_check, CS1);
        assert_warned(&warned, "serving CS1 only");
    }

    #[test]
    fn test_mismatched_table_copy_ignored() {
        let blob = build(
            &single_json("two_cs_one_addr"),
            &[pattern(8192, 3)],
            HardwareProfile::Rev24F,
        );
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        let mapping = HardwareProfile::Rev24F.mapping();

        let short = vec![0u8; 1000];
        let (engine, warned) = warnings(|| Engine::new(&set, &short, &mapping, false));
        assert_eq!(engine.table().as_ptr(), set.table().as_ptr());
        assert_eq!(engine.masks().index_mask, 0x3FFF);
        assert_warned(&warned, "serving the set's own");

        // Every address still lands inside the table
        let accesses = [0x3BFF, 0x01FF];
        let mut bus = SimBus::new(script(&accesses, CS1), CS1, |raw| raw & CS1 == 0);
        engine.serve(&mut bus, &mut RuntimeInfo::new());
        bus.check_clean();
        assert_eq!(bus.selects, 2);
    }

    // ========================================================================
    // Self-correction
    // ========================================================================

    #[test]
    fn test_serve_alg_self_correction() {
        let serve_alg_byte = LAYOUT_HEADER_LEN + SET_SERVE_ALG;

        // Single image recorded as any CS
        let mut blob = build(
            &single_json("two_cs_one_addr"),
            &[pattern(8192, 0)],
            HardwareProfile::Rev24F,
        );
        blob[serve_alg_byte] = ServeAlg::AddrOnAnyCs.wire_value();
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        assert_eq!(set.serve_alg(), ServeAlg::AddrOnAnyCs);
        let mapping = HardwareProfile::Rev24F.mapping();
        let (engine, warned) = warnings(|| Engine::new(&set, set.table(), &mapping, false));
        assert_eq!(engine.serve_alg(), ServeAlg::TwoCsOneAddr);
        assert_warned(&warned, "corrected to two CS one address");

        // Multi-image recorded as single CS algorithms
        for alg in [ServeAlg::TwoCsOneAddr, ServeAlg::AddrOnCs] {
            let mut blob = build(MULTI_JSON, &multi_files(), HardwareProfile::Rev24F);
            blob[serve_alg_byte] = alg.wire_value();
            let layout = Layout::parse(&blob).unwrap();
            let set = layout.set(0).unwrap();
            let (engine, warned) = warnings(|| Engine::new(&set, set.table(), &mapping, false));
            assert_eq!(engine.serve_alg(), ServeAlg::AddrOnAnyCs);
            assert_warned(&warned, "corrected to address on any CS");
        }

        // Nothing to correct, nothing logged
        let blob = build(
            &single_json("addr_on_cs"),
            &[pattern(8192, 0)],
            HardwareProfile::Rev24F,
        );
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        let (engine, warned) = warnings(|| Engine::new(&set, set.table(), &mapping, false));
        assert_eq!(engine.serve_alg(), ServeAlg::AddrOnCs);
        assert!(warned.is_empty(), "{warned:?}");
    }

    // ========================================================================
    // Parser view
    // ========================================================================

    #[test]
    fn test_runtime_info_readable_by_parser() {
        let blob = build(
            &single_json("addr_on_cs"),
            &[pattern(8192, 2)],
            HardwareProfile::Rev24F,
        );
        let layout = Layout::parse(&blob).unwrap();
        let set = layout.set(0).unwrap();
        let mapping = HardwareProfile::Rev24F.mapping();
        let engine = Engine::new(&set, set.table(), &mapping, true);

        let mut info = RuntimeInfo::new();
        info.publish(4, 0, true, set.table());
        let accesses = [mapping.scatter_addr(7, ChipClass::Chip2364)];
        let mut bus = SimBus::new(script(&accesses, CS1), CS1, |raw| raw & CS1 == 0);
        engine.serve(&mut bus, &mut info);

        let parsed = retrorom_fw_parser::parse_runtime_info(&info.to_bytes()).unwrap();
        assert_eq!(parsed.image_sel, 4);
        assert_eq!(parsed.rom_set_index, 0);
        assert!(parsed.count_rom_access);
        assert_eq!(parsed.access_count, 1);
        assert_eq!(parsed.rom_table_size, 16384);

        let parsed = retrorom_fw_parser::parse_layout(&blob).unwrap();
        assert_eq!(parsed.rom_sets.len(), 1);
        assert_eq!(parsed.rom_sets[0].serve_alg, ServeAlg::AddrOnCs);
    }
}
