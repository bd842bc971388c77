// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Tests for the combined image codec
//!
//! Checks the properties the firmware relies on when it serves straight
//! from a raw port read:
//! - every logical address decodes back to the source byte
//! - bits the image doesn't use never change the byte served
//! - multi-image sets resolve overlapping selects by position
//! - nothing selected serves the no-chip filler

#[cfg(test)]
mod tests {
    use retrorom_config::chip::{ChipClass, CsLogic};
    use retrorom_config::fw::ServeAlg;
    use retrorom_config::hw::{HardwareProfile, PinMapping};
    use retrorom_gen::{
        CsConfig, Error, Metadata, PAD_NO_CHIP_BYTE, RomImage, RomSet, RomSetType, SizeHandling,
        decode, encode,
    };

    fn mapping() -> PinMapping {
        HardwareProfile::Rev24F.mapping()
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len)
            .map(|ii| ((ii * 13) as u8) ^ ((ii >> 8) as u8) ^ seed)
            .collect()
    }

    fn image(index: usize, source: &[u8], class: ChipClass, cs: CsConfig) -> RomImage {
        RomImage::from_raw_rom_image(
            index,
            format!("rom{index}.bin"),
            None,
            source,
            class,
            cs,
            SizeHandling::None,
        )
        .unwrap()
    }

    fn full_cs(class: ChipClass) -> CsConfig {
        match class {
            ChipClass::Chip2316 => CsConfig::new(
                CsLogic::ActiveLow,
                Some(CsLogic::ActiveHigh),
                Some(CsLogic::ActiveLow),
            ),
            ChipClass::Chip2332 => {
                CsConfig::new(CsLogic::ActiveLow, Some(CsLogic::ActiveHigh), None)
            }
            ChipClass::Chip2364 => CsConfig::new(CsLogic::ActiveLow, None, None),
        }
    }

    fn single(class: ChipClass, source: &[u8]) -> RomSet {
        RomSet::new(
            0,
            RomSetType::Single,
            ServeAlg::TwoCsOneAddr,
            vec![image(0, source, class, full_cs(class))],
        )
        .unwrap()
    }

    fn multi(class: ChipClass, sources: &[Vec<u8>], cs1: CsLogic) -> RomSet {
        let images = sources
            .iter()
            .enumerate()
            .map(|(ii, source)| image(ii, source, class, CsConfig::new(cs1, None, None)))
            .collect();
        RomSet::new(1, RomSetType::Multi, ServeAlg::TwoCsOneAddr, images).unwrap()
    }

    // Every subset of `mask`, including the empty one
    fn subsets(mask: u32) -> Vec<u32> {
        let mut out = Vec::new();
        let mut sub = mask;
        loop {
            out.push(sub);
            if sub == 0 {
                break;
            }
            sub = (sub - 1) & mask;
        }
        out
    }

    const SAMPLE_ADDRS: [usize; 6] = [0, 1, 0x2A5, 0x400, 0x7FF, 0x1FFF];

    #[test]
    fn test_single_round_trip_all_classes() {
        let mapping = mapping();
        for class in ChipClass::ALL {
            let source = pattern(class.size_bytes(), 0x5A);
            let set = single(class, &source);
            let table = encode(&set, &mapping).unwrap();
            assert_eq!(table.len(), 16384);

            for addr in 0..class.size_bytes() {
                let phys = set.physical_index(0, addr, &mapping);
                assert_eq!(
                    decode(table.as_bytes()[phys], &mapping),
                    source[addr],
                    "{class} addr {addr:#x}"
                );
            }
        }
    }

    #[test]
    fn test_multi_round_trip() {
        let mapping = mapping();
        for class in ChipClass::ALL {
            let sources: Vec<Vec<u8>> = (0..3)
                .map(|ii| pattern(class.size_bytes(), ii as u8 * 0x31))
                .collect();
            for cs1 in [CsLogic::ActiveLow, CsLogic::ActiveHigh] {
                let set = multi(class, &sources, cs1);
                let table = encode(&set, &mapping).unwrap();
                assert_eq!(table.len(), 65536);

                for (position, source) in sources.iter().enumerate() {
                    for addr in SAMPLE_ADDRS.iter().map(|a| a % class.size_bytes()) {
                        let phys = set.physical_index(position, addr, &mapping);
                        assert_eq!(decode(table.as_bytes()[phys], &mapping), source[addr]);
                    }
                }
            }
        }
    }

    #[test]
    fn test_single_dont_care_bits() {
        let mapping = mapping();
        for class in ChipClass::ALL {
            let set = single(class, &pattern(class.size_bytes(), 3));
            let table = encode(&set, &mapping).unwrap();
            let dont_care = set.dont_care_mask(0, &mapping);

            // Chip selects are tested by the firmware, not the table
            assert_ne!(dont_care & (1 << 10), 0);

            for addr in SAMPLE_ADDRS.iter().map(|a| a % class.size_bytes()) {
                let phys = set.physical_index(0, addr, &mapping) as u32;
                let expected = table.byte(phys);
                for bits in subsets(dont_care) {
                    assert_eq!(table.byte(phys ^ bits), expected, "{class} {bits:#x}");
                }
            }
        }
    }

    #[test]
    fn test_multi_dont_care_bits() {
        let mapping = mapping();
        let class = ChipClass::Chip2316;
        let sources: Vec<Vec<u8>> = (0..3).map(|ii| pattern(2048, ii * 7)).collect();
        let set = multi(class, &sources, CsLogic::ActiveLow);
        let table = encode(&set, &mapping).unwrap();

        for position in 0..3 {
            let dont_care = set.dont_care_mask(position, &mapping);
            // The 2316's upper address pins mirror the image
            assert_ne!(dont_care & (1 << 9), 0);
            assert_ne!(dont_care & (1 << 12), 0);

            for &addr in &[0usize, 0x155, 0x7FF] {
                let phys = set.physical_index(position, addr, &mapping) as u32;
                for bits in subsets(dont_care) {
                    assert_eq!(
                        decode(table.byte(phys ^ bits), &mapping),
                        sources[position][addr]
                    );
                }
            }
        }
    }

    #[test]
    fn test_table_masks_upper_bits() {
        let mapping = mapping();
        let source = pattern(8192, 9);
        let set = single(ChipClass::Chip2364, &source);
        let table = encode(&set, &mapping).unwrap();

        let phys = set.physical_index(0, 0x1234, &mapping) as u32;
        assert_eq!(table.byte(phys | 0xFFFF_0000 | (1 << 14)), table.byte(phys));
    }

    #[test]
    fn test_multi_precedence() {
        let mapping = mapping();
        let class = ChipClass::Chip2364;
        let sources = vec![vec![0x11; 8192], vec![0x22; 8192], vec![0x33; 8192]];
        let set = multi(class, &sources, CsLogic::ActiveLow);
        let table = encode(&set, &mapping).unwrap();

        let cs1 = 1u32 << 10;
        let x1 = 1u32 << 14;
        let x2 = 1u32 << 15;
        let addr = mapping.scatter_addr(0x100, class);

        // Active low, so a clear bit is asserted
        let served = |deasserted: u32| decode(table.byte(addr | deasserted), &mapping);
        assert_eq!(served(0), 0x11);
        assert_eq!(served(x1), 0x11);
        assert_eq!(served(cs1), 0x22);
        assert_eq!(served(cs1 | x2), 0x22);
        assert_eq!(served(cs1 | x1), 0x33);
        assert_eq!(served(cs1 | x1 | x2), PAD_NO_CHIP_BYTE);
    }

    #[test]
    fn test_multi_no_chip_active_high() {
        let mapping = mapping();
        let sources = vec![vec![0x01; 4096], vec![0x02; 4096]];
        let set = multi(ChipClass::Chip2332, &sources, CsLogic::ActiveHigh);
        let table = encode(&set, &mapping).unwrap();

        // Two image set, nothing selected and X2 ignored
        for raw in [0u32, 1 << 15, 0x3BFF] {
            assert_eq!(decode(table.byte(raw), &mapping), PAD_NO_CHIP_BYTE);
        }
        assert_eq!(decode(table.byte(1 << 14), &mapping), 0x02);
        assert_eq!(decode(table.byte((1 << 10) | (1 << 14)), &mapping), 0x01);
    }

    #[test]
    fn test_multi_mixed_cs1_rejected() {
        let images = vec![
            image(0, &[0; 8192], ChipClass::Chip2364, CsConfig::new(CsLogic::ActiveLow, None, None)),
            image(1, &[0; 8192], ChipClass::Chip2364, CsConfig::new(CsLogic::ActiveLow, None, None)),
            image(2, &[0; 8192], ChipClass::Chip2364, CsConfig::new(CsLogic::ActiveHigh, None, None)),
        ];
        let err = RomSet::new(0, RomSetType::Multi, ServeAlg::AddrOnAnyCs, images).unwrap_err();
        assert_eq!(
            err,
            Error::InconsistentCsLogic {
                first: CsLogic::ActiveLow,
                other: CsLogic::ActiveHigh
            }
        );
    }

    #[test]
    fn test_multi_cs2_must_be_ignored() {
        let cs = CsConfig::new(CsLogic::ActiveLow, Some(CsLogic::ActiveLow), None);
        let images = vec![
            image(0, &[0; 4096], ChipClass::Chip2332, cs),
            image(1, &[0; 4096], ChipClass::Chip2332, cs),
        ];
        assert!(matches!(
            RomSet::new(0, RomSetType::Multi, ServeAlg::AddrOnAnyCs, images),
            Err(Error::InconsistentCsLogic { .. })
        ));

        let cs = CsConfig::new(CsLogic::ActiveLow, Some(CsLogic::Ignore), None);
        let images = vec![
            image(0, &[0; 4096], ChipClass::Chip2332, cs),
            image(1, &[0; 4096], ChipClass::Chip2332, cs),
        ];
        let set = RomSet::new(0, RomSetType::Multi, ServeAlg::TwoCsOneAddr, images).unwrap();
        assert_eq!(set.serve_alg, ServeAlg::AddrOnAnyCs);
    }

    #[test]
    fn test_single_rejects_any_cs() {
        let images = vec![image(0, &[0; 8192], ChipClass::Chip2364, full_cs(ChipClass::Chip2364))];
        assert_eq!(
            RomSet::new(0, RomSetType::Single, ServeAlg::AddrOnAnyCs, images).unwrap_err(),
            Error::InvalidServeAlg {
                serve_alg: ServeAlg::AddrOnAnyCs
            }
        );
    }

    #[test]
    fn test_zeroed_2364_duplicated() {
        let mapping = mapping();
        let image = RomImage::from_raw_rom_image(
            0,
            "zero.bin".to_string(),
            None,
            &[0u8; 8192],
            ChipClass::Chip2364,
            full_cs(ChipClass::Chip2364),
            SizeHandling::Duplicate,
        )
        .unwrap();
        let set = RomSet::new(0, RomSetType::Single, ServeAlg::TwoCsOneAddr, vec![image]).unwrap();
        let table = encode(&set, &mapping).unwrap();

        assert_eq!(table.len(), 16 * 1024);
        for addr in [0x0000, 0x1FFF] {
            let phys = set.physical_index(0, addr, &mapping);
            assert_eq!(decode(table.as_bytes()[phys], &mapping), 0);
        }
    }

    #[test]
    fn test_unsupported_mapping() {
        let mapping = HardwareProfile::Rev24D.mapping();
        let sources = vec![vec![0; 8192], vec![0; 8192]];
        let set = multi(ChipClass::Chip2364, &sources, CsLogic::ActiveLow);
        assert!(matches!(
            encode(&set, &mapping),
            Err(Error::UnsupportedMapping { .. })
        ));
    }

    #[test]
    fn test_identity_data_lines() {
        let mut mapping = mapping();
        mapping.data = [0, 1, 2, 3, 4, 5, 6, 7];
        let set = single(ChipClass::Chip2364, &pattern(8192, 1));
        let table = encode(&set, &mapping).unwrap();

        let phys = set.physical_index(0, 0x42, &mapping);
        assert_eq!(table.as_bytes()[phys], set.images()[0].data()[0x42]);
    }

    #[test]
    fn test_set_count_fits_header() {
        let source = pattern(2048, 0);
        let sets: Vec<RomSet> = (0..256)
            .map(|id| {
                let cs = full_cs(ChipClass::Chip2316);
                let image = image(id, &source, ChipClass::Chip2316, cs);
                RomSet::new(id, RomSetType::Single, ServeAlg::TwoCsOneAddr, vec![image]).unwrap()
            })
            .collect();

        let metadata = Metadata::new(mapping(), sets, false);
        let mut buf = Vec::new();
        assert_eq!(
            metadata.write_all(&mut buf),
            Err(Error::TooManySets {
                count: 256,
                max: 255
            })
        );
    }
}
