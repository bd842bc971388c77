// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

// Must match retrorom_config::layout::LAYOUT_MAGIC
const LAYOUT_MAGIC: &[u8; 16] = b"RETROROM_LAYOUT\0";

fn main() {
    // Set up STM32 linking
    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");

    // Police features
    let mcus = [
        cfg!(feature = "f401re"),
        cfg!(feature = "f411re"),
        cfg!(feature = "f405rg"),
        cfg!(feature = "f446re"),
    ];
    if mcus.iter().filter(|&&f| f).count() != 1 {
        panic!("Exactly one of 'f401re', 'f411re', 'f405rg' or 'f446re' features must be enabled");
    }
    let revs = [
        cfg!(feature = "hw-24-d"),
        cfg!(feature = "hw-24-e"),
        cfg!(feature = "hw-24-f"),
    ];
    if revs.iter().filter(|&&f| f).count() != 1 {
        panic!("Exactly one of 'hw-24-d', 'hw-24-e' or 'hw-24-f' features must be enabled");
    }

    set_cargo_runner();
    generate_memory_x();
    copy_blob();
}

fn chip() -> (&'static str, usize, usize) {
    // Part, flash KB, RAM KB
    if cfg!(feature = "f401re") {
        ("STM32F401RETx", 512, 96)
    } else if cfg!(feature = "f405rg") {
        ("STM32F405RGTx", 1024, 128)
    } else if cfg!(feature = "f411re") {
        ("STM32F411RETx", 512, 128)
    } else {
        ("STM32F446RETx", 512, 128)
    }
}

fn set_cargo_runner() {
    const RUN_CMD_PREFIX: &str = "probe-rs run --no-location --chip ";

    let (chip_id, _, _) = chip();
    let runner_cmd = format!("{RUN_CMD_PREFIX}{chip_id}");
    let script = format!(
        r#"#!/bin/bash
echo "-----"
echo Running {runner_cmd} "$@"
echo "-----"
{runner_cmd} "$@"
"#
    );

    let out_dir = env::var("OUT_DIR").unwrap();
    let runner_path = format!("{out_dir}/runner.sh");

    fs::write(&runner_path, script).unwrap();
    fs::set_permissions(&runner_path, fs::Permissions::from_mode(0o755)).unwrap();
}

// Creates memory.x, reserving the start of RAM for the runtime info so
// probes can find it at a fixed address.  It is NOLOAD - the firmware
// initialises it before selecting a ROM set.
fn generate_memory_x() {
    const STM32_FLASH_START: usize = 0x08000000;
    const STM32_RAM_START: usize = 0x20000000;
    const RUNTIME_INFO_AREA: usize = 256;
    const NEW_RAM_START: usize = STM32_RAM_START + RUNTIME_INFO_AREA;
    const RUNTIME_INFO_SECTION: &str = ".retrorom_runtime_info";

    let (chip_id, flash_kb, ram_kb) = chip();
    let out_dir = env::var("OUT_DIR").unwrap();
    let memory_path = Path::new(&out_dir).join("memory.x");

    let memory_x = format!(
        r#"
/* {chip_id} memory layout */
MEMORY
{{
    FLASH   : ORIGIN = {STM32_FLASH_START:#010X}, LENGTH = {flash_kb}K
    PRIVATE : ORIGIN = {STM32_RAM_START:#010X}, LENGTH = {RUNTIME_INFO_AREA:#05X}
    RAM     : ORIGIN = {NEW_RAM_START:#010X}, LENGTH = {ram_kb}K - {RUNTIME_INFO_AREA:#05X}
}}

/* Runtime information, at the start of RAM */
SECTIONS
{{
    {RUNTIME_INFO_SECTION} (NOLOAD) : {{
        KEEP(*({RUNTIME_INFO_SECTION}*))
    }} > PRIVATE
}}
INSERT AFTER .uninit;

_SEGGER_RTT_ADDRESS = ABSOLUTE(_SEGGER_RTT);
"#
    );

    fs::write(memory_path, memory_x).unwrap();

    println!("cargo:rustc-link-search={out_dir}");
}

// Copies the ROM blob named by RETROROM_BLOB into OUT_DIR for embedding
fn copy_blob() {
    println!("cargo:rerun-if-env-changed=RETROROM_BLOB");

    let Ok(path) = env::var("RETROROM_BLOB") else {
        panic!("RETROROM_BLOB must be set to a blob built by retrorom-gen");
    };
    println!("cargo:rerun-if-changed={path}");

    let blob = fs::read(&path).unwrap_or_else(|e| panic!("Failed to read {path}: {e}"));
    if !blob.starts_with(LAYOUT_MAGIC) {
        panic!("{path} is not a retrorom blob");
    }

    let (_, flash_kb, _) = chip();
    if blob.len() > flash_kb * 1024 {
        panic!("{path} is {} bytes, too large for {flash_kb}KB flash", blob.len());
    }

    let out_dir = env::var("OUT_DIR").unwrap();
    fs::write(Path::new(&out_dir).join("blob.bin"), blob).unwrap();
}
