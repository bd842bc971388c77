// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Loads the ROM configuration, hardware description and ROM files, and
//! builds the firmware blob.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{debug, info};

use retrorom_config::fw::ServeAlg;
use retrorom_config::hw::{HardwareProfile, PinMapping};
use retrorom_config::mcu::Variant;
use retrorom_fw_parser::LayoutInfo;
use retrorom_gen::builder::{BuildProperties, Builder, FileData};

use crate::args::HwArg;

/// Everything needed for one build
#[derive(Debug, Clone)]
pub struct Job {
    pub config: PathBuf,
    pub hw: HwArg,
    pub mcu: Variant,
    pub serve_alg: ServeAlg,
    pub filenames: bool,
}

/// A built blob and its description
#[derive(Debug)]
pub struct Generated {
    pub blob: Vec<u8>,
    pub description: String,
    pub layout: LayoutInfo,
}

/// Resolves the hardware argument into a profile, loading and validating
/// a pin mapping file if given one.
pub fn load_hardware(hw: &HwArg) -> Result<HardwareProfile> {
    match hw {
        HwArg::Profile(profile) => Ok(*profile),
        HwArg::File(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read pin mapping {}", path.display()))?;
            let mapping: PinMapping = serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse pin mapping {}", path.display()))?;
            mapping
                .validate()
                .with_context(|| format!("Invalid pin mapping {}", path.display()))?;
            Ok(HardwareProfile::Custom(mapping))
        }
    }
}

// ROM files live alongside the config unless given absolute paths
fn rom_path(config: &Path, file: &str) -> PathBuf {
    let file = Path::new(file);
    if file.is_absolute() {
        return file.to_path_buf();
    }
    config
        .parent()
        .map(|dir| dir.join(file))
        .unwrap_or_else(|| file.to_path_buf())
}

/// Reads each ROM file the builder asks for.
pub fn load_files(builder: &mut Builder, config: &Path) -> Result<()> {
    for spec in builder.file_specs() {
        let path = rom_path(config, &spec.source);
        let data = fs::read(&path)
            .with_context(|| format!("Failed to read ROM file {}", path.display()))?;
        debug!(
            "Loaded {} ({} bytes) for a {} ROM",
            path.display(),
            data.len(),
            spec.class
        );
        builder
            .add_file(FileData { id: spec.id, data })
            .with_context(|| format!("Failed to add ROM file {}", path.display()))?;
    }
    Ok(())
}

/// Builds the blob for `job`.
pub fn generate(job: &Job) -> Result<Generated> {
    let json = fs::read_to_string(&job.config)
        .with_context(|| format!("Failed to read config {}", job.config.display()))?;
    let mut builder = Builder::from_json(&json)
        .with_context(|| format!("Invalid config {}", job.config.display()))?;

    let profile = load_hardware(&job.hw)?;
    info!("Building for hardware {profile}, MCU {}", job.mcu);

    load_files(&mut builder, &job.config)?;

    let props = BuildProperties {
        profile,
        mcu: job.mcu,
        serve_alg: job.serve_alg,
        filenames: job.filenames,
    };
    let blob = builder.build(&props).context("Failed to build firmware blob")?;

    // Read back what was written, as the firmware will
    let layout = match retrorom_fw_parser::parse_layout(&blob) {
        Ok(layout) => layout,
        Err(e) => bail!("Built blob failed to parse: {e}"),
    };

    Ok(Generated {
        blob,
        description: builder.description(),
        layout,
    })
}

/// Per-set summary lines
pub fn summary(layout: &LayoutInfo) -> Vec<String> {
    let mut lines = Vec::new();
    for set in &layout.rom_sets {
        lines.push(set.to_string());
        for rom in &set.roms {
            lines.push(format!("  {rom}"));
        }
    }
    lines
}
