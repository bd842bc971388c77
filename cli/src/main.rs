// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! retrorom-gen
//!
//! Builds the firmware blob embedded into the retrorom firmware from a ROM
//! configuration and the ROM files it names.

mod args;
mod generate;

use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use retrorom_config::hw::HardwareProfile;

use crate::args::Args;
use crate::generate::{Job, generate, summary};

fn list_hw() {
    println!("Built-in hardware revisions:");
    for profile in HardwareProfile::BUILT_IN {
        let mapping = profile.mapping();
        println!(
            "  {profile}: {} select jumper(s), up to {} image(s) per set",
            mapping.sel_count(),
            mapping.max_set_images()
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    if args.list_hw {
        list_hw();
        return Ok(());
    }

    let Some(config) = args.config.clone() else {
        anyhow::bail!("--config is required");
    };

    let job = Job {
        config,
        hw: args.hw.clone(),
        mcu: args.mcu,
        serve_alg: args.serve_alg,
        filenames: args.filenames,
    };
    let generated = generate(&job)?;

    fs::write(&args.output, &generated.blob)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!("Wrote {} bytes to {}", generated.blob.len(), args.output.display());

    println!("{}", generated.description);
    println!();
    for line in summary(&generated.layout) {
        println!("{line}");
    }
    println!();
    println!(
        "Firmware blob: {} ({} bytes)",
        args.output.display(),
        generated.blob.len()
    );

    Ok(())
}
