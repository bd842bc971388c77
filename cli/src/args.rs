// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Command line arguments

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;

use retrorom_config::fw::ServeAlg;
use retrorom_config::hw::HardwareProfile;
use retrorom_config::mcu::Variant;

/// Where the pin mapping comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwArg {
    Profile(HardwareProfile),
    /// Pin mapping JSON file
    File(PathBuf),
}

#[derive(Parser, Debug)]
#[clap(
    name = "retrorom-gen",
    about = "retrorom firmware blob generator",
    version
)]
pub struct Args {
    /// ROM configuration JSON.  ROM files are read relative to it.
    #[clap(long, required_unless_present = "list_hw")]
    pub config: Option<PathBuf>,

    /// Hardware revision (24-d, 24-e, 24-f) or pin mapping JSON file
    #[clap(long, value_parser = parse_hw, default_value = "24-f")]
    pub hw: HwArg,

    /// MCU variant (f401re, f411re, f405rg, f446re)
    #[clap(long, value_parser = parse_mcu, default_value = "f411re")]
    pub mcu: Variant,

    /// Serving algorithm for sets which don't specify one (two_cs_one_addr, addr_on_cs)
    #[clap(long, value_parser = parse_serve_alg, default_value = "two_cs_one_addr")]
    pub serve_alg: ServeAlg,

    /// Embed ROM filenames in the blob for boot logging
    #[clap(long)]
    pub filenames: bool,

    /// Output file
    #[clap(long, short = 'o', default_value = "retrorom.bin")]
    pub output: PathBuf,

    /// Increase logging, repeat for more
    #[clap(short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// List the built-in hardware revisions and exit
    #[clap(long)]
    pub list_hw: bool,
}

impl Args {
    /// Log level from `-v`, used when `RUST_LOG` is unset
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

fn parse_hw(s: &str) -> Result<HwArg, String> {
    if let Some(profile) = HardwareProfile::try_from_str(s) {
        return Ok(HwArg::Profile(profile));
    }
    if s.ends_with(".json") {
        return Ok(HwArg::File(PathBuf::from(s)));
    }
    Err(format!(
        "Invalid hardware revision: {s}. Valid values are: 24-d, 24-e, 24-f, or a .json pin mapping file"
    ))
}

fn parse_mcu(s: &str) -> Result<Variant, String> {
    Variant::try_from_str(s).ok_or_else(|| {
        format!("Invalid MCU variant: {s}. Valid values are: f401re, f411re, f405rg, f446re")
    })
}

fn parse_serve_alg(s: &str) -> Result<ServeAlg, String> {
    match ServeAlg::try_from_str(s) {
        // Only multi-image sets may use this, and they get it anyway
        Some(ServeAlg::AddrOnAnyCs) => {
            Err("addr_on_any_cs is chosen automatically for multi-image sets".into())
        }
        Some(alg) => Ok(alg),
        None => Err(format!(
            "Invalid serve algorithm: {s}. Valid values are: two_cs_one_addr, addr_on_cs"
        )),
    }
}
