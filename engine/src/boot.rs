// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! One-shot bootstrap, from reset to serving.
//!
//! The order matters: the bootloader check happens before anything
//! reconfigures the clocks, and nothing is logged once serving starts.

use core::fmt;

use log::{debug, error, info, warn};

use retrorom_config::fw::DataSource;
use retrorom_config::hw::PinMapping;
use retrorom_config::mcu::Variant;

use crate::bus::{Bus, StatusLed};
use crate::fault::{FaultKind, signal_fault};
use crate::layout::{Layout, LayoutError};
use crate::runtime::RuntimeInfo;
use crate::select::{Selection, maintenance_requested, selection};
use crate::serve::Engine;

/// Firmware build time settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Requested system clock
    pub sysclk_mhz: u32,

    /// Whether to copy the table to RAM before serving
    pub data_source: DataSource,

    /// Whether to maintain [`RuntimeInfo::access_count`]
    pub count_access: bool,

    /// Whether fitting every jumper enters the bootloader
    pub maintenance: bool,

    /// Whether to signal faults on the status LED
    pub status_led: bool,
}

impl BootConfig {
    /// Defaults for `variant`: full speed, serving from flash.
    pub const fn new(variant: Variant) -> Self {
        Self {
            sysclk_mhz: variant.max_sysclk_mhz(),
            data_source: DataSource::Flash,
            count_access: false,
            maintenance: true,
            status_led: true,
        }
    }
}

/// What the running hardware reports about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detected {
    pub device_id: u16,
    pub flash_kb: usize,
}

/// The device, as far as bootstrap is concerned.
pub trait Platform {
    type Bus: Bus;
    type Led: StatusLed;

    /// Reads the port carrying the image select jumpers, with their pulls
    /// applied.
    fn read_sel_port(&mut self, mapping: &PinMapping) -> u32;

    /// Hands over to the MCU's built-in bootloader.
    fn enter_maintenance(&mut self) -> !;

    /// Configures the system clock, returning the frequency achieved.
    fn configure_clock(&mut self, mhz: u32) -> u32;

    fn detect(&mut self) -> Detected;

    /// Sets up the address, chip select and data pins.
    fn init_bus(&mut self, mapping: &PinMapping) -> Self::Bus;

    fn status_led(&mut self, mapping: &PinMapping) -> Option<Self::Led>;
}

/// Reasons bootstrap cannot reach the serving loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    Layout(LayoutError),
    NoSetSelected,
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::Layout(e) => write!(f, "Bad ROM layout: {e}"),
            BootError::NoSetSelected => write!(f, "No ROM set selected"),
        }
    }
}

impl From<LayoutError> for BootError {
    fn from(e: LayoutError) -> Self {
        BootError::Layout(e)
    }
}

/// Everything needed to start serving
pub struct Prepared<'a, B> {
    pub bus: B,
    pub engine: Engine<'a>,
    pub selection: Selection,
}

/// Runs bootstrap up to the point of serving.
///
/// `ram` receives a copy of the selected table when the configuration asks
/// for one.  `info` is published before returning.
pub fn prepare<'a, P: Platform>(
    platform: &mut P,
    blob: &'a [u8],
    mapping: &PinMapping,
    variant: Variant,
    config: &BootConfig,
    ram: Option<&'a mut [u8]>,
    info: &mut RuntimeInfo,
) -> Result<Prepared<'a, P::Bus>, BootError> {
    // Must come before the clock is touched
    let sel_raw = platform.read_sel_port(mapping);
    if maintenance_requested(mapping, sel_raw, config.maintenance) {
        info!("Entering bootloader");
        platform.enter_maintenance();
    }

    let achieved = platform.configure_clock(config.sysclk_mhz);
    if achieved != config.sysclk_mhz {
        warn!("SYSCLK {achieved}MHz, requested {}MHz", config.sysclk_mhz);
    } else {
        debug!("SYSCLK: {achieved}MHz");
    }

    report_hardware(platform.detect(), variant);

    let layout = Layout::parse(blob)?;
    log_sets(&layout);

    let selection =
        selection(mapping, sel_raw, layout.set_count()).ok_or(BootError::NoSetSelected)?;
    info!("ROM sel/index {}/{}", selection.image_sel, selection.set_index);
    let set = layout
        .set(selection.set_index)
        .ok_or(BootError::NoSetSelected)?;

    let bus = platform.init_bus(mapping);

    let len = set.table().len();
    let table: &'a [u8] = match (config.data_source, ram) {
        (DataSource::Ram, Some(ram)) if ram.len() >= len => {
            let copy = &mut ram[..len];
            copy.copy_from_slice(set.table());
            info!("ROM {} preloaded to RAM", selection.set_index);
            &*copy
        }
        (DataSource::Ram, _) => {
            warn!("No room to preload {len} byte ROM table, serving from flash");
            set.table()
        }
        (DataSource::Flash, _) => set.table(),
    };

    info.publish(
        selection.image_sel,
        selection.set_index,
        config.count_access,
        table,
    );

    let engine = Engine::new(&set, table, mapping, config.count_access);
    debug!("Serving algorithm: {}", engine.serve_alg());

    Ok(Prepared {
        bus,
        engine,
        selection,
    })
}

/// Boots and serves forever.  A blob that can't be served is signalled as
/// a fault.
pub fn run<'a, P: Platform>(
    platform: &mut P,
    blob: &'a [u8],
    mapping: &PinMapping,
    variant: Variant,
    config: &BootConfig,
    ram: Option<&'a mut [u8]>,
    info: &mut RuntimeInfo,
) -> ! {
    match prepare(platform, blob, mapping, variant, config, ram, info) {
        Ok(mut prepared) => {
            info!("Start main loop - logging ends");
            loop {
                prepared.engine.serve(&mut prepared.bus, info);
            }
        }
        Err(e) => {
            error!("{e}");
            let mut led = if config.status_led {
                platform.status_led(mapping)
            } else {
                None
            };
            signal_fault(led.as_mut(), FaultKind::Unexpected)
        }
    }
}

fn report_hardware(detected: Detected, variant: Variant) {
    info!(
        "Detected device ID {:#05X}, {}KB flash",
        detected.device_id, detected.flash_kb
    );
    if detected.device_id != variant.device_id() {
        warn!(
            "Firmware built for {variant} (device ID {:#05X})",
            variant.device_id()
        );
    }
    if detected.flash_kb != variant.flash_kb() {
        warn!(
            "Firmware built for {}KB flash, found {}KB",
            variant.flash_kb(),
            detected.flash_kb
        );
    }
}

fn log_sets(layout: &Layout<'_>) {
    info!("ROM sets: {}", layout.set_count());
    for set in layout.sets() {
        info!(
            "Set {}: {} image(s), {}",
            set.index(),
            set.image_count(),
            set.serve_alg()
        );
        for image in set.images() {
            debug!(
                "  {} {} CS1 {}",
                image.filename.unwrap_or("-"),
                image.class,
                image.cs1
            );
        }
    }
}
