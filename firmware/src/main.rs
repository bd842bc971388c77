//! retrorom firmware

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![no_std]
#![no_main]

use cortex_m_rt::{ExceptionFrame, entry, exception};
use log::info;
use panic_rtt_target as _;

use retrorom_config::fw::DataSource;
use retrorom_config::hw::{HardwareProfile, PinMapping};
use retrorom_config::mcu::Variant;
use retrorom_engine::{BootConfig, FaultKind, RuntimeInfo, signal_fault};

mod platform;
mod rcc;

use platform::{Led, Stm32};

#[cfg(feature = "hw-24-d")]
const PROFILE: HardwareProfile = HardwareProfile::Rev24D;
#[cfg(feature = "hw-24-e")]
const PROFILE: HardwareProfile = HardwareProfile::Rev24E;
#[cfg(feature = "hw-24-f")]
const PROFILE: HardwareProfile = HardwareProfile::Rev24F;

#[cfg(feature = "f401re")]
const VARIANT: Variant = Variant::F401RE;
#[cfg(feature = "f411re")]
const VARIANT: Variant = Variant::F411RE;
#[cfg(feature = "f405rg")]
const VARIANT: Variant = Variant::F405RG;
#[cfg(feature = "f446re")]
const VARIANT: Variant = Variant::F446RE;

const MAPPING: PinMapping = PROFILE.mapping();

const BOOT_CONFIG: BootConfig = BootConfig {
    data_source: if cfg!(feature = "preload") {
        DataSource::Ram
    } else {
        DataSource::Flash
    },
    count_access: cfg!(feature = "count-access"),
    maintenance: !cfg!(feature = "no-bootloader"),
    ..BootConfig::new(VARIANT)
};

#[repr(C, align(4))]
struct Aligned<T: ?Sized>(T);

static BLOB: &Aligned<[u8]> = &Aligned(*include_bytes!(concat!(env!("OUT_DIR"), "/blob.bin")));

/// Runtime information for debug probes, at the start of RAM
#[unsafe(no_mangle)]
#[unsafe(link_section = ".retrorom_runtime_info")]
static mut RUNTIME_INFO: RuntimeInfo = RuntimeInfo::new();

// Largest combined image
#[cfg(feature = "preload")]
static mut ROM_RAM: [u8; retrorom_config::layout::MULTI_TABLE_LEN] =
    [0; retrorom_config::layout::MULTI_TABLE_LEN];

#[entry]
fn main() -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Debug);

    info!("-----");
    info!("retrorom v{}", env!("CARGO_PKG_VERSION"));
    info!("Copyright (C) 2025 Piers Finlayson");
    info!("Hardware {PROFILE}, {VARIANT}");
    info!("-----");

    // Sole references to both statics from here on
    let info = unsafe { &mut *(&raw mut RUNTIME_INFO) };
    *info = RuntimeInfo::new();

    #[cfg(feature = "preload")]
    let ram = Some(unsafe { &mut *(&raw mut ROM_RAM) }.as_mut_slice());
    #[cfg(not(feature = "preload"))]
    let ram = None;

    retrorom_engine::boot::run(
        &mut Stm32,
        &BLOB.0,
        &MAPPING,
        VARIANT,
        &BOOT_CONFIG,
        ram,
        info,
    )
}

fn fault(kind: FaultKind) -> ! {
    let mut led = Led::new(&MAPPING);
    signal_fault(led.as_mut(), kind)
}

#[exception]
unsafe fn HardFault(_ef: &ExceptionFrame) -> ! {
    fault(FaultKind::HardFault)
}

#[exception]
fn NonMaskableInt() -> ! {
    fault(FaultKind::Nmi)
}

#[exception]
fn MemoryManagement() -> ! {
    fault(FaultKind::MemManage)
}

#[exception]
fn BusFault() -> ! {
    fault(FaultKind::BusFault)
}

#[exception]
fn UsageFault() -> ! {
    fault(FaultKind::UsageFault)
}

#[exception]
unsafe fn DefaultHandler(_irqn: i16) -> ! {
    fault(FaultKind::Unexpected)
}
