// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! STM32F4 implementation of the engine's hardware seams, driving the GPIO
//! registers directly.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_stm32::pac;
use embassy_stm32::pac::gpio::{Gpio, regs, vals};
use embassy_stm32::rcc::clocks;

use retrorom_config::hw::{JumperPull, PinMapping, Port};
use retrorom_engine::{Bus, Detected, Platform, StatusLed};

use crate::rcc;

// Built-in bootloader, in system memory
const SYSTEM_MEMORY: usize = 0x1FFF_0000;

// DBGMCU_IDCODE and the flash size register
const IDCODE_ADDR: usize = 0xE004_2000;
const FLASH_SIZE_ADDR: usize = 0x1FFF_7A22;

// HSI until the PLL is running
static SYSCLK_MHZ: AtomicU32 = AtomicU32::new(16);

fn gpio(port: Port) -> Gpio {
    match port {
        Port::A => pac::GPIOA,
        Port::B => pac::GPIOB,
        Port::C => pac::GPIOC,
        Port::D => pac::GPIOD,
    }
}

fn enable_port(port: Port) {
    pac::RCC.ahb1enr().modify(|w| match port {
        Port::A => w.set_gpioaen(true),
        Port::B => w.set_gpioben(true),
        Port::C => w.set_gpiocen(true),
        Port::D => w.set_gpioden(true),
    });
}

fn pin_mask(pins: impl Iterator<Item = u8>) -> u32 {
    pins.fold(0, |mask, pin| mask | (1 << pin))
}

// MODER value with every pin in `mask` set to `mode`
fn moder_with(moder: u32, mask: u32, mode: u32) -> u32 {
    (0..16)
        .filter(|pin| mask & (1 << pin) != 0)
        .fold(moder, |moder, pin| (moder & !(0b11 << (pin * 2))) | (mode << (pin * 2)))
}

fn busy_wait_ms(ms: u32) {
    let cycles = SYSCLK_MHZ.load(Ordering::Relaxed) * 1000;
    for _ in 0..ms {
        cortex_m::asm::delay(cycles);
    }
}

/// The ROM socket's address, chip select and data lines
pub struct GpioBus {
    addr_cs: Gpio,
    data: Gpio,
    data_mask: u32,
    moder_in: regs::Moder,
    moder_out: regs::Moder,
}

impl GpioBus {
    fn new(mapping: &PinMapping) -> Self {
        enable_port(mapping.ports.addr);
        enable_port(mapping.ports.data);

        // Every address and chip select line any class uses, plus the
        // multi-image select lines, as floating inputs
        let addr_cs = gpio(mapping.ports.addr);
        let inputs = pin_mask(
            mapping
                .addr
                .iter()
                .flatten()
                .chain(mapping.x1.iter())
                .chain(mapping.x2.iter())
                .copied(),
        ) | pin_mask(
            [mapping.cs1, mapping.cs2, mapping.cs3]
                .iter()
                .flat_map(|pins| [pins.chip_2316, pins.chip_2332, pins.chip_2364])
                .flatten(),
        );
        for pin in (0..16).filter(|pin| inputs & (1 << pin) != 0) {
            addr_cs.moder().modify(|w| w.set_moder(pin, vals::Moder::INPUT));
            addr_cs.pupdr().modify(|w| w.set_pupdr(pin, vals::Pupdr::FLOATING));
        }

        let data = gpio(mapping.ports.data);
        let data_mask = pin_mask(mapping.data.iter().copied());
        for pin in (0..16).filter(|pin| data_mask & (1 << pin) != 0) {
            data.otyper().modify(|w| w.set_ot(pin, vals::Ot::PUSH_PULL));
            data.ospeedr().modify(|w| w.set_ospeedr(pin, vals::Ospeedr::VERY_HIGH_SPEED));
            data.pupdr().modify(|w| w.set_pupdr(pin, vals::Pupdr::FLOATING));
        }

        // Precomputed so switching direction is a single write
        let moder = data.moder().read().0;
        let moder_in = regs::Moder(moder_with(moder, data_mask, 0b00));
        let moder_out = regs::Moder(moder_with(moder, data_mask, 0b01));
        data.moder().write_value(moder_in);

        Self {
            addr_cs,
            data,
            data_mask,
            moder_in,
            moder_out,
        }
    }
}

impl Bus for GpioBus {
    #[inline(always)]
    fn read_addr_cs(&mut self) -> u32 {
        self.addr_cs.idr().read().0
    }

    #[inline(always)]
    fn write_data(&mut self, byte: u8) {
        let set = byte as u32 & self.data_mask;
        let reset = !(byte as u32) & self.data_mask;
        self.data.bsrr().write_value(regs::Bsrr(set | (reset << 16)));
    }

    #[inline(always)]
    fn data_outputs(&mut self) {
        self.data.moder().write_value(self.moder_out);
    }

    #[inline(always)]
    fn data_inputs(&mut self) {
        self.data.moder().write_value(self.moder_in);
    }
}

/// Active low status LED
pub struct Led {
    port: Gpio,
    pin: usize,
}

impl Led {
    pub fn new(mapping: &PinMapping) -> Option<Self> {
        let pin = mapping.status? as usize;
        enable_port(mapping.ports.status);
        let port = gpio(mapping.ports.status);
        port.bsrr().write(|w| w.set_bs(pin, true));
        port.moder().modify(|w| w.set_moder(pin, vals::Moder::OUTPUT));
        port.otyper().modify(|w| w.set_ot(pin, vals::Ot::PUSH_PULL));
        port.pupdr().modify(|w| w.set_pupdr(pin, vals::Pupdr::FLOATING));
        Some(Self { port, pin })
    }
}

impl StatusLed for Led {
    fn on(&mut self) {
        self.port.bsrr().write(|w| w.set_br(self.pin, true));
    }

    fn off(&mut self) {
        self.port.bsrr().write(|w| w.set_bs(self.pin, true));
    }

    fn delay_ms(&mut self, ms: u32) {
        busy_wait_ms(ms);
    }
}

/// The STM32F4 itself
pub struct Stm32;

impl Platform for Stm32 {
    type Bus = GpioBus;
    type Led = Led;

    fn read_sel_port(&mut self, mapping: &PinMapping) -> u32 {
        enable_port(mapping.ports.sel);
        let port = gpio(mapping.ports.sel);
        let pull = match mapping.sel_pull {
            JumperPull::Down => vals::Pupdr::PULL_DOWN,
            JumperPull::Up => vals::Pupdr::PULL_UP,
        };
        for pin in mapping.sel.iter().flatten() {
            port.moder().modify(|w| w.set_moder(*pin as usize, vals::Moder::INPUT));
            port.pupdr().modify(|w| w.set_pupdr(*pin as usize, pull));
        }

        // Let the pulls settle
        cortex_m::asm::delay(1000);

        port.idr().read().0
    }

    fn enter_maintenance(&mut self) -> ! {
        // Clocks are still at reset, as the bootloader requires
        unsafe { cortex_m::asm::bootload(SYSTEM_MEMORY as *const u32) }
    }

    fn configure_clock(&mut self, mhz: u32) -> u32 {
        let mut config = embassy_stm32::Config::default();
        let configured = rcc::configure_hsi(&mut config, mhz);
        let p = embassy_stm32::init(config);

        let achieved = clocks(&p.RCC)
            .sys
            .to_hertz()
            .map(|hz| hz.0 / 1_000_000)
            .unwrap_or(configured);
        SYSCLK_MHZ.store(achieved, Ordering::Relaxed);
        achieved
    }

    fn detect(&mut self) -> Detected {
        // Both registers are always readable
        let idcode = unsafe { core::ptr::read_volatile(IDCODE_ADDR as *const u32) };
        let flash_kb = unsafe { core::ptr::read_volatile(FLASH_SIZE_ADDR as *const u16) };
        Detected {
            device_id: (idcode & 0xFFF) as u16,
            flash_kb: flash_kb as usize,
        }
    }

    fn init_bus(&mut self, mapping: &PinMapping) -> GpioBus {
        GpioBus::new(mapping)
    }

    fn status_led(&mut self, mapping: &PinMapping) -> Option<Led> {
        Led::new(mapping)
    }
}

