// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Fault signalling on the status LED.
//!
//! Once a processor fault has happened the ROM is never served again: the
//! status LED repeats a pattern identifying the fault until reset.

use crate::bus::StatusLed;

pub const BLINK_ON_MS: u32 = 200;
pub const BLINK_OFF_MS: u32 = 300;
pub const PATTERN_PAUSE_MS: u32 = 1500;
pub const FAST_BLINK_MS: u32 = 50;

/// Processor fault classes, each signalled differently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Nmi,
    HardFault,
    MemManage,
    BusFault,
    UsageFault,
    /// Any other exception or interrupt, or bootstrap failing
    Unexpected,
}

impl FaultKind {
    /// Blinks per repetition.  `None` is fast, continuous blinking.
    pub const fn blinks(&self) -> Option<u32> {
        match self {
            FaultKind::Nmi => Some(1),
            FaultKind::HardFault => Some(2),
            FaultKind::MemManage => Some(3),
            FaultKind::BusFault => Some(4),
            FaultKind::UsageFault => Some(5),
            FaultKind::Unexpected => None,
        }
    }
}

/// Plays one repetition of the pattern for `kind`.
pub fn blink_pattern<L: StatusLed>(led: &mut L, kind: FaultKind) {
    match kind.blinks() {
        Some(count) => {
            for _ in 0..count {
                led.on();
                led.delay_ms(BLINK_ON_MS);
                led.off();
                led.delay_ms(BLINK_OFF_MS);
            }
            led.delay_ms(PATTERN_PAUSE_MS);
        }
        None => {
            led.on();
            led.delay_ms(FAST_BLINK_MS);
            led.off();
            led.delay_ms(FAST_BLINK_MS);
        }
    }
}

/// Signals `kind` forever.  Without a status LED, parks the core.
pub fn signal_fault<L: StatusLed>(led: Option<&mut L>, kind: FaultKind) -> ! {
    match led {
        Some(led) => loop {
            blink_pattern(led, kind);
        },
        None => loop {
            core::hint::spin_loop();
        },
    }
}
