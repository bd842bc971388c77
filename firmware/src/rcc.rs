// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Clock configuration

use embassy_stm32::Config;
use embassy_stm32::rcc::{
    AHBPrescaler, APBPrescaler, Pll, PllMul, PllPDiv, PllPreDiv, PllSource, Sysclk,
};

// PLL input after the pre-divider, from the 16MHz HSI
const PLL_IN_MHZ: u32 = 1;

// VCO output limits
const VCO_MIN_MHZ: u32 = 100;
const VCO_MAX_MHZ: u32 = 432;

// APB1 is limited to half the fastest parts' SYSCLK
const APB1_MAX_MHZ: u32 = 50;

/// Configures the PLL from the HSI for `mhz`, clamped to what the PLL can
/// produce.  Returns the frequency configured.
pub fn configure_hsi(config: &mut Config, mhz: u32) -> u32 {
    config.rcc.hsi = true;
    config.rcc.pll_src = PllSource::HSI;
    config.rcc.sys = Sysclk::PLL1_P;

    let (divp, div) = if mhz * 4 <= VCO_MAX_MHZ {
        (PllPDiv::DIV4, 4)
    } else {
        (PllPDiv::DIV2, 2)
    };
    let mul = (mhz * div / PLL_IN_MHZ).clamp(VCO_MIN_MHZ, VCO_MAX_MHZ);

    config.rcc.pll = Some(Pll {
        prediv: PllPreDiv::DIV16,
        mul: PllMul::from_bits(mul as u16),
        divp: Some(divp),
        divq: None,
        divr: None,
    });

    let sysclk = mul * PLL_IN_MHZ / div;
    config.rcc.ahb_pre = AHBPrescaler::DIV1;
    (config.rcc.apb1_pre, config.rcc.apb2_pre) = if sysclk > 2 * APB1_MAX_MHZ {
        (APBPrescaler::DIV4, APBPrescaler::DIV2)
    } else {
        (APBPrescaler::DIV2, APBPrescaler::DIV1)
    };

    sysclk
}
