// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Hardware seams used by the engine.

/// The ROM socket, as seen by the serving loops.
///
/// Implementations must be cheap: every method is called from the hot
/// loop, so on hardware each should compile down to a single register
/// access.
pub trait Bus {
    /// Raw read of the port carrying the address and chip select lines.
    fn read_addr_cs(&mut self) -> u32;

    /// Writes an already data-mapped byte to the data port.
    fn write_data(&mut self, byte: u8);

    /// Drives the data lines.
    fn data_outputs(&mut self);

    /// Releases the data lines (high impedance).
    fn data_inputs(&mut self);

    /// Whether to keep serving.  Always true on hardware.
    #[inline(always)]
    fn serving(&self) -> bool {
        true
    }
}

/// The status LED, used for fault signalling.
pub trait StatusLed {
    fn on(&mut self);
    fn off(&mut self);
    fn delay_ms(&mut self, ms: u32);
}
