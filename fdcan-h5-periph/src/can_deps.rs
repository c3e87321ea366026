//! [`Dependencies`] of FDCAN1
//!
//! Routes PA11 (RX) and PA12 (TX) to the controller and keeps hold of the
//! clock control, so that the kernel clock cannot be reconfigured while the
//! driver runs.

use crate::rcc::Clocks;
use fdcan_h5_core::{
    Dependencies, Fdcan1, PeripheralClocks, PeripheralId, PinConfig, PinError, PinMux, Port,
};
use fugit::HertzU32;

/// Alternate function of the FDCAN1 pins on port A
pub const FDCAN1_AF: u8 = 9;
/// FDCAN1 receive pin on port A
pub const RX_PIN: u8 = 11;
/// FDCAN1 transmit pin on port A
pub const TX_PIN: u8 = 12;

/// Clocks and pins of FDCAN1
pub struct CanDependencies<C> {
    clocks_ctl: C,
    clocks: Clocks,
}

impl<C: PeripheralClocks> CanDependencies<C> {
    /// Routes the CAN pins and takes over the clock control.
    ///
    /// # Safety
    /// At most one instance may exist at a time, and `clocks` must be the
    /// frequencies the clock tree actually runs at.
    pub unsafe fn new(
        pins: &mut impl PinMux,
        clocks_ctl: C,
        clocks: Clocks,
    ) -> Result<Self, PinError> {
        let config = PinConfig::alternate(FDCAN1_AF);
        pins.configure_pin(Port::A, RX_PIN, config)?;
        pins.configure_pin(Port::A, TX_PIN, config)?;
        Ok(Self { clocks_ctl, clocks })
    }

    /// Gives back the clock control. The pins stay routed.
    pub fn release(self) -> C {
        self.clocks_ctl
    }
}

// Safety: Construction routes the pins and the struct owns the clock control
// for its whole lifetime.
unsafe impl<C: PeripheralClocks> Dependencies for CanDependencies<C> {
    type Id = Fdcan1;

    fn enable_clock(&mut self) {
        self.clocks_ctl
            .enable_peripheral_clock(PeripheralId::Fdcan1);
    }

    fn host_clock(&self) -> HertzU32 {
        self.clocks.hclk
    }

    fn can_clock(&self) -> HertzU32 {
        self.clocks.fdcan
    }
}
