#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

//! `fdcan-h5-core` is the thin integration layer between the STM32H503 FDCAN
//! driver ([`fdcan-h5`]) and the chip support code that owns clocks and pins
//! ([`fdcan-h5-periph`]).
//!
//! It provides
//! - typed volatile registers and bit fields ([`reg`]), used by every register
//!   block in the workspace
//! - bounded polling of status flags ([`wait`]), so that no bring-up step can
//!   hang forever on unresponsive hardware
//! - the vocabulary for pin multiplexing ([`pin`]) and peripheral clock gating
//!   ([`PeripheralClocks`])
//! - the [`CanId`] and [`Dependencies`] traits tying a CAN controller instance
//!   to its registers, its message RAM and its clock
//!
//! Traits from this crate are not supposed to be implemented by the
//! application developer; implementations are provided by `fdcan-h5-periph`.
//!
//! [`fdcan-h5`]: ../fdcan_h5/index.html
//! [`fdcan-h5-periph`]: ../fdcan_h5_periph/index.html

pub use fugit;

pub mod pin;
pub mod reg;
pub mod wait;

pub use pin::{OutputType, PinConfig, PinError, PinMode, PinMux, Port, Pull, Speed};
pub use reg::{Field, Reg};
pub use wait::{BoundedWait, TimedOut};

/// Trait representing CAN peripheral identity
///
/// Implementors are marker types naming one FDCAN instance. They convey
/// *where* the controller registers and its message RAM live, not that they
/// can be accessed. The latter is expressed by [`Dependencies`].
///
/// # Safety
/// `ADDRESS` points to the start of the register block of an FDCAN
/// controller and `MESSAGE_RAM` to the start of the message RAM region
/// assigned to that same controller.
pub unsafe trait CanId {
    /// Static address of the controller register block
    const ADDRESS: *const ();
    /// Static address of the controller message RAM
    const MESSAGE_RAM: *const ();
}

/// FDCAN1 of the STM32H503
pub enum Fdcan1 {}

// Safety: Addresses from the STM32H503 memory map.
unsafe impl CanId for Fdcan1 {
    const ADDRESS: *const () = 0x4000_A400 as *const _;
    const MESSAGE_RAM: *const () = 0x4000_AC00 as *const _;
}

/// Trait representing CAN peripheral dependencies
///
/// Structs implementing [`Dependencies`] should
/// - enclose all object representable dependencies of [`Self::Id`] and
///   release them upon destruction
/// - be constructible only when the CAN pins have been routed to the
///   controller
/// - be a singleton (only a single instance of [`Dependencies`] for a specific
///   [`CanId`] must exist at the same time)
///
/// in order to prevent aliasing and guarantee that the driver is the sole
/// owner of the peripheral.
///
/// # Safety
/// While a [`Dependencies`] instance exists
/// - CAN related clocks must not change
/// - CAN related pin modes must not change
/// - the register block and message RAM of [`Self::Id`] must not be accessed
///   by anything else
pub unsafe trait Dependencies {
    /// Controller instance these dependencies belong to
    type Id: CanId;

    /// Ungates the bus and kernel clocks of the controller.
    ///
    /// Called before the first register access; must be idempotent.
    fn enable_clock(&mut self);

    /// Frequency of the core / bus clock.
    fn host_clock(&self) -> fugit::HertzU32;

    /// Frequency of the FDCAN kernel clock, which all bit timing derives from.
    fn can_clock(&self) -> fugit::HertzU32;
}

/// Peripherals with an individual clock enable bit
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PeripheralId {
    /// GPIO port A
    GpioA,
    /// GPIO port B
    GpioB,
    /// GPIO port C
    GpioC,
    /// GPIO port D
    GpioD,
    /// GPIO port H
    GpioH,
    /// General purpose timer 2
    Tim2,
    /// I2C controller 2
    I2c2,
    /// FDCAN controller 1
    Fdcan1,
}

impl From<Port> for PeripheralId {
    fn from(port: Port) -> Self {
        match port {
            Port::A => Self::GpioA,
            Port::B => Self::GpioB,
            Port::C => Self::GpioC,
            Port::D => Self::GpioD,
            Port::H => Self::GpioH,
        }
    }
}

/// Peripheral clock gating
pub trait PeripheralClocks {
    /// Enables the bus clock of `peripheral`. Enabling an already running
    /// clock has no effect.
    fn enable_peripheral_clock(&self, peripheral: PeripheralId);
}

impl<T: PeripheralClocks + ?Sized> PeripheralClocks for &T {
    fn enable_peripheral_clock(&self, peripheral: PeripheralId) {
        (**self).enable_peripheral_clock(peripheral)
    }
}
