#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//! Chip support for the STM32H503 around the `fdcan-h5` driver
//!
//! - [`rcc`]: PLL1 bring-up to 250 MHz and peripheral clock gating
//! - [`gpio`]: pin multiplexing and push-pull outputs
//! - [`timer`]: TIM2 as microsecond delay provider
//! - [`i2c`]: blocking I2C2 writes
//! - [`lcd`]: HD44780 display over a PCF8574 backpack
//! - [`can_deps`]: the [`Dependencies`] of FDCAN1
//!
//! ```no_run
//! use fdcan_h5_core::{BoundedWait, OutputType, PinConfig, PinMux, Port, Pull};
//! use fdcan_h5_periph::{can_deps::CanDependencies, gpio::Pins, i2c, lcd::Lcd, rcc, timer};
//!
//! # fn run() -> Option<()> {
//! let mut rcc = unsafe { rcc::Rcc::steal() };
//! let clocks = rcc
//!     .configure_system_clock(&rcc::ClockConfig::default(), BoundedWait::default())
//!     .ok()?;
//!
//! let mut pins = unsafe { Pins::steal(&rcc) };
//! let i2c_pin = PinConfig::alternate(8)
//!     .with_output_type(OutputType::OpenDrain)
//!     .with_pull(Pull::Up);
//! pins.configure_pin(Port::B, 4, i2c_pin).ok()?;
//! pins.configure_pin(Port::B, 5, i2c_pin).ok()?;
//!
//! let delay = unsafe { timer::Delay::tim2(&rcc, clocks.pclk1) };
//! let bus = unsafe { i2c::I2c::i2c2(&rcc, i2c::I2cTiming::default(), BoundedWait::default()) }.ok()?;
//! let mut lcd = Lcd::new(bus, delay, 0x27);
//! lcd.init().ok()?;
//! lcd.write_str("CAN ready").ok()?;
//!
//! let _dependencies = unsafe { CanDependencies::new(&mut pins, &rcc, clocks) }.ok()?;
//! # Some(())
//! # }
//! ```
//!
//! [`Dependencies`]: fdcan_h5_core::Dependencies

#[macro_use]
mod fmt;

pub mod can_deps;
pub mod gpio;
pub mod i2c;
pub mod lcd;
pub mod rcc;
pub mod timer;

pub use fdcan_h5_core;
