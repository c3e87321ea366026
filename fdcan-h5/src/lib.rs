#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//! # fdcan-h5
//!
//! ## Overview
//! Register-level driver for the FDCAN controller of the STM32H503, operated
//! with classic CAN frames.
//!
//! It provides the following features:
//!
//! - bit timing and mode configuration, including internal and external
//!   loopback, bus monitoring and restricted operation
//! - standard ID acceptance filters and the global filter policy
//! - message transmission through the transmit FIFO or priority queue
//! - message reception from both receive FIFOs, including the overwrite mode
//!   read-ahead
//! - the transmit event FIFO
//! - interrupt ownership, line routing and new-message dispatch, plus a
//!   critical-section wrapper for FIFOs shared with an interrupt handler
//! - an [`embedded_can::nb::Can`] implementation
//!
//! On the STM32H5 the message RAM layout is fixed by hardware: 28 standard
//! filters, 8 extended filters, two receive FIFOs of 3 elements, a transmit
//! event FIFO of 3 elements and a transmit FIFO/queue of 3 elements, each
//! element large enough for 64 bytes of payload. [`messageram::MessageRam`]
//! mirrors it.
//!
//! In order to use the controller, one has to instantiate
//! [`CanConfigurable`] and [`finalize`] it. Its constructor requires an
//! instance of a [`Dependencies`] implementing struct, which guarantees that
//! clocks and pins are set up and that the driver is the sole owner of the
//! controller.
//!
//! Every wait for the controller to acknowledge a state change is bounded by
//! a [`BoundedWait`] and reported as an error instead of hanging.
//!
//! ```no_run
//! use fdcan_h5::config::{BitTiming, CanConfig, Mode};
//! use fdcan_h5::filter::{Action, StandardFilter};
//! use fdcan_h5::message::TxHeader;
//! use fdcan_h5::embedded_can::StandardId;
//! use fdcan_h5::{BoundedWait, CanConfigurable, Dependencies};
//!
//! # fn run(dependencies: impl Dependencies) -> Result<(), fdcan_h5::bus::ConfigurationError> {
//! // 250 MHz kernel clock / 25 / (1 + 7 + 2) = 1 Mbit/s
//! let mut config = CanConfig::new(BitTiming::new(25, 7, 2, 1));
//! config.mode = Mode::InternalLoopback;
//!
//! let mut can = CanConfigurable::new(dependencies, config, BoundedWait::default())?;
//! let id = StandardId::new(0x125).unwrap();
//! can.filters_standard()
//!     .program(0, StandardFilter::classic(Action::StoreFifo0, id, StandardId::MAX))
//!     .unwrap();
//! let mut can = can.finalize()?;
//!
//! let header = TxHeader::data(id, 2).unwrap();
//! let _slot = can.tx.transmit(&header, &[0xAB, 0xCD]);
//!
//! let mut buffer = [0; 8];
//! if let Ok(received) = can.rx_fifo_0.receive(&mut buffer) {
//!     let _payload = &buffer[..received.len];
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`finalize`]: bus::CanConfigurable::finalize
//! [`Dependencies`]: fdcan_h5_core::Dependencies

#[macro_use]
mod fmt;

pub mod bus;
pub mod config;
pub mod filter;
pub mod interrupt;
pub mod message;
pub mod messageram;
pub mod reg;
pub mod rx_fifo;
pub mod shared;
pub mod tx_buffers;
pub mod tx_event_fifo;

pub use crate::bus::{Can, CanConfigurable};
pub use embedded_can;
pub use fdcan_h5_core;
pub use fdcan_h5_core::{BoundedWait, CanId, Dependencies, Fdcan1, TimedOut};
pub use generic_array;

use embedded_can::Id;

/// Identifier as a plain number, for logging
pub(crate) fn raw_id(id: &Id) -> u32 {
    match id {
        Id::Standard(id) => id.as_raw().into(),
        Id::Extended(id) => id.as_raw(),
    }
}
