//! Receive FIFO shared between an interrupt handler and thread mode
//!
//! A `static SharedRxFifo<'static, Fifo0>` is filled once with
//! [`SharedRxFifo::install`] after the bus is finalized. The interrupt
//! handler then calls [`SharedRxFifo::on_interrupt`] and thread mode may
//! poll with [`SharedRxFifo::receive`].

use crate::interrupt::{dispatch_new_message, OwnedInterruptSet};
use crate::rx_fifo::{FifoId, Received, RxError, RxFifo};
use core::cell::RefCell;
use critical_section::Mutex;

/// An [`RxFifo`] behind a critical section
///
/// Every access runs the whole status/read/acknowledge sequence inside one
/// critical section, so an interrupt handler and a polling loop never
/// interleave on the same FIFO.
pub struct SharedRxFifo<'a, F>(Mutex<RefCell<Option<RxFifo<'a, F>>>>);

impl<'a, F: FifoId> SharedRxFifo<'a, F> {
    /// Creates an empty slot, usable in a `static`
    pub const fn new() -> Self {
        Self(Mutex::new(RefCell::new(None)))
    }

    /// Hands `fifo` over to the shared slot. Returns the previously installed
    /// FIFO, if any.
    pub fn install(&self, fifo: RxFifo<'a, F>) -> Option<RxFifo<'a, F>> {
        critical_section::with(|cs| self.0.borrow_ref_mut(cs).replace(fifo))
    }

    /// Takes the FIFO back out of the shared slot.
    pub fn take(&self) -> Option<RxFifo<'a, F>> {
        critical_section::with(|cs| self.0.borrow_ref_mut(cs).take())
    }

    /// Runs `f` on the installed FIFO inside a critical section. Returns `None`
    /// if no FIFO is installed.
    pub fn with<R>(&self, f: impl FnOnce(&mut RxFifo<'a, F>) -> R) -> Option<R> {
        critical_section::with(|cs| self.0.borrow_ref_mut(cs).as_mut().map(f))
    }

    /// [`RxFifo::receive`] on the installed FIFO
    pub fn receive(&self, buffer: &mut [u8]) -> Option<Result<Received, RxError>> {
        self.with(|fifo| fifo.receive(buffer))
    }

    /// Interrupt handler body: services the new-message interrupt of the
    /// installed FIFO through [`dispatch_new_message`].
    pub fn on_interrupt(
        &self,
        interrupts: &OwnedInterruptSet<'_>,
        buffer: &mut [u8],
    ) -> Option<Result<Received, RxError>> {
        self.with(|fifo| dispatch_new_message(interrupts, fifo, buffer))
            .flatten()
    }
}

impl<F: FifoId> Default for SharedRxFifo<'_, F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::interrupt::{Interrupt, InterruptConfiguration, InterruptLine};
    use crate::message::TxHeader;
    use crate::messageram::MessageRam;
    use crate::reg::{rxfs, RegisterBlock};
    use crate::rx_fifo::Fifo0;
    use embedded_can::StandardId;

    #[test]
    fn empty_slot_yields_nothing() {
        let shared = SharedRxFifo::<Fifo0>::new();
        assert_eq!(shared.receive(&mut [0; 8]), None);
        assert!(shared.take().is_none());
    }

    #[test]
    fn installed_fifo_is_drained_once() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let header = TxHeader::data(StandardId::new(0x123).unwrap(), 1).unwrap();
        ram.rx_fifo_0[0].write_header(header.words());
        ram.rx_fifo_0[0].write_payload(&[0x5A]);
        regs.rxf0s.write(rxfs::FFL.value(1));

        let shared = SharedRxFifo::new();
        assert!(shared
            .install(RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0))
            .is_none());
        assert_eq!(shared.with(|fifo| fifo.len()), Some(1));

        let mut buffer = [0; 8];
        let received = shared.receive(&mut buffer).unwrap().unwrap();
        assert_eq!(received.len, 1);
        assert_eq!(buffer[0], 0x5A);

        // The test acts as the controller and empties the FIFO.
        regs.rxf0s.write(0);
        assert_eq!(shared.receive(&mut buffer), Some(Err(RxError::FifoEmpty)));
    }

    #[test]
    fn interrupt_path_requires_flag() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let mut config = InterruptConfiguration::new(&regs);
        let owned = config
            .enable(Interrupt::RxFifo0NewMessage.into(), InterruptLine::Line0)
            .unwrap();
        let shared = SharedRxFifo::new();
        shared.install(RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0));

        assert_eq!(shared.on_interrupt(&owned, &mut [0; 8]), None);

        regs.ir.write(1);
        assert_eq!(
            shared.on_interrupt(&owned, &mut [0; 8]),
            Some(Err(RxError::FifoEmpty))
        );
    }
}
