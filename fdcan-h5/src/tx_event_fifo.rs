//! Information about successfully transmitted messages
//!
//! Events are only generated for frames with [`store_tx_event`] set.
//!
//! [`store_tx_event`]: crate::message::TxHeader::store_tx_event
use crate::message::TxEvent;
use crate::messageram::TxEventElement;
use crate::reg::{txefa, txefs, RegisterBlock};

/// Transmit event queue
pub struct TxEventFifo<'a> {
    regs: &'a RegisterBlock,
    memory: &'a [TxEventElement],
}

// Safety: The event FIFO exclusively owns TXEFS, TXEFA and its message RAM
// section.
unsafe impl Send for TxEventFifo<'_> {}

impl<'a> TxEventFifo<'a> {
    /// The constructed type assumes ownership of some of the registers from
    /// the peripheral `RegisterBlock`. Do not keep multiple instances for the
    /// same peripheral.
    /// - TXEFS
    /// - TXEFA
    pub(crate) fn new(regs: &'a RegisterBlock, memory: &'a [TxEventElement]) -> Self {
        Self { regs, memory }
    }

    /// Returns the number of elements in the queue
    pub fn len(&self) -> usize {
        self.regs.txefs.read_field(txefs::EFFL) as usize
    }

    /// Returns `true` if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of elements the queue can hold
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Returns `true` if an event was dropped because the queue was full
    pub fn element_lost(&self) -> bool {
        self.regs.txefs.is_set(txefs::TEFL)
    }

    /// Takes the first event from the queue
    pub fn pop(&mut self) -> Option<TxEvent> {
        let status = self.regs.txefs.read();
        if txefs::EFFL.get(status) == 0 {
            return None;
        }
        let get_index = txefs::EFGI.get(status);
        let element = self.memory.get(get_index as usize)?;
        let event = TxEvent::decode([element.words[0].get(), element.words[1].get()]);
        self.regs.txefa.write(txefa::EFAI.value(get_index));
        trace!("tx event {} marker {}", get_index, event.message_marker);
        Some(event)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{FrameType, TxEventType};
    use crate::messageram::MessageRam;
    use embedded_can::{Id, StandardId};

    #[test]
    fn pops_event_at_get_index() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let mut fifo = TxEventFifo::new(&regs, &ram.tx_event_fifo);
        assert_eq!(fifo.pop(), None);

        ram.tx_event_fifo[2].words[0].set(0x123 << 18);
        ram.tx_event_fifo[2].words[1].set((0x5A << 24) | (1 << 22) | (3 << 16) | 0x0042);
        regs.txefs
            .write(txefs::EFFL.value(1) | txefs::EFGI.value(2));

        let event = fifo.pop().unwrap();
        assert_eq!(event.id, Id::Standard(StandardId::new(0x123).unwrap()));
        assert_eq!(event.frame_type, FrameType::Data);
        assert_eq!(event.dlc, 3);
        assert_eq!(event.message_marker, 0x5A);
        assert_eq!(event.event_type, TxEventType::TxEvent);
        assert_eq!(event.timestamp, 0x42);
        assert_eq!(regs.txefa.read(), 2);
    }
}
