use crate::interrupt::Interrupt;
use crate::message::RxHeader;
use crate::messageram::MessageElement;
use crate::reg::{rxfa, rxfs, rxgfc, RegisterBlock};
use core::marker::PhantomData;
use fdcan_h5_core::{Field, Reg};

/// Receive FIFO `F`
pub struct RxFifo<'a, F> {
    regs: &'a RegisterBlock,
    memory: &'a [MessageElement],
    _fifo: PhantomData<F>,
}

// Safety: The FIFO exclusively owns its status and acknowledge registers and
// its message RAM section; the global filter register is only read.
unsafe impl<F> Send for RxFifo<'_, F> {}

/// Value of the type-level FIFO selection enum representing FIFO 0.
pub struct Fifo0;
/// Value of the type-level FIFO selection enum representing FIFO 1.
pub struct Fifo1;

mod private {
    pub trait Sealed {}
    impl Sealed for super::Fifo0 {}
    impl Sealed for super::Fifo1 {}
}

/// Registers and flags that differ between the two FIFOs
pub trait FifoId: private::Sealed {
    /// Overwrite mode bit in RXGFC
    const OVERWRITE: Field;
    /// Interrupt raised when a new message is stored
    const NEW_MESSAGE: Interrupt;
    /// Status register
    fn status(regs: &RegisterBlock) -> &Reg;
    /// Acknowledge register
    fn acknowledge(regs: &RegisterBlock) -> &Reg;
}

impl FifoId for Fifo0 {
    const OVERWRITE: Field = rxgfc::F0OM;
    const NEW_MESSAGE: Interrupt = Interrupt::RxFifo0NewMessage;
    fn status(regs: &RegisterBlock) -> &Reg {
        &regs.rxf0s
    }
    fn acknowledge(regs: &RegisterBlock) -> &Reg {
        &regs.rxf0a
    }
}

impl FifoId for Fifo1 {
    const OVERWRITE: Field = rxgfc::F1OM;
    const NEW_MESSAGE: Interrupt = Interrupt::RxFifo1NewMessage;
    fn status(regs: &RegisterBlock) -> &Reg {
        &regs.rxf1s
    }
    fn acknowledge(regs: &RegisterBlock) -> &Reg {
        &regs.rxf1a
    }
}

/// A frame was read out of the FIFO
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Received {
    /// Decoded header
    pub header: RxHeader,
    /// Number of payload bytes copied to the caller's buffer
    pub len: usize,
    /// FIFO element the frame was read from
    pub index: usize,
}

/// Errors of [`RxFifo::receive`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxError {
    /// Fill level was zero; nothing was read or acknowledged.
    FifoEmpty,
    /// The payload did not fit the caller's buffer. The first `copied` bytes
    /// were copied and the element was acknowledged regardless.
    Truncated {
        /// Decoded header of the dropped frame
        header: RxHeader,
        /// Bytes copied, equal to the buffer length
        copied: usize,
    },
}

impl<'a, F: FifoId> RxFifo<'a, F> {
    /// The constructed type assumes ownership of some of the registers from
    /// the peripheral `RegisterBlock`. Do not keep multiple instances for the
    /// same FIFO and peripheral.
    /// - RXFxS
    /// - RXFxA
    pub(crate) fn new(regs: &'a RegisterBlock, memory: &'a [MessageElement]) -> Self {
        Self {
            regs,
            memory,
            _fifo: PhantomData,
        }
    }

    fn status(&self) -> &Reg {
        F::status(self.regs)
    }

    /// Returns the number of elements in the queue
    pub fn len(&self) -> usize {
        self.status().read_field(rxfs::FFL) as usize
    }

    /// Returns `true` if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of elements the queue can hold
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Returns `true` if a frame was dropped because the queue was full
    pub fn message_lost(&self) -> bool {
        self.status().is_set(rxfs::RFL)
    }

    /// Reads the oldest frame into `buffer` and releases its element.
    ///
    /// In overwrite mode a full FIFO is read one element past the get index,
    /// since the element at the get index may be overwritten concurrently.
    pub fn receive(&mut self, buffer: &mut [u8]) -> Result<Received, RxError> {
        let status = self.status().read();
        let fill_level = rxfs::FFL.get(status);
        trace!("rx fifo fill level {}", fill_level);
        if fill_level == 0 {
            return Err(RxError::FifoEmpty);
        }

        let mut get_index = rxfs::FGI.get(status) as usize;
        if rxfs::FF.get(status) != 0 && self.regs.rxgfc.is_set(F::OVERWRITE) {
            get_index += 1;
        }
        let index = get_index % self.memory.len();
        let element = &self.memory[index];
        trace!(
            "rx get index {} at {:#x}",
            index,
            element as *const _ as usize
        );

        let header = RxHeader::decode(element.read_header());
        let len = header.payload_len();
        debug!(
            "rx id {} dlc {} filter {}",
            crate::raw_id(&header.id),
            header.dlc,
            header.filter_index
        );
        let copied = len.min(buffer.len());
        element.read_payload(&mut buffer[..copied]);

        F::acknowledge(self.regs).write(rxfa::FAI.value(index as u32));

        if copied < len {
            warn!("rx payload of {} bytes truncated to {}", len, copied);
            Err(RxError::Truncated { header, copied })
        } else {
            Ok(Received {
                header,
                len,
                index,
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::{FrameType, TxHeader};
    use crate::messageram::MessageRam;
    use embedded_can::{Id, StandardId};

    fn store(ram: &MessageRam, index: usize, raw_id: u16, payload: &[u8]) {
        let header = TxHeader::data(StandardId::new(raw_id).unwrap(), payload.len()).unwrap();
        ram.rx_fifo_0[index].write_header(header.words());
        ram.rx_fifo_0[index].write_payload(payload);
    }

    fn set_status(regs: &RegisterBlock, fill_level: u32, get_index: u32, full: bool) {
        let status = rxfs::FFL.value(fill_level) | rxfs::FGI.value(get_index);
        regs.rxf0s
            .write(if full { status | rxfs::FF.mask() } else { status });
    }

    #[test]
    fn empty_fifo_is_left_untouched() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let mut fifo = RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0);
        assert!(fifo.is_empty());
        assert_eq!(fifo.receive(&mut [0; 8]), Err(RxError::FifoEmpty));
        assert_eq!(regs.rxf0a.read(), 0);
    }

    #[test]
    fn reads_at_get_index_and_acknowledges() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        store(&ram, 1, 0x321, &[1, 2, 3, 4, 5]);
        set_status(&regs, 1, 1, false);

        let mut fifo = RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0);
        let mut buffer = [0; 8];
        let received = fifo.receive(&mut buffer).unwrap();
        assert_eq!(received.index, 1);
        assert_eq!(received.len, 5);
        assert_eq!(
            received.header.id,
            Id::Standard(StandardId::new(0x321).unwrap())
        );
        assert_eq!(received.header.frame_type, FrameType::Data);
        assert_eq!(&buffer[..5], &[1, 2, 3, 4, 5]);
        assert_eq!(regs.rxf0a.read(), 1);
    }

    #[test]
    fn overwrite_mode_skips_the_oldest_element_when_full() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        store(&ram, 0, 0x100, &[0xAA]);
        store(&ram, 1, 0x101, &[0xBB]);
        set_status(&regs, 3, 0, true);
        regs.rxgfc.set_bits(rxgfc::F0OM);

        let mut fifo = RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0);
        let mut buffer = [0; 8];
        let received = fifo.receive(&mut buffer).unwrap();
        assert_eq!(received.index, 1);
        assert_eq!(buffer[0], 0xBB);
        assert_eq!(regs.rxf0a.read(), 1);
    }

    #[test]
    fn no_skew_when_blocking_or_not_full() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        store(&ram, 0, 0x100, &[0xAA]);
        let mut fifo = RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0);

        set_status(&regs, 3, 0, true);
        assert_eq!(fifo.receive(&mut [0; 8]).unwrap().index, 0);

        regs.rxgfc.set_bits(rxgfc::F0OM);
        set_status(&regs, 2, 0, false);
        assert_eq!(fifo.receive(&mut [0; 8]).unwrap().index, 0);
    }

    #[test]
    fn skewed_index_wraps() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        store(&ram, 0, 0x100, &[0xAA]);
        set_status(&regs, 3, 2, true);
        regs.rxgfc.set_bits(rxgfc::F0OM);

        let mut fifo = RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0);
        assert_eq!(fifo.receive(&mut [0; 8]).unwrap().index, 0);
        assert_eq!(regs.rxf0a.read(), 0);
    }

    #[test]
    fn eight_bytes_fit_an_eight_byte_buffer() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        store(&ram, 0, 0x10, &[1, 2, 3, 4, 5, 6, 7, 8]);
        set_status(&regs, 1, 0, false);

        let mut fifo = RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0);
        let mut buffer = [0; 8];
        assert_eq!(fifo.receive(&mut buffer).unwrap().len, 8);
        assert_eq!(buffer, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn short_buffer_truncates_and_still_acknowledges() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        store(&ram, 2, 0x10, &[1, 2, 3, 4, 5, 6, 7, 8]);
        set_status(&regs, 1, 2, false);

        let mut fifo = RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0);
        let mut buffer = [0; 4];
        match fifo.receive(&mut buffer) {
            Err(RxError::Truncated { header, copied }) => {
                assert_eq!(copied, 4);
                assert_eq!(header.dlc, 8);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(buffer, [1, 2, 3, 4]);
        assert_eq!(regs.rxf0a.read(), 2);
    }

    #[test]
    fn fifo_1_uses_its_own_registers() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let header = TxHeader::data(StandardId::new(0x55).unwrap(), 1).unwrap();
        ram.rx_fifo_1[0].write_header(header.words());
        regs.rxf1s.write(rxfs::FFL.value(1));

        let mut fifo = RxFifo::<Fifo1>::new(&regs, &ram.rx_fifo_1);
        assert_eq!(fifo.len(), 1);
        assert!(fifo.receive(&mut [0; 8]).is_ok());
        assert_eq!(regs.rxf1a.read(), 0);
        assert_eq!(
            RxFifo::<Fifo0>::new(&regs, &ram.rx_fifo_0).receive(&mut [0; 8]),
            Err(RxError::FifoEmpty)
        );
    }
}
