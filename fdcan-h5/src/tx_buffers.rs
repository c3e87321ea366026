use crate::message::TxHeader;
use crate::messageram::MessageElement;
use crate::reg::{txfqs, RegisterBlock};

/// Transmit FIFO/queue
///
/// Transmission is fire-and-forget: [`Tx::transmit`] hands the frame to the
/// controller and returns. Completion can be observed through
/// [`Tx::transmission_occurred`], the TX event FIFO or the transmission
/// completed interrupt.
pub struct Tx<'a> {
    regs: &'a RegisterBlock,
    memory: &'a [MessageElement],
}

// Safety: `Tx` exclusively owns the TX status and request registers and the
// TX buffer section of the message RAM.
unsafe impl Send for Tx<'_> {}

/// Errors of [`Tx::transmit`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// The data length code cannot be encoded for the frame format
    InvalidDataLength,
    /// The payload is shorter than the data length code demands
    PayloadTooShort {
        /// Bytes the header demands
        required: usize,
        /// Bytes provided
        provided: usize,
    },
    /// No free element; nothing was written.
    FifoFull,
    /// The add request was written but the controller did not report the
    /// request as pending right afterwards. The frame may still be sent.
    NotAccepted {
        /// Element the frame was written to
        slot: usize,
    },
    /// Only standard identifiers can be transmitted
    UnsupportedId,
}

impl<'a> Tx<'a> {
    /// The constructed type assumes ownership of some of the registers from
    /// the peripheral `RegisterBlock`. Do not keep multiple instances for the
    /// same peripheral.
    /// - TXFQS
    /// - TXBRP
    /// - TXBAR
    /// - TXBTO
    pub(crate) fn new(regs: &'a RegisterBlock, memory: &'a [MessageElement]) -> Self {
        Self { regs, memory }
    }

    /// Number of free elements in the FIFO/queue
    pub fn free_level(&self) -> usize {
        self.regs.txfqs.read_field(txfqs::TFFL) as usize
    }

    /// Returns the number of elements the queue can hold
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Buffers with a transmission request pending
    pub fn pending_requests(&self) -> TxBufferSet {
        TxBufferSet(self.regs.txbrp.read())
    }

    /// Returns the set of buffers that the peripheral indicates have been
    /// successfully transmitted. The flags are only cleared when a new
    /// transmission is requested for the buffer.
    pub fn transmission_occurred(&self) -> TxBufferSet {
        TxBufferSet(self.regs.txbto.read())
    }

    fn add_request(&self, index: usize) {
        // Writing 0 bits has no effect, so a plain write only requests `index`.
        self.regs.txbar.write(1 << index);
    }

    /// Puts a frame in the FIFO/queue to be sent on the bus and returns the
    /// element it was written to.
    ///
    /// `payload` must hold at least as many bytes as the header's data length
    /// code implies; extra bytes are ignored.
    pub fn transmit(&mut self, header: &TxHeader, payload: &[u8]) -> Result<usize, TxError> {
        if !header.dlc_is_valid() {
            return Err(TxError::InvalidDataLength);
        }
        let len = header.payload_len();
        if payload.len() < len {
            return Err(TxError::PayloadTooShort {
                required: len,
                provided: payload.len(),
            });
        }

        let status = self.regs.txfqs.read();
        let free_level = txfqs::TFFL.get(status);
        trace!("tx free level {}", free_level);
        if free_level == 0 {
            return Err(TxError::FifoFull);
        }

        let index = txfqs::TFQPI.get(status) as usize;
        let element = self.memory.get(index).ok_or(TxError::FifoFull)?;
        let words = header.words();
        trace!(
            "tx put index {} at {:#x}, header {:#x} {:#x}",
            index,
            element as *const _ as usize,
            words[0],
            words[1]
        );
        element.write_header(words);
        element.write_payload(&payload[..len]);

        self.add_request(index);
        if self.regs.txbrp.read() & (1 << index) == 0 {
            warn!("tx request for element {} not pending", index);
            return Err(TxError::NotAccepted { slot: index });
        }
        Ok(index)
    }
}

/// A set of transmit buffers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxBufferSet(pub u32);

impl FromIterator<usize> for TxBufferSet {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        let mut set = 0_u32;
        for i in iter.into_iter().filter(|&i| i < 32) {
            set |= 1u32 << i;
        }
        TxBufferSet(set)
    }
}

impl TxBufferSet {
    /// `true` if buffer `index` is in the set
    pub fn contains(&self, index: usize) -> bool {
        index < 32 && self.0 & (1 << index) != 0
    }

    /// An iterator visiting all elements in ascending order.
    pub fn iter(&self) -> Iter {
        Iter {
            flags: *self,
            index: 0,
        }
    }
}

/// An iterator over the buffer indexes of the buffers in a [`TxBufferSet`].
///
/// This `struct` is created by [`TxBufferSet::iter`].
pub struct Iter {
    flags: TxBufferSet,
    index: u8,
}

impl Iterator for Iter {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < 32 {
            let i = usize::from(self.index);
            self.index += 1;
            if self.flags.contains(i) {
                return Some(i);
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::FrameType;
    use crate::messageram::MessageRam;
    use embedded_can::StandardId;

    fn header(raw_id: u16, len: usize) -> TxHeader {
        TxHeader::data(StandardId::new(raw_id).unwrap(), len).unwrap()
    }

    fn set_status(regs: &RegisterBlock, free_level: u32, put_index: u32) {
        regs.txfqs
            .write(txfqs::TFFL.value(free_level) | txfqs::TFQPI.value(put_index));
    }

    #[test]
    fn full_fifo_leaves_message_ram_untouched() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        set_status(&regs, 0, 1);
        let mut tx = Tx::new(&regs, &ram.tx_buffers);
        assert_eq!(
            tx.transmit(&header(0x123, 2), &[1, 2]),
            Err(TxError::FifoFull)
        );
        for element in ram.tx_buffers.iter() {
            assert_eq!(element.read_header(), [0, 0]);
            assert!(element.data.iter().all(|w| w.get() == 0));
        }
        assert_eq!(regs.txbar.read(), 0);
    }

    #[test]
    fn writes_descriptor_at_put_index() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        set_status(&regs, 3, 2);
        // The controller reports the request as pending.
        regs.txbrp.write(1 << 2);

        let mut tx = Tx::new(&regs, &ram.tx_buffers);
        let slot = tx
            .transmit(&header(0x123, 5), &[0x11, 0x22, 0x33, 0x44, 0x55])
            .unwrap();
        assert_eq!(slot, 2);

        let element = &ram.tx_buffers[2];
        assert_eq!(element.read_header(), [0x048C_0000, 5 << 16]);
        assert_eq!(element.data[0].get(), 0x4433_2211);
        assert_eq!(element.data[1].get(), 0x0000_0055);
        assert_eq!(element.data[2].get(), 0);
        assert_eq!(regs.txbar.read(), 1 << 2);
        assert_eq!(ram.tx_buffers[0].read_header(), [0, 0]);
    }

    #[test]
    fn request_not_pending_is_reported() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        set_status(&regs, 3, 0);
        let mut tx = Tx::new(&regs, &ram.tx_buffers);
        assert_eq!(
            tx.transmit(&header(0x1, 0), &[]),
            Err(TxError::NotAccepted { slot: 0 })
        );
        assert_eq!(regs.txbar.read(), 1);
    }

    #[test]
    fn payload_must_cover_dlc() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        set_status(&regs, 3, 0);
        let mut tx = Tx::new(&regs, &ram.tx_buffers);
        assert_eq!(
            tx.transmit(&header(0x1, 4), &[1, 2]),
            Err(TxError::PayloadTooShort {
                required: 4,
                provided: 2
            })
        );

        let mut invalid = header(0x1, 8);
        invalid.dlc = 12;
        assert_eq!(
            tx.transmit(&invalid, &[0; 64]),
            Err(TxError::InvalidDataLength)
        );
        assert_eq!(regs.txbar.read(), 0);
    }

    #[test]
    fn remote_frame_writes_no_payload() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        set_status(&regs, 1, 1);
        regs.txbrp.write(0b10);
        let mut tx = Tx::new(&regs, &ram.tx_buffers);
        let remote = TxHeader::remote(StandardId::new(0x7).unwrap(), 8).unwrap();
        assert_eq!(remote.frame_type, FrameType::Remote);
        assert_eq!(tx.transmit(&remote, &[]), Ok(1));
        assert!(ram.tx_buffers[1].data.iter().all(|w| w.get() == 0));
    }

    #[test]
    fn buffer_set_iterates_members() {
        let set: TxBufferSet = [0, 2, 31, 40].into_iter().collect();
        assert_eq!(set.0, 0x8000_0005);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 2, 31]);
        assert!(set.contains(2));
        assert!(!set.contains(1));
    }
}
