//! Fixed message RAM layout shared between the core and the controller.
//!
//! On the STM32H503 the controller addresses its message RAM with a hardwired
//! layout: section start addresses and element counts are not configurable,
//! so [`MessageRam`] mirrors that layout bit for bit.
//!
//! | Section             | Offset  | Element size | Elements |
//! |---------------------|---------|--------------|----------|
//! | Standard ID filters | `0x000` | 4            | 28       |
//! | Extended ID filters | `0x070` | 8            | 8        |
//! | RX FIFO 0           | `0x0B0` | 72           | 3        |
//! | RX FIFO 1           | `0x188` | 72           | 3        |
//! | TX event FIFO       | `0x260` | 8            | 3        |
//! | TX buffers          | `0x278` | 72           | 3        |

use fdcan_h5_core::CanId;
use generic_array::{
    typenum::{consts::*, Unsigned},
    GenericArray,
};
use vcell::VolatileCell;

/// Number of standard ID filter elements
pub type StandardFilters = U28;
/// Number of extended ID filter elements
pub type ExtendedFilters = U8;
/// Elements per RX FIFO
pub type RxFifoElements = U3;
/// Elements in the TX event FIFO
pub type TxEventElements = U3;
/// Elements in the TX FIFO/queue
pub type TxElements = U3;

/// Number of 32-bit data words in a message element
pub const DATA_WORDS: usize = 16;

/// RX FIFO or TX buffer element: two header words followed by the payload
///
/// Payload bytes are packed little-endian, four per word.
#[repr(C)]
pub struct MessageElement {
    pub(crate) header: [VolatileCell<u32>; 2],
    pub(crate) data: [VolatileCell<u32>; DATA_WORDS],
}

impl MessageElement {
    /// Size of one element in bytes
    pub const SIZE: usize = 72;

    pub(crate) fn read_header(&self) -> [u32; 2] {
        [self.header[0].get(), self.header[1].get()]
    }

    pub(crate) fn write_header(&self, header: [u32; 2]) {
        self.header[0].set(header[0]);
        self.header[1].set(header[1]);
    }

    /// Copies `out.len()` payload bytes out of the element, word by word
    pub(crate) fn read_payload(&self, out: &mut [u8]) {
        for (chunk, word) in out.chunks_mut(4).zip(self.data.iter()) {
            let bytes = word.get().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    /// Writes `ceil(payload.len() / 4)` data words; the unused bytes of the last
    /// word are zero
    pub(crate) fn write_payload(&self, payload: &[u8]) {
        for (chunk, word) in payload.chunks(4).zip(self.data.iter()) {
            let mut bytes = [0u8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            word.set(u32::from_le_bytes(bytes));
        }
    }
}

/// TX event FIFO element
#[repr(C)]
pub struct TxEventElement {
    pub(crate) words: [VolatileCell<u32>; 2],
}

/// Extended ID filter element
#[repr(C)]
pub struct ExtendedFilterElement {
    pub(crate) words: [VolatileCell<u32>; 2],
}

/// Message RAM of one FDCAN controller
#[repr(C)]
pub struct MessageRam {
    pub(crate) filters_standard: GenericArray<VolatileCell<u32>, StandardFilters>,
    pub(crate) filters_extended: GenericArray<ExtendedFilterElement, ExtendedFilters>,
    pub(crate) rx_fifo_0: GenericArray<MessageElement, RxFifoElements>,
    pub(crate) rx_fifo_1: GenericArray<MessageElement, RxFifoElements>,
    pub(crate) tx_event_fifo: GenericArray<TxEventElement, TxEventElements>,
    pub(crate) tx_buffers: GenericArray<MessageElement, TxElements>,
}

impl MessageRam {
    /// Total size in bytes
    pub const SIZE: usize = 0x350;
    /// Capacity of the standard filter section
    pub const STANDARD_FILTERS: usize = StandardFilters::USIZE;
    /// Capacity of the extended filter section
    pub const EXTENDED_FILTERS: usize = ExtendedFilters::USIZE;

    /// Message RAM of controller `Id`.
    ///
    /// # Safety
    /// The caller must be the owner of the controller referenced by `Id`. No
    /// other reference to this memory may be used while the returned one is
    /// alive.
    pub unsafe fn of<Id: CanId>() -> &'static Self {
        &*(Id::MESSAGE_RAM as *const Self)
    }

    /// Zeroes every word, which also disables every filter element.
    pub(crate) fn clear(&self) {
        for word in self.filters_standard.iter() {
            word.set(0);
        }
        for element in self.filters_extended.iter() {
            element.words.iter().for_each(|w| w.set(0));
        }
        for element in self
            .rx_fifo_0
            .iter()
            .chain(self.rx_fifo_1.iter())
            .chain(self.tx_buffers.iter())
        {
            element.header.iter().for_each(|w| w.set(0));
            element.data.iter().for_each(|w| w.set(0));
        }
        for element in self.tx_event_fifo.iter() {
            element.words.iter().for_each(|w| w.set(0));
        }
    }

    #[cfg(test)]
    pub(crate) fn zeroed() -> Self {
        // Safety: Every field is an array of `VolatileCell<u32>`, for which all-zero is a
        // valid value.
        unsafe { core::mem::zeroed() }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_hardware() {
        assert_eq!(size_of::<MessageElement>(), MessageElement::SIZE);
        assert_eq!(offset_of!(MessageRam, filters_standard), 0x000);
        assert_eq!(offset_of!(MessageRam, filters_extended), 0x070);
        assert_eq!(offset_of!(MessageRam, rx_fifo_0), 0x0B0);
        assert_eq!(offset_of!(MessageRam, rx_fifo_1), 0x188);
        assert_eq!(offset_of!(MessageRam, tx_event_fifo), 0x260);
        assert_eq!(offset_of!(MessageRam, tx_buffers), 0x278);
        assert_eq!(size_of::<MessageRam>(), MessageRam::SIZE);
    }

    #[test]
    fn payload_is_packed_little_endian() {
        let ram = MessageRam::zeroed();
        let element = &ram.tx_buffers[0];
        element.write_payload(&[0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(element.data[0].get(), 0x4433_2211);
        assert_eq!(element.data[1].get(), 0x0000_0055);
        assert_eq!(element.data[2].get(), 0);

        let mut out = [0u8; 5];
        element.read_payload(&mut out);
        assert_eq!(out, [0x11, 0x22, 0x33, 0x44, 0x55]);
    }

    #[test]
    fn clear_zeroes_everything() {
        let ram = MessageRam::zeroed();
        ram.filters_standard[27].set(0xFFFF_FFFF);
        ram.tx_buffers[2].data[15].set(1);
        ram.tx_event_fifo[1].words[0].set(7);
        ram.clear();
        assert_eq!(ram.filters_standard[27].get(), 0);
        assert_eq!(ram.tx_buffers[2].data[15].get(), 0);
        assert_eq!(ram.tx_event_fifo[1].words[0].get(), 0);
    }
}
