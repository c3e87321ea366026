//! Events for frames sent on the bus

use super::{bits, decode_id, FrameType};
use embedded_can::Id;

/// TX event FIFO element, decoded
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TxEvent {
    /// Identifier of the sent frame
    pub id: Id,
    /// Data or remote frame
    pub frame_type: FrameType,
    /// Data length code of the sent frame
    pub dlc: u8,
    /// Marker copied from [`TxHeader::store_tx_event`](super::TxHeader::store_tx_event)
    pub message_marker: u8,
    /// Kind of event
    pub event_type: TxEventType,
    /// Value of the timestamp counter when the frame was sent
    pub timestamp: u16,
}

#[cfg(feature = "defmt")]
impl defmt::Format for TxEvent {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "TxEvent {{ id: {=u32:#x}, frame_type: {}, dlc: {}, marker: {}, event_type: {}, timestamp: {} }}",
            crate::raw_id(&self.id),
            self.frame_type,
            self.dlc,
            self.message_marker,
            self.event_type,
            self.timestamp,
        )
    }
}

impl TxEvent {
    pub(crate) fn decode(words: [u32; 2]) -> Self {
        let [e0, e1] = words;
        Self {
            id: decode_id(e0),
            frame_type: if e0 & bits::RTR != 0 {
                FrameType::Remote
            } else {
                FrameType::Data
            },
            dlc: ((e1 >> bits::DLC_SHIFT) & 0xF) as u8,
            message_marker: (e1 >> bits::MM_SHIFT) as u8,
            event_type: TxEventType::from((e1 >> 22) & 3),
            timestamp: e1 as u16,
        }
    }
}

/// Event type field
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxEventType {
    /// Reserved encoding
    Reserved,
    /// Frame was transmitted
    TxEvent = 1,
    /// Frame was transmitted in spite of a cancellation request
    TxInSpiteOfCancellation = 2,
}

impl From<u32> for TxEventType {
    fn from(value: u32) -> Self {
        match value {
            1 => Self::TxEvent,
            2 => Self::TxInSpiteOfCancellation,
            _ => Self::Reserved,
        }
    }
}
