//! Receive descriptor

use super::{bits, decode_id, id_type, payload_len, FrameType, IdType};
use embedded_can::Id;

/// Accepted non-matching frame (word 2)
const ANMF: u32 = 1 << 31;
const FIDX_SHIFT: u32 = 24;
const FIDX_MASK: u32 = 0x7F;
const RXTS_MASK: u32 = 0xFFFF;

/// Header of a received frame, decoded from the two header words
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RxHeader {
    /// Identifier, standard or extended
    pub id: Id,
    /// Data or remote frame
    pub frame_type: FrameType,
    /// Transmitter was error passive
    pub error_state_indicator: bool,
    /// Data length code as received
    pub dlc: u8,
    /// Bit rate switching was used
    pub bit_rate_switch: bool,
    /// FD frame format
    pub fd_format: bool,
    /// Index of the filter element that accepted the frame; `None` for frames
    /// accepted by the global non-matching policy.
    pub filter_index: Option<u8>,
    /// Value of the timestamp counter when the frame was received
    pub timestamp: u16,
}

#[cfg(feature = "defmt")]
impl defmt::Format for RxHeader {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "RxHeader {{ id: {=u32:#x}, frame_type: {}, esi: {}, dlc: {}, brs: {}, fd: {}, filter_index: {}, timestamp: {} }}",
            crate::raw_id(&self.id),
            self.frame_type,
            self.error_state_indicator,
            self.dlc,
            self.bit_rate_switch,
            self.fd_format,
            self.filter_index,
            self.timestamp,
        )
    }
}

impl RxHeader {
    /// Decodes the header words of a receive element
    pub fn decode(words: [u32; 2]) -> Self {
        let [r0, r1] = words;
        let accepted_non_matching = r1 & ANMF != 0;
        Self {
            id: decode_id(r0),
            frame_type: if r0 & bits::RTR != 0 {
                FrameType::Remote
            } else {
                FrameType::Data
            },
            error_state_indicator: r0 & bits::ESI != 0,
            dlc: ((r1 >> bits::DLC_SHIFT) & 0xF) as u8,
            bit_rate_switch: r1 & bits::BRS != 0,
            fd_format: r1 & bits::FDF != 0,
            filter_index: (!accepted_non_matching).then_some(((r1 >> FIDX_SHIFT) & FIDX_MASK) as u8),
            timestamp: (r1 & RXTS_MASK) as u16,
        }
    }

    /// Standard or extended identifier
    pub fn id_type(&self) -> IdType {
        id_type(&self.id)
    }

    /// `true` if no filter element matched and the frame was accepted by the
    /// global policy
    pub fn accepted_non_matching(&self) -> bool {
        self.filter_index.is_none()
    }

    /// Number of payload bytes stored with the frame
    pub fn payload_len(&self) -> usize {
        payload_len(self.dlc, self.fd_format, self.frame_type == FrameType::Remote)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::TxHeader;
    use embedded_can::StandardId;

    #[test]
    fn transmit_header_reads_back() {
        let id = StandardId::new(0x123).unwrap();
        let tx = TxHeader::data(id, 5).unwrap();
        let rx = RxHeader::decode(tx.words());
        assert_eq!(rx.id, Id::Standard(id));
        assert_eq!(rx.id_type(), IdType::Standard);
        assert_eq!(rx.frame_type, FrameType::Data);
        assert_eq!(rx.dlc, 5);
        assert_eq!(rx.payload_len(), 5);
    }

    #[test]
    fn filter_index_and_timestamp() {
        let rx = RxHeader::decode([0x125 << 18, (3 << 24) | (8 << 16) | 0xBEEF]);
        assert_eq!(rx.filter_index, Some(3));
        assert_eq!(rx.timestamp, 0xBEEF);
        assert_eq!(rx.dlc, 8);

        let rx = RxHeader::decode([0x125 << 18, ANMF | (3 << 24)]);
        assert!(rx.accepted_non_matching());
        assert_eq!(rx.filter_index, None);
    }
}
