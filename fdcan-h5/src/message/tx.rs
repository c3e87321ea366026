//! Transmit descriptor

use super::{bits, len_to_dlc, payload_len, FrameType, TooMuchData};
use embedded_can::StandardId;

/// Header of a frame to be transmitted
///
/// Only standard identifiers can be transmitted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TxHeader {
    /// 11-bit identifier
    pub id: StandardId,
    /// Data or remote frame
    pub frame_type: FrameType,
    /// Data length code, 0..=8 for classic frames
    pub dlc: u8,
    /// If `true`, the frame is sent flagged as error passive. Otherwise the
    /// actual error state of the controller is sent.
    pub error_state_indicator: bool,
    /// Bit rate switching, FD frames only
    pub bit_rate_switch: bool,
    /// FD frame format
    pub fd_format: bool,
    /// If `Some(marker)`, an event identified by `marker` is stored in the TX
    /// event FIFO once the frame has been sent.
    pub store_tx_event: Option<u8>,
}

#[cfg(feature = "defmt")]
impl defmt::Format for TxHeader {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "TxHeader {{ id: {=u16:#x}, frame_type: {}, dlc: {}, esi: {}, brs: {}, fd: {}, store_tx_event: {} }}",
            self.id.as_raw(),
            self.frame_type,
            self.dlc,
            self.error_state_indicator,
            self.bit_rate_switch,
            self.fd_format,
            self.store_tx_event,
        )
    }
}

impl TxHeader {
    /// Classic data frame carrying `len` bytes
    pub fn data(id: StandardId, len: usize) -> Result<Self, TooMuchData> {
        Ok(Self {
            id,
            frame_type: FrameType::Data,
            dlc: len_to_dlc(len, false)?,
            error_state_indicator: false,
            bit_rate_switch: false,
            fd_format: false,
            store_tx_event: None,
        })
    }

    /// Classic remote frame requesting `dlc`
    pub fn remote(id: StandardId, dlc: u8) -> Result<Self, TooMuchData> {
        if dlc > 8 {
            return Err(TooMuchData);
        }
        Ok(Self {
            frame_type: FrameType::Remote,
            dlc,
            ..Self::data(id, 0)?
        })
    }

    /// Same header, recording a TX event with `marker`
    pub fn with_tx_event(self, marker: u8) -> Self {
        Self {
            store_tx_event: Some(marker),
            ..self
        }
    }

    /// Payload bytes taken from the caller when transmitting this header
    pub fn payload_len(&self) -> usize {
        payload_len(self.dlc, self.fd_format, self.frame_type == FrameType::Remote)
    }

    /// `true` if the data length code is encodable for the frame format
    pub(crate) fn dlc_is_valid(&self) -> bool {
        if self.fd_format {
            self.dlc <= 15
        } else {
            self.dlc <= 8
        }
    }

    /// Header words in the layout the controller expects
    pub fn words(&self) -> [u32; 2] {
        let mut t0 = u32::from(self.id.as_raw()) << bits::STD_ID_SHIFT;
        if self.frame_type == FrameType::Remote {
            t0 |= bits::RTR;
        }
        if self.error_state_indicator {
            t0 |= bits::ESI;
        }

        let mut t1 = u32::from(self.dlc & 0xF) << bits::DLC_SHIFT;
        if self.fd_format {
            t1 |= bits::FDF;
        }
        if self.bit_rate_switch {
            t1 |= bits::BRS;
        }
        if let Some(marker) = self.store_tx_event {
            t1 |= EFC | (u32::from(marker) << bits::MM_SHIFT);
        }
        [t0, t1]
    }
}

/// Event FIFO control (word 2)
const EFC: u32 = 1 << 23;

#[cfg(test)]
mod test {
    use super::*;

    fn id(raw: u16) -> StandardId {
        StandardId::new(raw).unwrap()
    }

    #[test]
    fn identifier_lands_in_bits_28_to_18() {
        let header = TxHeader::data(id(0x123), 0).unwrap();
        assert_eq!(header.words()[0], 0x048C_0000);
    }

    #[test]
    fn flags_are_shifted_into_place() {
        let header = TxHeader {
            error_state_indicator: true,
            ..TxHeader::remote(id(0x7FF), 8).unwrap()
        };
        let [t0, t1] = header.words();
        assert_eq!(t0, bits::ESI | bits::RTR | (0x7FF << 18));
        assert_eq!(t1, 8 << 16);
    }

    #[test]
    fn tx_event_marker() {
        let header = TxHeader::data(id(1), 2).unwrap().with_tx_event(0xA5);
        assert_eq!(header.words()[1], 0xA580_0000 | (2 << 16));
    }

    #[test]
    fn remote_frames_carry_no_payload() {
        assert_eq!(TxHeader::remote(id(1), 8).unwrap().payload_len(), 0);
        assert_eq!(TxHeader::data(id(1), 5).unwrap().payload_len(), 5);
        assert!(TxHeader::remote(id(1), 9).is_err());
    }

    #[test]
    fn classic_dlc_limit() {
        let mut header = TxHeader::data(id(1), 8).unwrap();
        assert!(header.dlc_is_valid());
        header.dlc = 9;
        assert!(!header.dlc_is_valid());
        header.fd_format = true;
        assert!(header.dlc_is_valid());
    }
}
