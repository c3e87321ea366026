//! Message descriptors and frames
//!
//! The controller stores every frame as two header words followed by the
//! payload. The header layout of transmit and receive elements only differs
//! in the upper half of the second word, so the shared fields are encoded and
//! decoded here.

pub mod rx;
pub mod tx;
mod tx_event;

pub use rx::RxHeader;
pub use tx::TxHeader;
pub use tx_event::{TxEvent, TxEventType};

use embedded_can::{ExtendedId, Id, StandardId};

/// Payload length in bytes for each data length code
pub const DLC_TO_BYTES: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// Bit positions shared by all element headers
pub(crate) mod bits {
    /// Error state indicator (word 1)
    pub const ESI: u32 = 1 << 31;
    /// Extended identifier (word 1)
    pub const XTD: u32 = 1 << 30;
    /// Remote transmission request (word 1)
    pub const RTR: u32 = 1 << 29;
    /// Standard identifier position (word 1)
    pub const STD_ID_SHIFT: u32 = 18;
    /// FD format (word 2)
    pub const FDF: u32 = 1 << 21;
    /// Bit rate switch (word 2)
    pub const BRS: u32 = 1 << 20;
    /// Data length code position (word 2)
    pub const DLC_SHIFT: u32 = 16;
    /// Message marker position (word 2)
    pub const MM_SHIFT: u32 = 24;
}

/// Number of payload bytes encoded by the data length code `dlc`
///
/// Only the low four bits of `dlc` are significant.
pub fn byte_count(dlc: u8) -> usize {
    DLC_TO_BYTES[usize::from(dlc & 0xF)] as usize
}

/// Payload length of a frame, as stored in message RAM
///
/// Classic frames carry at most 8 bytes whatever the code says; remote frames
/// carry none.
pub(crate) fn payload_len(dlc: u8, fd_format: bool, remote: bool) -> usize {
    if remote {
        0
    } else if fd_format {
        byte_count(dlc)
    } else {
        byte_count(dlc).min(8)
    }
}

/// Data does not fit in the frame
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TooMuchData;

/// Finds the smallest data length code that encodes at least `len` bytes
pub fn len_to_dlc(len: usize, fd_format: bool) -> Result<u8, TooMuchData> {
    let limit = if fd_format { 64 } else { 8 };
    if len > limit {
        return Err(TooMuchData);
    }
    DLC_TO_BYTES
        .iter()
        .position(|&n| usize::from(n) >= len)
        .map(|dlc| dlc as u8)
        .ok_or(TooMuchData)
}

/// Data or remote frame
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameType {
    /// Carries a payload
    Data,
    /// Requests transmission of the identified frame
    Remote,
}

/// Identifier type of a frame
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdType {
    /// 11-bit identifier
    Standard,
    /// 29-bit identifier
    Extended,
}

/// Decodes the identifier from header word 1
pub(crate) fn decode_id(word: u32) -> Id {
    if word & bits::XTD != 0 {
        // The mask keeps the value within 29 bits
        Id::Extended(
            ExtendedId::new(word & ExtendedId::MAX.as_raw()).unwrap_or(ExtendedId::ZERO),
        )
    } else {
        let raw = (word >> bits::STD_ID_SHIFT) as u16 & StandardId::MAX.as_raw();
        Id::Standard(StandardId::new(raw).unwrap_or(StandardId::ZERO))
    }
}

/// Identifier type of `id`
pub fn id_type(id: &Id) -> IdType {
    match id {
        Id::Standard(_) => IdType::Standard,
        Id::Extended(_) => IdType::Extended,
    }
}

/// Classic CAN frame with an owned payload
///
/// Used by the [`embedded_can`] integration; the native API works on
/// [`TxHeader`] / [`RxHeader`] and caller owned buffers instead.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Frame {
    id: Id,
    frame_type: FrameType,
    dlc: u8,
    data: [u8; 8],
}

impl Frame {
    pub(crate) fn from_received(header: &RxHeader, payload: &[u8]) -> Self {
        let mut data = [0; 8];
        let len = payload.len().min(8);
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id: header.id,
            frame_type: header.frame_type,
            dlc: header.dlc,
            data,
        }
    }

    /// Identifier type of the frame
    pub fn id_type(&self) -> IdType {
        id_type(&self.id)
    }
}

impl embedded_can::Frame for Frame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        let dlc = len_to_dlc(data.len(), false).ok()?;
        let mut buffer = [0; 8];
        buffer[..data.len()].copy_from_slice(data);
        Some(Self {
            id: id.into(),
            frame_type: FrameType::Data,
            dlc,
            data: buffer,
        })
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > 8 {
            return None;
        }
        Some(Self {
            id: id.into(),
            frame_type: FrameType::Remote,
            dlc: dlc as u8,
            data: [0; 8],
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.id, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.frame_type == FrameType::Remote
    }

    fn id(&self) -> Id {
        self.id
    }

    fn dlc(&self) -> usize {
        self.dlc.into()
    }

    fn data(&self) -> &[u8] {
        let len = payload_len(self.dlc, false, self.is_remote_frame());
        &self.data[..len]
    }
}
