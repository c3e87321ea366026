//! FDCAN register block and bit field definitions
//!
//! Field names follow the reference manual.
#![allow(missing_docs)]

use fdcan_h5_core::{CanId, Field, Reg};

/// FDCAN controller registers
#[repr(C)]
pub struct RegisterBlock {
    /// Core release
    pub crel: Reg,
    /// Endian
    pub endn: Reg,
    _reserved0: u32,
    /// Data bit timing and prescaler
    pub dbtp: Reg,
    /// Test
    pub test: Reg,
    /// RAM watchdog
    pub rwd: Reg,
    /// CC control
    pub cccr: Reg,
    /// Nominal bit timing and prescaler
    pub nbtp: Reg,
    /// Timestamp counter configuration
    pub tscc: Reg,
    /// Timestamp counter value
    pub tscv: Reg,
    /// Timeout counter configuration
    pub tocc: Reg,
    /// Timeout counter value
    pub tocv: Reg,
    _reserved1: [u32; 4],
    /// Error counter
    pub ecr: Reg,
    /// Protocol status
    pub psr: Reg,
    /// Transmitter delay compensation
    pub tdcr: Reg,
    _reserved2: u32,
    /// Interrupt flags
    pub ir: Reg,
    /// Interrupt enable
    pub ie: Reg,
    /// Interrupt line select
    pub ils: Reg,
    /// Interrupt line enable
    pub ile: Reg,
    _reserved3: [u32; 8],
    /// Global filter configuration
    pub rxgfc: Reg,
    /// Extended ID AND mask
    pub xidam: Reg,
    /// High priority message status
    pub hpms: Reg,
    _reserved4: u32,
    /// RX FIFO 0 status
    pub rxf0s: Reg,
    /// RX FIFO 0 acknowledge
    pub rxf0a: Reg,
    /// RX FIFO 1 status
    pub rxf1s: Reg,
    /// RX FIFO 1 acknowledge
    pub rxf1a: Reg,
    _reserved5: [u32; 8],
    /// TX buffer configuration
    pub txbc: Reg,
    /// TX FIFO/queue status
    pub txfqs: Reg,
    /// TX buffer request pending
    pub txbrp: Reg,
    /// TX buffer add request
    pub txbar: Reg,
    /// TX buffer cancellation request
    pub txbcr: Reg,
    /// TX buffer transmission occurred
    pub txbto: Reg,
    /// TX buffer cancellation finished
    pub txbcf: Reg,
    /// TX buffer transmission interrupt enable
    pub txbtie: Reg,
    /// TX buffer cancellation finished interrupt enable
    pub txbcie: Reg,
    /// TX event FIFO status
    pub txefs: Reg,
    /// TX event FIFO acknowledge
    pub txefa: Reg,
    _reserved6: [u32; 5],
    /// Clock divider
    pub ckdiv: Reg,
}

impl RegisterBlock {
    /// Register block of controller `Id`.
    ///
    /// # Safety
    /// The caller must be the owner of the controller referenced by `Id`.
    pub unsafe fn of<Id: CanId>() -> &'static Self {
        &*(Id::ADDRESS as *const Self)
    }

    #[cfg(test)]
    pub(crate) fn zeroed() -> Self {
        // Safety: Every field is a `u32` or a transparent wrapper around one, for which
        // all-zero is a valid value.
        unsafe { core::mem::zeroed() }
    }
}

pub mod cccr {
    use super::Field;
    pub const INIT: Field = Field::bit(0);
    pub const CCE: Field = Field::bit(1);
    /// Restricted operation
    pub const ASM: Field = Field::bit(2);
    pub const CSA: Field = Field::bit(3);
    pub const CSR: Field = Field::bit(4);
    /// Bus monitoring
    pub const MON: Field = Field::bit(5);
    /// Disable automatic retransmission
    pub const DAR: Field = Field::bit(6);
    pub const TEST: Field = Field::bit(7);
    pub const FDOE: Field = Field::bit(8);
    pub const BRSE: Field = Field::bit(9);
}

pub mod test {
    use super::Field;
    /// Loopback
    pub const LBCK: Field = Field::bit(4);
    pub const TX: Field = Field::new(5, 2);
    pub const RX: Field = Field::bit(7);
}

pub mod nbtp {
    use super::Field;
    pub const NTSEG2: Field = Field::new(0, 7);
    pub const NTSEG1: Field = Field::new(8, 8);
    pub const NBRP: Field = Field::new(16, 9);
    pub const NSJW: Field = Field::new(25, 7);
}

pub mod tscc {
    use super::Field;
    pub const TSS: Field = Field::new(0, 2);
    pub const TCP: Field = Field::new(16, 4);
}

pub mod tscv {
    use super::Field;
    pub const TSC: Field = Field::new(0, 16);
}

pub mod ecr {
    use super::Field;
    pub const TEC: Field = Field::new(0, 8);
    pub const REC: Field = Field::new(8, 7);
    pub const RP: Field = Field::bit(15);
    pub const CEL: Field = Field::new(16, 8);
}

pub mod psr {
    use super::Field;
    pub const LEC: Field = Field::new(0, 3);
    pub const ACT: Field = Field::new(3, 2);
    pub const EP: Field = Field::bit(5);
    pub const EW: Field = Field::bit(6);
    pub const BO: Field = Field::bit(7);
    pub const DLEC: Field = Field::new(8, 3);
    pub const RESI: Field = Field::bit(11);
    pub const RBRS: Field = Field::bit(12);
    pub const REDL: Field = Field::bit(13);
    pub const PXE: Field = Field::bit(14);
    pub const TDCV: Field = Field::new(16, 7);
}

pub mod ils {
    use super::Field;
    pub const RXFIFO0: Field = Field::bit(0);
    pub const RXFIFO1: Field = Field::bit(1);
    pub const SMSG: Field = Field::bit(2);
    pub const TFERR: Field = Field::bit(3);
    pub const MISC: Field = Field::bit(4);
    pub const BERR: Field = Field::bit(5);
    pub const PERR: Field = Field::bit(6);
}

pub mod ile {
    use super::Field;
    pub const EINT0: Field = Field::bit(0);
    pub const EINT1: Field = Field::bit(1);
}

pub mod rxgfc {
    use super::Field;
    /// Reject remote frames with extended IDs
    pub const RRFE: Field = Field::bit(0);
    /// Reject remote frames with standard IDs
    pub const RRFS: Field = Field::bit(1);
    /// Non-matching extended frames
    pub const ANFE: Field = Field::new(2, 2);
    /// Non-matching standard frames
    pub const ANFS: Field = Field::new(4, 2);
    /// FIFO 1 overwrite mode
    pub const F1OM: Field = Field::bit(8);
    /// FIFO 0 overwrite mode
    pub const F0OM: Field = Field::bit(9);
    /// Number of standard filter elements
    pub const LSS: Field = Field::new(16, 5);
    /// Number of extended filter elements
    pub const LSE: Field = Field::new(24, 4);
}

/// Shared by RXF0S and RXF1S
pub mod rxfs {
    use super::Field;
    /// Fill level
    pub const FFL: Field = Field::new(0, 4);
    /// Get index
    pub const FGI: Field = Field::new(8, 2);
    /// Put index
    pub const FPI: Field = Field::new(16, 2);
    /// FIFO full
    pub const FF: Field = Field::bit(24);
    /// Message lost
    pub const RFL: Field = Field::bit(25);
}

/// Shared by RXF0A and RXF1A
pub mod rxfa {
    use super::Field;
    pub const FAI: Field = Field::new(0, 3);
}

pub mod txbc {
    use super::Field;
    /// Queue mode when set, FIFO mode when clear
    pub const TFQM: Field = Field::bit(24);
}

pub mod txfqs {
    use super::Field;
    /// Free level
    pub const TFFL: Field = Field::new(0, 3);
    /// Get index
    pub const TFGI: Field = Field::new(8, 2);
    /// Put index
    pub const TFQPI: Field = Field::new(16, 2);
    /// FIFO/queue full
    pub const TFQF: Field = Field::bit(21);
}

pub mod txefs {
    use super::Field;
    pub const EFFL: Field = Field::new(0, 3);
    pub const EFGI: Field = Field::new(8, 2);
    pub const EFPI: Field = Field::new(16, 2);
    pub const EFF: Field = Field::bit(24);
    pub const TEFL: Field = Field::bit(25);
}

pub mod txefa {
    use super::Field;
    pub const EFAI: Field = Field::new(0, 2);
}
