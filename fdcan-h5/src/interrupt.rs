//! Interrupt flags, line routing and dispatch
//!
//! The controller drives two interrupt lines towards the NVIC. Causes are not
//! routed individually but in [`InterruptGroup`]s, each of which is assigned
//! to one line.

use crate::reg::{ile, ils, RegisterBlock};
use crate::rx_fifo::{FifoId, Received, RxError, RxFifo};
use bitfield::bitfield;
use fdcan_h5_core::{Field, Reg};

/// CAN interrupt lines
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptLine {
    /// FDCAN1_IT0
    Line0,
    /// FDCAN1_IT1
    Line1,
}

bitfield! {
    /// A set of CAN interrupts.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct InterruptSet(u32);

    /// Access to Reserved Address
    pub ara, set_ara:  23;
    /// Protocol Error in Data phase
    pub ped, set_ped:  22;
    /// Protocol Error in Arbitration phase
    pub pea, set_pea:  21;
    /// Watchdog
    pub wdi, set_wdi:  20;
    /// Bus Off
    pub bo, set_bo:   19;
    /// Warning status changed
    pub ew, set_ew:   18;
    /// Error Passive
    pub ep, set_ep:   17;
    /// Error Logging Overflow
    pub elo, set_elo:  16;
    /// Timeout Occurred
    pub too, set_too:  15;
    /// Message RAM Access Failure
    pub mraf, set_mraf: 14;
    /// Timestamp Wraparound
    pub tsw, set_tsw:  13;
    /// Tx Event Fifo Element Lost
    pub tefl, set_tefl: 12;
    /// Tx Event Fifo Full
    pub teff, set_teff: 11;
    /// Tx Event Fifo New Entry
    pub tefn, set_tefn: 10;
    /// Tx Fifo Empty
    pub tfe, set_tfe:  9;
    /// Transmission Cancellation Finished
    pub tcf, set_tcf:  8;
    /// Transmission Completed
    pub tc, set_tc:   7;
    /// High Priority Message
    pub hpm, set_hpm:  6;
    /// Rx Fifo1 Message Lost
    pub rf1l, set_rf1l: 5;
    /// Rx Fifo1 Full
    pub rf1f, set_rf1f: 4;
    /// Rx Fifo1 New Message
    pub rf1n, set_rf1n: 3;
    /// Rx Fifo0 Message Lost
    pub rf0l, set_rf0l: 2;
    /// Rx Fifo0 Full
    pub rf0f, set_rf0f: 1;
    /// Rx Fifo0 New Message
    pub rf0n, set_rf0n: 0;
}

impl InterruptSet {
    /// Every interrupt the controller implements
    pub const ALL: Self = Self(0x00FF_FFFF);
    /// No interrupt
    pub const EMPTY: Self = Self(0);

    /// `true` if `interrupt` is in the set
    pub fn contains(&self, interrupt: Interrupt) -> bool {
        self.0 & u32::from(interrupt) != 0
    }

    /// `true` if the set holds no interrupt
    pub fn is_empty(&self) -> bool {
        self.0 & Self::ALL.0 == 0
    }

    /// An iterator visiting all elements in ascending bit order.
    pub fn iter(&self) -> Iter {
        Iter {
            flags: *self,
            index: 0,
        }
    }
}

impl FromIterator<Interrupt> for InterruptSet {
    fn from_iter<T: IntoIterator<Item = Interrupt>>(iter: T) -> Self {
        let mut set = 0_u32;
        for int in iter.into_iter() {
            set |= u32::from(int);
        }
        InterruptSet(set)
    }
}

impl From<Interrupt> for InterruptSet {
    fn from(interrupt: Interrupt) -> Self {
        Self(interrupt.into())
    }
}

impl core::fmt::Debug for InterruptSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for InterruptSet {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "InterruptSet({=u32:#x})", self.0)
    }
}

/// A single interrupt.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interrupt {
    /// RF0N
    RxFifo0NewMessage = 0,
    /// RF0F
    RxFifo0Full = 1,
    /// RF0L
    RxFifo0MessageLost = 2,
    /// RF1N
    RxFifo1NewMessage = 3,
    /// RF1F
    RxFifo1Full = 4,
    /// RF1L
    RxFifo1MessageLost = 5,
    /// HPM
    HighPriorityMessage = 6,
    /// TC
    TransmissionCompleted = 7,
    /// TCF
    TransmissionCancellationFinished = 8,
    /// TFE
    TxFifoEmpty = 9,
    /// TEFN
    TxEventFifoNewEntry = 10,
    /// TEFF
    TxEventFifoFull = 11,
    /// TEFL
    TxEventFifoElementLost = 12,
    /// TSW
    TimestampWraparound = 13,
    /// MRAF
    MessageRamAccessFailure = 14,
    /// TOO
    TimeoutOccurred = 15,
    /// ELO
    ErrorLoggingOverflow = 16,
    /// EP
    ErrorPassive = 17,
    /// EW
    WarningStatusChanged = 18,
    /// BO
    BusOff = 19,
    /// WDI
    Watchdog = 20,
    /// PEA
    ProtocolErrorArbitration = 21,
    /// PED
    ProtocolErrorData = 22,
    /// ARA
    AccessToReservedAddress = 23,
}

impl From<Interrupt> for u32 {
    fn from(x: Interrupt) -> Self {
        1 << x as u32
    }
}

/// Bit number that does not name an interrupt
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidInterruptNumber;

impl TryFrom<u8> for Interrupt {
    type Error = InvalidInterruptNumber;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Interrupt::*;
        let ret = match value {
            0 => RxFifo0NewMessage,
            1 => RxFifo0Full,
            2 => RxFifo0MessageLost,
            3 => RxFifo1NewMessage,
            4 => RxFifo1Full,
            5 => RxFifo1MessageLost,
            6 => HighPriorityMessage,
            7 => TransmissionCompleted,
            8 => TransmissionCancellationFinished,
            9 => TxFifoEmpty,
            10 => TxEventFifoNewEntry,
            11 => TxEventFifoFull,
            12 => TxEventFifoElementLost,
            13 => TimestampWraparound,
            14 => MessageRamAccessFailure,
            15 => TimeoutOccurred,
            16 => ErrorLoggingOverflow,
            17 => ErrorPassive,
            18 => WarningStatusChanged,
            19 => BusOff,
            20 => Watchdog,
            21 => ProtocolErrorArbitration,
            22 => ProtocolErrorData,
            23 => AccessToReservedAddress,
            24.. => Err(InvalidInterruptNumber)?,
        };
        Ok(ret)
    }
}

impl Interrupt {
    /// Line selection group the interrupt belongs to
    pub fn group(self) -> InterruptGroup {
        use Interrupt::*;
        match self {
            RxFifo0NewMessage | RxFifo0Full | RxFifo0MessageLost => InterruptGroup::RxFifo0,
            RxFifo1NewMessage | RxFifo1Full | RxFifo1MessageLost => InterruptGroup::RxFifo1,
            HighPriorityMessage | TransmissionCompleted | TransmissionCancellationFinished => {
                InterruptGroup::StatusMessage
            }
            TxFifoEmpty | TxEventFifoNewEntry | TxEventFifoFull | TxEventFifoElementLost => {
                InterruptGroup::TxFifoError
            }
            TimestampWraparound | MessageRamAccessFailure | TimeoutOccurred => {
                InterruptGroup::Miscellaneous
            }
            ErrorLoggingOverflow | ErrorPassive => InterruptGroup::BitLineError,
            WarningStatusChanged
            | BusOff
            | Watchdog
            | ProtocolErrorArbitration
            | ProtocolErrorData
            | AccessToReservedAddress => InterruptGroup::ProtocolError,
        }
    }
}

/// Line selection groups of ILS
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptGroup {
    /// RF0N, RF0F, RF0L
    RxFifo0,
    /// RF1N, RF1F, RF1L
    RxFifo1,
    /// HPM, TC, TCF
    StatusMessage,
    /// TFE, TEFN, TEFF, TEFL
    TxFifoError,
    /// TSW, MRAF, TOO
    Miscellaneous,
    /// ELO, EP
    BitLineError,
    /// EW, BO, WDI, PEA, PED, ARA
    ProtocolError,
}

impl InterruptGroup {
    const ALL: [Self; 7] = [
        Self::RxFifo0,
        Self::RxFifo1,
        Self::StatusMessage,
        Self::TxFifoError,
        Self::Miscellaneous,
        Self::BitLineError,
        Self::ProtocolError,
    ];

    fn field(self) -> Field {
        match self {
            Self::RxFifo0 => ils::RXFIFO0,
            Self::RxFifo1 => ils::RXFIFO1,
            Self::StatusMessage => ils::SMSG,
            Self::TxFifoError => ils::TFERR,
            Self::Miscellaneous => ils::MISC,
            Self::BitLineError => ils::BERR,
            Self::ProtocolError => ils::PERR,
        }
    }

    /// Interrupts routed together with this group
    pub fn members(self) -> InterruptSet {
        InterruptSet::ALL
            .iter()
            .filter(|int| int.group() == self)
            .collect()
    }
}

/// An iterator over the items of an [`InterruptSet`].
///
/// This `struct` is created by [`InterruptSet::iter`].
pub struct Iter {
    flags: InterruptSet,
    index: u8,
}

impl Iterator for Iter {
    type Item = Interrupt;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let i = self.index;
            // Since there are no gaps in the interrupt flags, this will be `Some` until all
            // interrupts have been checked.
            let int = Interrupt::try_from(i).ok()?;
            self.index += 1;
            if self.flags.0 & (1 << i) != 0 {
                return Some(int);
            }
        }
    }
}

/// Has exclusive access to a set of interrupts. Permits safe access to the
/// owned interrupt flags.
pub struct OwnedInterruptSet<'a> {
    ir: &'a Reg,
    set: InterruptSet,
}

// Safety: Only the flags in `set` are read or written, and no two owned sets
// overlap.
unsafe impl Send for OwnedInterruptSet<'_> {}

/// An input [`InterruptSet`] contained interrupts that were not available. The
/// set wrapped in the error indicates which elements caused the problem.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MaskError(pub InterruptSet);

impl<'a> OwnedInterruptSet<'a> {
    /// Moves ownership of the interrupts described by `subset` from `self` to
    /// the return value. If `self` does not contain `subset`, an error is
    /// returned.
    fn split(&mut self, subset: InterruptSet) -> Result<Self, MaskError> {
        let missing = !self.set.0 & subset.0;
        if missing != 0 {
            Err(MaskError(InterruptSet(missing)))
        } else {
            self.set.0 &= !subset.0;
            Ok(Self {
                ir: self.ir,
                set: subset,
            })
        }
    }

    /// Assume ownership of the interrupts in `other`.
    fn join(&mut self, other: Self) {
        debug_assert!(self.set.0 & other.set.0 == 0);
        self.set.0 |= other.set.0;
    }

    /// Interrupts owned by this set
    pub fn owned(&self) -> InterruptSet {
        self.set
    }

    /// Get the subset of interrupts in this set that are currently flagged.
    pub fn interrupt_flags(&self) -> InterruptSet {
        InterruptSet(self.ir.read() & self.set.0)
    }

    /// Clear the indicated `interrupts`. Interrupts not owned by this
    /// `OwnedInterruptSet` are silently ignored.
    pub fn clear_interrupts(&self, interrupts: InterruptSet) {
        // Flags are write-1-to-clear; 0 bits leave the other flags alone.
        self.ir.write(interrupts.0 & self.set.0);
    }

    /// Clears the flagged interrupts owned by this `OwnedInterruptSet` and
    /// provides an iterator over the flags that were cleared.
    pub fn iter_flagged(&self) -> Iter {
        let interrupts = self.interrupt_flags();
        self.clear_interrupts(interrupts);
        interrupts.iter()
    }

    /// Clears `interrupt` and returns `true` if it was flagged.
    pub fn take(&self, interrupt: Interrupt) -> bool {
        if self.interrupt_flags().contains(interrupt) {
            self.clear_interrupts(interrupt.into());
            true
        } else {
            false
        }
    }
}

/// Controls enabling and line selection of interrupts.
pub struct InterruptConfiguration<'a> {
    regs: &'a RegisterBlock,
    disabled: OwnedInterruptSet<'a>,
}

// Safety: See `OwnedInterruptSet`; IE, ILS and ILE are owned exclusively.
unsafe impl Send for InterruptConfiguration<'_> {}

impl<'a> InterruptConfiguration<'a> {
    /// This type takes ownership of some of the registers from the peripheral
    /// RegisterBlock. Do not instantiate more than once.
    /// - ILS
    /// - ILE
    /// - IE
    /// - IR
    pub(crate) fn new(regs: &'a RegisterBlock) -> Self {
        // Disable all interrupts on the peripheral by writing the reset values.
        regs.ie.write(0);
        regs.ils.write(0);
        regs.ile.write(0);
        Self {
            regs,
            disabled: OwnedInterruptSet {
                ir: &regs.ir,
                set: InterruptSet::ALL,
            },
        }
    }

    /// Request to enable the set of `interrupts` on the chosen interrupt line.
    /// Fails if some of the requested interrupts are already enabled.
    ///
    /// Line selection is per [`InterruptGroup`], so already enabled interrupts
    /// of the same groups move to `line` as well.
    pub fn enable(
        &mut self,
        interrupts: InterruptSet,
        line: InterruptLine,
    ) -> Result<OwnedInterruptSet<'a>, MaskError> {
        let interrupts = self.disabled.split(interrupts)?;
        self.set_line(&interrupts, line);
        self.set_enabled(&interrupts, true);
        debug!("interrupts {} enabled on {}", interrupts.set, line);
        Ok(interrupts)
    }

    /// Disable the set of `interrupts` and move ownership back to the
    /// `InterruptConfiguration`.
    pub fn disable(&mut self, interrupts: OwnedInterruptSet<'a>) {
        self.set_enabled(&interrupts, false);
        self.disabled.join(interrupts);
    }

    /// Set the interrupt line that will trigger for the groups of a set of
    /// peripheral interrupts, and enable that line.
    pub fn set_line(&mut self, interrupts: &OwnedInterruptSet<'a>, line: InterruptLine) {
        for group in InterruptGroup::ALL {
            if group.members().0 & interrupts.set.0 != 0 {
                self.route(group, line);
            }
        }
    }

    /// Assigns `group` to `line` and enables the line.
    pub fn route(&mut self, group: InterruptGroup, line: InterruptLine) {
        self.regs
            .ils
            .set_flag(group.field(), line == InterruptLine::Line1);
        self.regs.ile.set_bits(match line {
            InterruptLine::Line0 => ile::EINT0,
            InterruptLine::Line1 => ile::EINT1,
        });
    }

    fn set_enabled(&mut self, interrupts: &OwnedInterruptSet<'a>, enabled: bool) {
        let mask = interrupts.set.0;
        self.regs.ie.modify(|r| if enabled { r | mask } else { r & !mask });
    }
}

/// Services the new-message interrupt of `fifo`.
///
/// If the interrupt is flagged, it is cleared and exactly one frame is
/// received into `buffer`. Returns `None` if the interrupt was not flagged or
/// is not owned by `interrupts`.
pub fn dispatch_new_message<F: FifoId>(
    interrupts: &OwnedInterruptSet<'_>,
    fifo: &mut RxFifo<'_, F>,
    buffer: &mut [u8],
) -> Option<Result<Received, RxError>> {
    interrupts
        .take(F::NEW_MESSAGE)
        .then(|| fifo.receive(buffer))
}
