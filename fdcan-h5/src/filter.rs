//! Message filters
//!
//! Only standard (11-bit) ID filter elements are programmed by this driver.
//! Frames with extended IDs are handled by the global policy alone.

use crate::reg::rxgfc;
use embedded_can::StandardId;
use fdcan_h5_core::Reg;
use vcell::VolatileCell;

/// Acceptance filters for standard IDs
pub struct FiltersStandard<'a> {
    memory: &'a [VolatileCell<u32>],
    len: usize,
    next: usize,
}

/// Errors of the filter programmer
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterError {
    /// Filter slot index is not below the number of active filter elements
    OutOfBounds {
        /// Requested slot
        slot: usize,
        /// Number of usable slots
        limit: usize,
    },
}

impl<'a> FiltersStandard<'a> {
    /// `len` is the number of active elements configured in the controller;
    /// it is clamped to the size of the filter section.
    ///
    /// All filters are assumed to be disabled initially. This is the case if
    /// the memory is zeroed.
    pub(crate) fn new(memory: &'a [VolatileCell<u32>], len: usize) -> Self {
        Self {
            memory,
            len: len.min(memory.len()),
            next: 0,
        }
    }

    /// Follows a change of the active element count. Filters already
    /// programmed beyond the new count are left in memory but ignored by the
    /// controller.
    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len.min(self.memory.len());
        self.next = self.next.min(self.len);
    }

    /// Number of usable filter slots
    pub fn capacity(&self) -> usize {
        self.len
    }

    /// Overwrites the filter at `slot`.
    ///
    /// Nothing is written if `slot` is outside the active filter elements.
    pub fn program(&mut self, slot: usize, filter: StandardFilter) -> Result<(), FilterError> {
        let element = self
            .memory
            .get(slot)
            .filter(|_| slot < self.len)
            .ok_or(FilterError::OutOfBounds {
                slot,
                limit: self.len,
            })?;
        let word = filter.word();
        debug!(
            "filter slot {} at {:#x} <- {:#x}",
            slot,
            element as *const _ as usize,
            word
        );
        element.set(word);
        Ok(())
    }

    /// Disables the filter at `slot`.
    pub fn disable(&mut self, slot: usize) -> Result<(), FilterError> {
        self.program(slot, StandardFilter::disabled())
    }

    /// Writes `filter` to the slot after the last one written by `push`.
    /// Returns the assigned slot.
    pub fn push(&mut self, filter: StandardFilter) -> Result<usize, FilterError> {
        let slot = self.next;
        self.program(slot, filter)?;
        self.next += 1;
        Ok(slot)
    }

    /// Disables every active filter element and restarts [`Self::push`] at
    /// slot 0.
    pub fn clear(&mut self) {
        self.memory[..self.len].iter().for_each(|f| f.set(0));
        self.next = 0;
    }
}

/// Interpretation of the two ID fields of a filter element
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterType {
    /// Matches IDs from `id1` to `id2` inclusive
    Range = 0,
    /// Matches `id1` or `id2`
    Dual = 1,
    /// Matches IDs equal to `id1` in the bits set in the mask `id2`
    Classic = 2,
    /// Encoding 3; standard ID elements of this type are treated as disabled
    /// by the controller
    RangeNoMask = 3,
}

/// What happens to a frame matching a filter element
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    /// The element is skipped
    Disable,
    /// Store in RX FIFO 0 if filter matches
    StoreFifo0,
    /// Store in RX FIFO 1 if filter matches
    StoreFifo1,
    /// Reject ID if filter matches
    Reject,
    /// Set priority if filter matches
    Priority,
    /// Set priority and store in FIFO 0 if filter matches
    PriorityFifo0,
    /// Set priority and store in FIFO 1 if filter matches
    PriorityFifo1,
}

impl From<Action> for u32 {
    fn from(val: Action) -> Self {
        match val {
            Action::Disable => 0x0,
            Action::StoreFifo0 => 0x1,
            Action::StoreFifo1 => 0x2,
            Action::Reject => 0x3,
            Action::Priority => 0x4,
            Action::PriorityFifo0 => 0x5,
            Action::PriorityFifo1 => 0x6,
        }
    }
}

/// Standard ID filter element
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StandardFilter {
    /// How `id1` and `id2` are interpreted
    pub filter_type: FilterType,
    /// Action on match
    pub action: Action,
    /// First ID field
    pub id1: StandardId,
    /// Second ID field
    pub id2: StandardId,
}

#[cfg(feature = "defmt")]
impl defmt::Format for StandardFilter {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "StandardFilter {{ filter_type: {}, action: {}, id1: {=u16:#x}, id2: {=u16:#x} }}",
            self.filter_type,
            self.action,
            self.id1.as_raw(),
            self.id2.as_raw(),
        )
    }
}

impl StandardFilter {
    /// Element that never matches
    pub fn disabled() -> Self {
        Self {
            filter_type: FilterType::Range,
            action: Action::Disable,
            id1: StandardId::ZERO,
            id2: StandardId::ZERO,
        }
    }

    /// Traditional filter/mask element
    pub fn classic(action: Action, filter: StandardId, mask: StandardId) -> Self {
        Self {
            filter_type: FilterType::Classic,
            action,
            id1: filter,
            id2: mask,
        }
    }

    /// Element matching two individual IDs
    pub fn dual(action: Action, id1: StandardId, id2: StandardId) -> Self {
        Self {
            filter_type: FilterType::Dual,
            action,
            id1,
            id2,
        }
    }

    /// Element matching `low..=high`
    pub fn range(action: Action, low: StandardId, high: StandardId) -> Self {
        Self {
            filter_type: FilterType::Range,
            action,
            id1: low,
            id2: high,
        }
    }

    /// Element in the peripheral's representation
    pub fn word(&self) -> u32 {
        let action: u32 = self.action.into();
        ((self.filter_type as u32) << 30)
            | (action << 27)
            | (u32::from(self.id1.as_raw()) << 16)
            | u32::from(self.id2.as_raw())
    }
}

/// Treatment of frames no filter element matched
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NonMatchingAction {
    /// Store in RX FIFO 0
    #[default]
    AcceptFifo0 = 0,
    /// Store in RX FIFO 1
    AcceptFifo1 = 1,
    /// Discard
    Reject = 2,
}

/// Global filter policy
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GlobalFilter {
    /// Reject all remote frames with extended IDs
    pub reject_remote_extended: bool,
    /// Reject all remote frames with standard IDs
    pub reject_remote_standard: bool,
    /// Non-matching frames with extended IDs
    pub non_matching_extended: NonMatchingAction,
    /// Non-matching frames with standard IDs
    pub non_matching_standard: NonMatchingAction,
}

impl GlobalFilter {
    /// Policy that drops everything the filter elements do not accept
    pub fn reject_non_matching() -> Self {
        Self {
            reject_remote_extended: true,
            reject_remote_standard: true,
            non_matching_extended: NonMatchingAction::Reject,
            non_matching_standard: NonMatchingAction::Reject,
        }
    }

    /// Overwrites the four policy fields, leaving the rest of the register as
    /// it is.
    pub(crate) fn apply(&self, reg: &Reg) {
        reg.modify(|w| {
            let w = rxgfc::RRFE.set(w, self.reject_remote_extended.into());
            let w = rxgfc::RRFS.set(w, self.reject_remote_standard.into());
            let w = rxgfc::ANFE.set(w, self.non_matching_extended as u32);
            rxgfc::ANFS.set(w, self.non_matching_standard as u32)
        });
        debug!("global filter rxgfc = {:#x}", reg.read());
    }
}
