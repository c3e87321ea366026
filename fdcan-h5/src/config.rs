//! CAN bus configuration

use crate::messageram::MessageRam;
use core::ops::RangeInclusive;
use fugit::HertzU32;

/// Configuration for the CAN bus
///
/// Applied exactly once, while the controller is in configuration mode, by
/// [`CanConfigurable::finalize`](crate::bus::CanConfigurable::finalize).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CanConfig {
    /// Bus participation and test modes
    pub mode: Mode,
    /// Retransmit frames that lost arbitration or were disturbed by errors
    pub automatic_retransmission: bool,
    /// Frame format
    pub frame_format: FrameFormat,
    /// Bit timing of the arbitration phase
    pub nominal_timing: BitTiming,
    /// Timestamp configuration
    pub timestamp: Timestamp,
    /// RX FIFO 0 mode
    pub rx_fifo_0: RxFifoMode,
    /// RX FIFO 1 mode
    pub rx_fifo_1: RxFifoMode,
    /// Transmit buffer submode
    pub tx_queue_mode: TxQueueMode,
    /// Number of active standard ID filter elements, at most 28
    pub standard_filters: u8,
    /// Number of active extended ID filter elements, at most 8
    pub extended_filters: u8,
}

impl CanConfig {
    /// Create an instance
    ///
    /// Nominal bit timing must be provided, all other settings come
    /// pre-populated with default values: normal mode, automatic
    /// retransmission, classic frames, blocking FIFOs, FIFO transmission and
    /// all filter elements active.
    pub fn new(nominal_timing: BitTiming) -> Self {
        Self {
            mode: Mode::default(),
            automatic_retransmission: true,
            frame_format: FrameFormat::default(),
            nominal_timing,
            timestamp: Timestamp::default(),
            rx_fifo_0: RxFifoMode::default(),
            rx_fifo_1: RxFifoMode::default(),
            tx_queue_mode: TxQueueMode::default(),
            standard_filters: MessageRam::STANDARD_FILTERS as u8,
            extended_filters: MessageRam::EXTENDED_FILTERS as u8,
        }
    }
}

/// Bus participation and test modes
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    /// Regular bus operation
    #[default]
    Normal,
    /// Receives and acknowledges, never transmits on its own
    Restricted,
    /// Listens only: no acknowledgements, no error frames, no transmissions
    BusMonitoring,
    /// Transmitted frames are looped back internally; nothing is driven on
    /// the bus
    InternalLoopback,
    /// Transmitted frames are looped back and also driven on the bus
    ExternalLoopback,
}

/// Frame format
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum FrameFormat {
    /// Classic CAN with up to 8 bytes of data. Reception of an FD frame is
    /// considered an error.
    #[default]
    Classic,
}

/// Bit-timing parameters
///
/// The bit time is determined by
/// - the time quantum `t_q`, which is the kernel clock divided by `prescaler`
/// - the number of time quanta in a bit time, determined by `phase_seg_1` and
///   `phase_seg_2`
///
/// This struct expects *real* values, the subtractions the HW register
/// expects are handled by the driver. None of the values may be zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    /// Synchronization jump width
    pub sjw: u8,
    /// Propagation time and phase time before sample point
    pub phase_seg_1: u16,
    /// Time after sample point
    pub phase_seg_2: u8,
    /// Kernel clock divider
    pub prescaler: u16,
}

/// Misconfigurations of [`BitTiming`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BitTimingError {
    /// SJW is outside the wrapped `RangeInclusive`
    SynchronizationJumpWidthOutOfRange(RangeInclusive<u32>),
    /// Phase segment 1 is outside the wrapped `RangeInclusive`
    PhaseSeg1OutOfRange(RangeInclusive<u32>),
    /// Phase segment 2 is outside the wrapped `RangeInclusive`
    PhaseSeg2OutOfRange(RangeInclusive<u32>),
    /// Total bit time quanta is outside the wrapped `RangeInclusive`
    BitTimeOutOfRange(RangeInclusive<u32>),
    /// Prescaler is outside the wrapped `RangeInclusive`
    PrescalerOutOfRange(RangeInclusive<u32>),
    /// No valid prescaler could be found
    ///
    /// `can_clock` must be divisible by `bitrate * bit_time_quanta`
    NoValidPrescaler {
        /// Provided kernel clock
        can_clock: HertzU32,
        /// Requested bitrate
        bitrate: HertzU32,
        /// Time quanta per bit
        bit_time_quanta: u32,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for BitTimingError {
    fn format(&self, f: defmt::Formatter) {
        let (name, range) = match self {
            Self::SynchronizationJumpWidthOutOfRange(r) => ("SJW", r),
            Self::PhaseSeg1OutOfRange(r) => ("phase segment 1", r),
            Self::PhaseSeg2OutOfRange(r) => ("phase segment 2", r),
            Self::BitTimeOutOfRange(r) => ("bit time", r),
            Self::PrescalerOutOfRange(r) => ("prescaler", r),
            Self::NoValidPrescaler {
                can_clock,
                bitrate,
                bit_time_quanta,
            } => {
                return defmt::write!(
                    f,
                    "no valid prescaler for {} Hz at {} Hz with {} quanta",
                    can_clock.to_Hz(),
                    bitrate.to_Hz(),
                    bit_time_quanta,
                )
            }
        };
        defmt::write!(
            f,
            "{=str} out of range {}..={}",
            name,
            range.start(),
            range.end()
        )
    }
}

/// Valid values of a BitTiming struct
#[derive(Clone)]
pub(crate) struct BitTimingRanges {
    sjw: RangeInclusive<u32>,
    phase_seg_1: RangeInclusive<u32>,
    phase_seg_2: RangeInclusive<u32>,
    /// The bit time, in time quanta
    time_quanta_per_bit: RangeInclusive<u32>,
    prescaler: RangeInclusive<u32>,
}

pub(crate) const NOMINAL_BIT_TIMING_RANGES: BitTimingRanges = BitTimingRanges {
    sjw: 1..=128,
    phase_seg_1: 1..=256,
    phase_seg_2: 1..=128,
    time_quanta_per_bit: 4..=385,
    prescaler: 1..=512,
};

impl BitTiming {
    /// Timing with an explicit prescaler
    pub const fn new(prescaler: u16, phase_seg_1: u16, phase_seg_2: u8, sjw: u8) -> Self {
        Self {
            sjw,
            phase_seg_1,
            phase_seg_2,
            prescaler,
        }
    }

    /// Derives the prescaler that yields `bitrate` from `can_clock` with the
    /// given segment lengths
    pub fn for_bitrate(
        can_clock: HertzU32,
        bitrate: HertzU32,
        phase_seg_1: u16,
        phase_seg_2: u8,
        sjw: u8,
    ) -> Result<Self, BitTimingError> {
        let mut timing = Self::new(1, phase_seg_1, phase_seg_2, sjw);
        timing.check_segments(&NOMINAL_BIT_TIMING_RANGES)?;
        let bit_time_quanta = timing.time_quanta_per_bit();
        let f_q = bitrate.to_Hz().saturating_mul(bit_time_quanta);
        match can_clock.to_Hz().checked_rem(f_q) {
            Some(0) => {
                let prescaler = can_clock.to_Hz() / f_q;
                if !NOMINAL_BIT_TIMING_RANGES.prescaler.contains(&prescaler) {
                    return Err(BitTimingError::PrescalerOutOfRange(
                        NOMINAL_BIT_TIMING_RANGES.prescaler.clone(),
                    ));
                }
                timing.prescaler = prescaler as u16;
                Ok(timing)
            }
            _ => Err(BitTimingError::NoValidPrescaler {
                can_clock,
                bitrate,
                bit_time_quanta,
            }),
        }
    }

    /// Returns the number of time quanta that make up one bit time, `t_bit /
    /// t_q`
    pub fn time_quanta_per_bit(&self) -> u32 {
        1 + u32::from(self.phase_seg_1) + u32::from(self.phase_seg_2)
    }

    /// Bitrate these settings produce from `can_clock`
    pub fn bitrate(&self, can_clock: HertzU32) -> HertzU32 {
        let divider = u32::from(self.prescaler.max(1)) * self.time_quanta_per_bit();
        HertzU32::from_raw(can_clock.to_Hz() / divider)
    }

    fn check_segments(&self, valid: &BitTimingRanges) -> Result<(), BitTimingError> {
        if !valid.sjw.contains(&self.sjw.into()) {
            Err(BitTimingError::SynchronizationJumpWidthOutOfRange(
                valid.sjw.clone(),
            ))
        } else if !valid.phase_seg_1.contains(&self.phase_seg_1.into()) {
            Err(BitTimingError::PhaseSeg1OutOfRange(
                valid.phase_seg_1.clone(),
            ))
        } else if !valid.phase_seg_2.contains(&self.phase_seg_2.into()) {
            Err(BitTimingError::PhaseSeg2OutOfRange(
                valid.phase_seg_2.clone(),
            ))
        } else if !valid
            .time_quanta_per_bit
            .contains(&self.time_quanta_per_bit())
        {
            Err(BitTimingError::BitTimeOutOfRange(
                valid.time_quanta_per_bit.clone(),
            ))
        } else {
            Ok(())
        }
    }

    pub(crate) fn check(&self, valid: &BitTimingRanges) -> Result<(), BitTimingError> {
        self.check_segments(valid)?;
        if !valid.prescaler.contains(&self.prescaler.into()) {
            Err(BitTimingError::PrescalerOutOfRange(valid.prescaler.clone()))
        } else {
            Ok(())
        }
    }
}

/// Timestamp counter configuration
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timestamp {
    /// Counting mode of time stamp timer
    pub select: TimeStampSelect,
    /// Time stamp timer prescaler, bit times per tick
    /// Valid values are: 1 <= prescaler <= 16
    pub prescaler: u8,
}

impl Default for Timestamp {
    fn default() -> Self {
        Self {
            select: TimeStampSelect::Zero,
            prescaler: 1,
        }
    }
}

/// Source of the timestamp counter
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeStampSelect {
    /// Counter stays at zero
    #[default]
    Zero = 0,
    /// Counts bit times, scaled by the prescaler
    Increment = 1,
    /// Driven by the external timestamp source
    External = 2,
}

/// Mode of operation for an RX FIFO
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RxFifoMode {
    /// When the RX FIFO is full, incoming messages are dropped until at least
    /// one message has been read out from the FIFO.
    #[default]
    Blocking,
    /// When the RX FIFO is full, the oldest message is overwritten by the
    /// new one.
    ///
    /// The element at the get index may be overwritten while it is being read,
    /// so reads of a full FIFO in this mode start one element past the get
    /// index.
    Overwrite,
}

impl From<RxFifoMode> for bool {
    fn from(val: RxFifoMode) -> Self {
        match val {
            RxFifoMode::Overwrite => true,
            RxFifoMode::Blocking => false,
        }
    }
}

/// Mode of operation for the transmit queue
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxQueueMode {
    /// Messages are sent according to the order they are enqueued
    #[default]
    Fifo,
    /// Messages are sent according to their priority
    ///
    /// Lower ID means higher priority. Messages of the same ID are sent in an
    /// arbitrary order. This is the same order as arbitration on the bus would
    /// give.
    Priority,
}

impl From<TxQueueMode> for bool {
    fn from(val: TxQueueMode) -> Self {
        match val {
            TxQueueMode::Priority => true,
            TxQueueMode::Fifo => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use fugit::RateExtU32;

    #[test]
    fn one_megabit_from_250_mhz() {
        let timing = BitTiming::for_bitrate(250.MHz(), 1.MHz(), 7, 2, 1).unwrap();
        assert_eq!(timing.prescaler, 25);
        assert_eq!(timing.bitrate(250.MHz()), 1.MHz::<1, 1>());
    }

    #[test]
    fn indivisible_clock_is_rejected() {
        assert!(matches!(
            BitTiming::for_bitrate(250.MHz(), 1.MHz(), 8, 2, 1),
            Err(BitTimingError::NoValidPrescaler { .. })
        ));
    }

    #[test]
    fn zero_values_are_rejected() {
        let valid = &NOMINAL_BIT_TIMING_RANGES;
        assert!(matches!(
            BitTiming::new(0, 7, 2, 1).check(valid),
            Err(BitTimingError::PrescalerOutOfRange(_))
        ));
        assert!(matches!(
            BitTiming::new(25, 0, 2, 1).check(valid),
            Err(BitTimingError::PhaseSeg1OutOfRange(_))
        ));
        assert!(matches!(
            BitTiming::new(25, 7, 0, 1).check(valid),
            Err(BitTimingError::PhaseSeg2OutOfRange(_))
        ));
        assert!(matches!(
            BitTiming::new(25, 7, 2, 0).check(valid),
            Err(BitTimingError::SynchronizationJumpWidthOutOfRange(_))
        ));
        assert_eq!(BitTiming::new(25, 7, 2, 1).check(valid), Ok(()));
    }

    #[test]
    fn defaults() {
        let config = CanConfig::new(BitTiming::new(25, 7, 2, 1));
        assert_eq!(config.mode, Mode::Normal);
        assert!(config.automatic_retransmission);
        assert_eq!(config.standard_filters, 28);
        assert_eq!(config.extended_filters, 8);
    }
}
