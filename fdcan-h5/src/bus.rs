//! Controller bring-up and the operational bus handle

use crate::config::{BitTimingError, CanConfig, FrameFormat, Mode, NOMINAL_BIT_TIMING_RANGES};
use crate::filter::{FiltersStandard, GlobalFilter};
use crate::interrupt::InterruptConfiguration;
use crate::message::{Frame, TxHeader};
use crate::messageram::MessageRam;
use crate::reg::{cccr, ecr, nbtp, psr, rxgfc, test as test_reg, tscc, tscv, txbc, RegisterBlock};
use crate::rx_fifo::{Fifo0, Fifo1, RxError, RxFifo};
use crate::tx_buffers::{Tx, TxError};
use crate::tx_event_fifo::TxEventFifo;
use embedded_can::Id;
use fdcan_h5_core::{BoundedWait, Dependencies, Field, Reg, TimedOut};

/// Errors that may occur during configuration
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigurationError {
    /// Problems with the bit timing configuration
    BitTiming(BitTimingError),
    /// Time stamp prescaler value is not in the range [1, 16]
    InvalidTimeStampPrescaler,
    /// More active filter elements than the message RAM section holds
    TooManyFilters,
    /// The controller no longer reports INIT and CCE
    NotInConfigurationMode,
    /// The controller did not acknowledge an INIT or CCE change in time
    ConfigurationTimeout,
}

impl From<BitTimingError> for ConfigurationError {
    fn from(value: BitTimingError) -> Self {
        Self::BitTiming(value)
    }
}

impl From<TimedOut> for ConfigurationError {
    fn from(_: TimedOut) -> Self {
        Self::ConfigurationTimeout
    }
}

/// Snapshot of the error counter register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorCounters {
    /// Transmit error counter
    pub transmit: u8,
    /// Receive error counter
    pub receive: u8,
    /// The receive error counter reached the error passive level
    pub receive_error_passive: bool,
    /// CAN error logging counter
    pub logging: u8,
}

/// Type of the last error on the bus
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LastErrorCode {
    /// No error since the code was last read
    NoError,
    /// More than 5 equal bits in a sequence
    StuffError,
    /// Fixed format part of a frame had the wrong format
    FormError,
    /// A transmitted frame was not acknowledged
    AckError,
    /// A recessive bit was sent but dominant was monitored
    Bit1Error,
    /// A dominant bit was sent but recessive was monitored
    Bit0Error,
    /// CRC check sum mismatch
    CrcError,
    /// No bus event since the code was last read
    NoChange,
}

impl From<u32> for LastErrorCode {
    fn from(value: u32) -> Self {
        match value & 0b111 {
            0 => Self::NoError,
            1 => Self::StuffError,
            2 => Self::FormError,
            3 => Self::AckError,
            4 => Self::Bit1Error,
            5 => Self::Bit0Error,
            6 => Self::CrcError,
            _ => Self::NoChange,
        }
    }
}

/// Communication state of the controller
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    /// Waiting for bus idle
    Synchronizing,
    /// Neither receiving nor transmitting
    Idle,
    /// Receiving a frame
    Receiver,
    /// Transmitting a frame
    Transmitter,
}

impl From<u32> for Activity {
    fn from(value: u32) -> Self {
        match value & 0b11 {
            0 => Self::Synchronizing,
            1 => Self::Idle,
            2 => Self::Receiver,
            _ => Self::Transmitter,
        }
    }
}

/// Snapshot of the protocol status register
///
/// Reading the status clears the error codes in hardware.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProtocolStatus {
    /// Last error in the arbitration phase
    pub last_error: LastErrorCode,
    /// Current activity
    pub activity: Activity,
    /// Error passive state
    pub error_passive: bool,
    /// At least one error counter reached the warning limit of 96
    pub warning: bool,
    /// Bus off state
    pub bus_off: bool,
    /// Last error in the data phase of an FD frame
    pub data_last_error: LastErrorCode,
    /// ESI flag of the last received FD frame
    pub received_esi: bool,
    /// BRS flag of the last received FD frame
    pub received_brs: bool,
    /// An FD frame was received since the flag was last cleared
    pub received_fd: bool,
    /// A protocol exception event occurred
    pub protocol_exception: bool,
    /// Transmitter delay compensation value
    pub delay_compensation: u8,
}

impl From<u32> for ProtocolStatus {
    fn from(r: u32) -> Self {
        Self {
            last_error: psr::LEC.get(r).into(),
            activity: psr::ACT.get(r).into(),
            error_passive: psr::EP.get(r) != 0,
            warning: psr::EW.get(r) != 0,
            bus_off: psr::BO.get(r) != 0,
            data_last_error: psr::DLEC.get(r).into(),
            received_esi: psr::RESI.get(r) != 0,
            received_brs: psr::RBRS.get(r) != 0,
            received_fd: psr::REDL.get(r) != 0,
            protocol_exception: psr::PXE.get(r) != 0,
            delay_compensation: psr::TDCV.get(r) as u8,
        }
    }
}

/// A CAN bus that is not in configuration mode (CCE=0). Some errors (including
/// Bus_Off) can asynchronously stop bus operation (INIT=1), which will require
/// user intervention to reactivate the bus to resume sending and receiving
/// messages.
pub struct Can<'a, D> {
    /// Controls enabling and line selection of interrupts.
    pub interrupts: InterruptConfiguration<'a>,
    /// Receive FIFO 0
    pub rx_fifo_0: RxFifo<'a, Fifo0>,
    /// Receive FIFO 1
    pub rx_fifo_1: RxFifo<'a, Fifo1>,
    /// Transmit FIFO/queue
    pub tx: Tx<'a>,
    /// Events of frames sent with a TX event request
    pub tx_event_fifo: TxEventFifo<'a>,

    /// Implementation details. The field is public to allow destructuring.
    pub internals: Internals<'a, D>,
}

/// Implementation details.
pub struct Internals<'a, D> {
    regs: &'a RegisterBlock,
    dependencies: D,
    config: CanConfig,
    wait: BoundedWait,
    filters_standard: FiltersStandard<'a>,
}

impl<'a, D: Dependencies> Internals<'a, D> {
    /// Switches between "Software Initialization" mode and "Normal Operation".
    /// In Software Initialization, messages are not received or transmitted.
    /// In Normal Operation, messages can be transmitted and received.
    ///
    /// Gives up when the controller does not report the new state within the
    /// poll budget.
    pub fn set_init(&mut self, init: bool) -> Result<(), ConfigurationError> {
        let reg = &self.regs.cccr;
        reg.set_flag(cccr::INIT, init);
        await_flag(reg, cccr::INIT, init, &self.wait)
    }

    fn enable_cce(&mut self) -> Result<(), ConfigurationError> {
        let reg = &self.regs.cccr;
        reg.set_bits(cccr::CCE);
        await_flag(reg, cccr::CCE, true, &self.wait)
    }

    /// Releases the dependencies. The controller is left as it is.
    pub fn release(self) -> D {
        self.dependencies
    }
}

/// Polls `field` until the controller reports it as `expected`.
fn await_flag(
    reg: &Reg,
    field: Field,
    expected: bool,
    wait: &BoundedWait,
) -> Result<(), ConfigurationError> {
    Ok(wait.until(|| reg.is_set(field) == expected)?)
}

/// A CAN bus in configuration mode. Before messages can be sent and received,
/// it needs to be [`Self::finalize`]d.
pub struct CanConfigurable<'a, D>(
    /// The type invariant of CCE=0 is broken while this is wrapped.
    Can<'a, D>,
);

impl<D: Dependencies> CanConfigurable<'static, D> {
    /// Create new can peripheral.
    ///
    /// Enables the controller clock, clears the message RAM and enters
    /// configuration mode. The returned peripheral is not operational; use
    /// [`Self::finalize`] to apply `config` and start transmitting and
    /// receiving.
    pub fn new(
        dependencies: D,
        config: CanConfig,
        wait: BoundedWait,
    ) -> Result<Self, ConfigurationError> {
        // Safety: `dependencies` implies ownership of the controller pointed to by
        // `D::Id` and its message RAM, so these are the only references.
        unsafe {
            Self::from_parts(
                RegisterBlock::of::<D::Id>(),
                MessageRam::of::<D::Id>(),
                dependencies,
                config,
                wait,
            )
        }
    }
}

impl<'a, D: Dependencies> CanConfigurable<'a, D> {
    /// Like [`Self::new`], on explicitly provided registers and message RAM.
    ///
    /// # Safety
    /// `regs` and `memory` must belong to the controller of `D::Id` and must
    /// not be accessed by anything else while the returned value and the
    /// [`Can`] built from it exist.
    pub unsafe fn from_parts(
        regs: &'a RegisterBlock,
        memory: &'a MessageRam,
        mut dependencies: D,
        config: CanConfig,
        wait: BoundedWait,
    ) -> Result<Self, ConfigurationError> {
        dependencies.enable_clock();
        debug!(
            "fdcan clocks: host {} Hz, kernel {} Hz",
            dependencies.host_clock().to_Hz(),
            dependencies.can_clock().to_Hz()
        );

        let mut internals = Internals {
            regs,
            dependencies,
            config,
            wait,
            filters_standard: FiltersStandard::new(
                &memory.filters_standard,
                config.standard_filters.into(),
            ),
        };
        internals.set_init(true)?;
        internals.enable_cce()?;
        // Filters are expected to start out disabled.
        memory.clear();

        Ok(Self(Can {
            interrupts: InterruptConfiguration::new(regs),
            rx_fifo_0: RxFifo::new(regs, &memory.rx_fifo_0),
            rx_fifo_1: RxFifo::new(regs, &memory.rx_fifo_1),
            tx: Tx::new(regs, &memory.tx_buffers),
            tx_event_fifo: TxEventFifo::new(regs, &memory.tx_event_fifo),
            internals,
        }))
    }

    /// Raw access to the registers.
    ///
    /// # Safety
    /// The abstraction assumes that it has exclusive ownership of the
    /// registers. Direct access can break such assumptions.
    pub unsafe fn registers(&self) -> &RegisterBlock {
        self.0.internals.regs
    }

    /// Allows reconfiguring the acceptance filters for standard IDs.
    ///
    /// The number of usable slots follows
    /// [`CanConfig::standard_filters`](crate::config::CanConfig).
    pub fn filters_standard(&mut self) -> &mut FiltersStandard<'a> {
        let internals = &mut self.0.internals;
        internals
            .filters_standard
            .set_len(internals.config.standard_filters.into());
        &mut internals.filters_standard
    }

    /// Sets the policy for frames no filter element matched and for remote
    /// frames.
    pub fn set_global_filter(&mut self, filter: &GlobalFilter) {
        filter.apply(&self.0.internals.regs.rxgfc);
    }

    /// Allows reconfiguring interrupts.
    pub fn interrupts(&mut self) -> &mut InterruptConfiguration<'a> {
        &mut self.0.interrupts
    }

    /// Allows reconfiguring config
    pub fn config(&mut self) -> &mut CanConfig {
        &mut self.0.internals.config
    }

    fn validate(config: &CanConfig) -> Result<(), ConfigurationError> {
        config.nominal_timing.check(&NOMINAL_BIT_TIMING_RANGES)?;
        if !(1..=16).contains(&config.timestamp.prescaler) {
            return Err(ConfigurationError::InvalidTimeStampPrescaler);
        }
        if usize::from(config.standard_filters) > MessageRam::STANDARD_FILTERS
            || usize::from(config.extended_filters) > MessageRam::EXTENDED_FILTERS
        {
            return Err(ConfigurationError::TooManyFilters);
        }
        Ok(())
    }

    /// Apply parameters from a bus config struct
    fn apply_bus_config(&mut self) -> Result<(), ConfigurationError> {
        let regs = self.0.internals.regs;
        let config = &self.0.internals.config;
        Self::validate(config)?;

        let status = regs.cccr.read();
        if cccr::INIT.get(status) == 0 || cccr::CCE.get(status) == 0 {
            return Err(ConfigurationError::NotInConfigurationMode);
        }

        // (TEST, LBCK, MON, ASM)
        let (test_mode, loopback, monitoring, restricted) = match config.mode {
            Mode::Normal => (false, false, false, false),
            Mode::Restricted => (false, false, false, true),
            Mode::BusMonitoring => (false, false, true, false),
            Mode::InternalLoopback => (true, true, true, false),
            Mode::ExternalLoopback => (true, true, false, false),
        };
        regs.cccr.modify(|w| {
            let w = cccr::TEST.set(w, test_mode.into());
            let w = cccr::MON.set(w, monitoring.into());
            let w = cccr::ASM.set(w, restricted.into());
            cccr::DAR.set(w, (!config.automatic_retransmission).into())
        });
        // TEST is only writable while CCCR.TEST is set.
        regs.test.set_flag(test_reg::LBCK, loopback);
        debug!("mode {} cccr = {:#x}", config.mode, regs.cccr.read());

        regs.rxgfc.modify(|w| {
            let w = rxgfc::LSS.set(w, config.standard_filters.into());
            rxgfc::LSE.set(w, config.extended_filters.into())
        });

        match config.frame_format {
            FrameFormat::Classic => {
                let timing = &config.nominal_timing;
                regs.nbtp.write(
                    nbtp::NTSEG2.value(u32::from(timing.phase_seg_2) - 1)
                        | nbtp::NTSEG1.value(u32::from(timing.phase_seg_1) - 1)
                        | nbtp::NBRP.value(u32::from(timing.prescaler) - 1)
                        | nbtp::NSJW.value(u32::from(timing.sjw) - 1),
                );
                regs.cccr.clear_bits(cccr::FDOE);
                regs.cccr.clear_bits(cccr::BRSE);
                debug!("nbtp = {:#x}", regs.nbtp.read());
            }
        }

        regs.tscc.write(
            tscc::TSS.value(config.timestamp.select as u32)
                | tscc::TCP.value(u32::from(config.timestamp.prescaler) - 1),
        );

        regs.txbc
            .set_flag(txbc::TFQM, config.tx_queue_mode.into());
        regs.rxgfc.modify(|w| {
            let w = rxgfc::F0OM.set(w, bool::from(config.rx_fifo_0).into());
            rxgfc::F1OM.set(w, bool::from(config.rx_fifo_1).into())
        });
        Ok(())
    }

    /// Locks the configuration and enters normal operation.
    pub fn finalize(mut self) -> Result<Can<'a, D>, ConfigurationError> {
        self.apply_bus_config()?;

        let mut can = self.0;
        // Enter normal operation (CCE is set to 0 automatically)
        can.internals.set_init(false)?;
        debug!("fdcan operational");

        Ok(can)
    }
}

impl<'a, D: Dependencies> Can<'a, D> {
    /// Raw access to the registers.
    ///
    /// # Safety
    /// The abstraction assumes that it has exclusive ownership of the
    /// registers. Direct access can break such assumptions.
    pub unsafe fn registers(&self) -> &RegisterBlock {
        self.internals.regs
    }

    /// Returns to configuration mode. The current configuration is kept and
    /// applied again by [`CanConfigurable::finalize`].
    pub fn configure(mut self) -> Result<CanConfigurable<'a, D>, ConfigurationError> {
        self.internals.set_init(true)?;
        self.internals.enable_cce()?;
        debug!("fdcan configuration mode");
        Ok(CanConfigurable(self))
    }

    /// Configuration in effect
    pub fn config(&self) -> &CanConfig {
        &self.internals.config
    }

    /// Read error counters
    pub fn error_counters(&self) -> ErrorCounters {
        let r = self.internals.regs.ecr.read();
        ErrorCounters {
            transmit: ecr::TEC.get(r) as u8,
            receive: ecr::REC.get(r) as u8,
            receive_error_passive: ecr::RP.get(r) != 0,
            logging: ecr::CEL.get(r) as u8,
        }
    }

    /// Read additional status information
    pub fn protocol_status(&self) -> ProtocolStatus {
        self.internals.regs.psr.read().into()
    }

    /// Get current time
    pub fn timestamp(&self) -> u16 {
        self.internals.regs.tscv.read_field(tscv::TSC) as u16
    }
}

/// Errors of the [`embedded_can`] integration
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Transmission failed
    Tx(TxError),
    /// Reception failed
    Rx(RxError),
}

impl embedded_can::Error for Error {
    fn kind(&self) -> embedded_can::ErrorKind {
        match self {
            Error::Rx(RxError::Truncated { .. }) => embedded_can::ErrorKind::Overrun,
            _ => embedded_can::ErrorKind::Other,
        }
    }
}

impl<D: Dependencies> embedded_can::nb::Can for Can<'_, D> {
    type Frame = Frame;
    type Error = Error;

    /// Queues `frame`. Frames are never replaced, so `Ok(None)` is returned
    /// on success.
    fn transmit(&mut self, frame: &Frame) -> nb::Result<Option<Frame>, Error> {
        use embedded_can::Frame as _;
        let id = match frame.id() {
            Id::Standard(id) => id,
            Id::Extended(_) => return Err(nb::Error::Other(Error::Tx(TxError::UnsupportedId))),
        };
        let header = if frame.is_remote_frame() {
            TxHeader::remote(id, frame.dlc() as u8)
        } else {
            TxHeader::data(id, frame.data().len())
        }
        .map_err(|_| nb::Error::Other(Error::Tx(TxError::InvalidDataLength)))?;

        match self.tx.transmit(&header, frame.data()) {
            Ok(_) => Ok(None),
            Err(TxError::FifoFull) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(Error::Tx(e))),
        }
    }

    /// Takes the oldest frame from FIFO 0, or from FIFO 1 if FIFO 0 is empty.
    fn receive(&mut self) -> nb::Result<Frame, Error> {
        let mut buffer = [0; 8];
        let received = match self.rx_fifo_0.receive(&mut buffer) {
            Err(RxError::FifoEmpty) => self.rx_fifo_1.receive(&mut buffer),
            other => other,
        };
        match received {
            Ok(received) => Ok(Frame::from_received(
                &received.header,
                &buffer[..received.len],
            )),
            Err(RxError::FifoEmpty) => Err(nb::Error::WouldBlock),
            Err(e) => Err(nb::Error::Other(Error::Rx(e))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{BitTiming, RxFifoMode, TimeStampSelect, TxQueueMode};
    use crate::filter::{Action, StandardFilter};
    use crate::reg::{rxfs, txfqs};
    use embedded_can::nb::Can as _;
    use embedded_can::{Frame as _, StandardId};
    use fdcan_h5_core::{fugit::HertzU32, Fdcan1};
    use fugit::RateExtU32;

    struct TestDependencies {
        clock_enabled: bool,
    }

    unsafe impl Dependencies for TestDependencies {
        type Id = Fdcan1;

        fn enable_clock(&mut self) {
            self.clock_enabled = true;
        }

        fn host_clock(&self) -> HertzU32 {
            250.MHz()
        }

        fn can_clock(&self) -> HertzU32 {
            250.MHz()
        }
    }

    const ONE_MBIT: BitTiming = BitTiming::new(25, 7, 2, 1);

    fn configurable<'a>(
        regs: &'a RegisterBlock,
        ram: &'a MessageRam,
        config: CanConfig,
    ) -> CanConfigurable<'a, TestDependencies> {
        let deps = TestDependencies {
            clock_enabled: false,
        };
        // Safety: Registers and RAM are local to the test.
        unsafe { CanConfigurable::from_parts(regs, ram, deps, config, BoundedWait::polls(10)) }
            .unwrap()
    }

    #[test]
    fn construction_enters_configuration_mode() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        ram.filters_standard[5].set(0xDEAD_BEEF);
        regs.ie.write(0xFF);

        let can = configurable(&regs, &ram, CanConfig::new(ONE_MBIT));
        assert!(can.0.internals.dependencies.clock_enabled);
        assert!(regs.cccr.is_set(cccr::INIT));
        assert!(regs.cccr.is_set(cccr::CCE));
        assert_eq!(ram.filters_standard[5].get(), 0);
        assert_eq!(regs.ie.read(), 0);
    }

    #[test]
    fn classic_normal_mode_registers() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        regs.cccr.set_bits(cccr::FDOE);
        let can = configurable(&regs, &ram, CanConfig::new(ONE_MBIT))
            .finalize()
            .unwrap();

        assert_eq!(regs.nbtp.read(), (1 << 0) | (6 << 8) | (24 << 16));
        assert!(!regs.cccr.is_set(cccr::INIT));
        assert!(!regs.cccr.is_set(cccr::FDOE));
        assert!(!regs.cccr.is_set(cccr::TEST));
        assert!(!regs.cccr.is_set(cccr::MON));
        assert!(!regs.cccr.is_set(cccr::DAR));
        assert_eq!(regs.rxgfc.read_field(rxgfc::LSS), 28);
        assert_eq!(regs.rxgfc.read_field(rxgfc::LSE), 8);
        assert_eq!(regs.tscc.read(), 0);
        assert_eq!(
            can.config().nominal_timing.bitrate(250.MHz()),
            HertzU32::MHz(1)
        );
    }

    #[test]
    fn mode_wiring() {
        let cases = [
            (Mode::InternalLoopback, true, true, true, false),
            (Mode::ExternalLoopback, true, true, false, false),
            (Mode::BusMonitoring, false, false, true, false),
            (Mode::Restricted, false, false, false, true),
            (Mode::Normal, false, false, false, false),
        ];
        for (mode, test_mode, loopback, monitoring, restricted) in cases {
            let regs = RegisterBlock::zeroed();
            let ram = MessageRam::zeroed();
            let mut config = CanConfig::new(ONE_MBIT);
            config.mode = mode;
            configurable(&regs, &ram, config).finalize().unwrap();
            assert_eq!(regs.cccr.is_set(cccr::TEST), test_mode, "{:?}", mode);
            assert_eq!(regs.test.is_set(test_reg::LBCK), loopback, "{:?}", mode);
            assert_eq!(regs.cccr.is_set(cccr::MON), monitoring, "{:?}", mode);
            assert_eq!(regs.cccr.is_set(cccr::ASM), restricted, "{:?}", mode);
        }
    }

    #[test]
    fn queue_and_fifo_policies_are_applied() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let mut config = CanConfig::new(ONE_MBIT);
        config.automatic_retransmission = false;
        config.tx_queue_mode = TxQueueMode::Priority;
        config.rx_fifo_0 = RxFifoMode::Overwrite;
        config.timestamp.select = TimeStampSelect::Increment;
        config.timestamp.prescaler = 16;
        config.standard_filters = 4;
        configurable(&regs, &ram, config).finalize().unwrap();

        assert!(regs.cccr.is_set(cccr::DAR));
        assert!(regs.txbc.is_set(txbc::TFQM));
        assert!(regs.rxgfc.is_set(rxgfc::F0OM));
        assert!(!regs.rxgfc.is_set(rxgfc::F1OM));
        assert_eq!(regs.rxgfc.read_field(rxgfc::LSS), 4);
        assert_eq!(regs.tscc.read(), 1 | (15 << 16));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();

        let mut config = CanConfig::new(BitTiming::new(0, 7, 2, 1));
        assert!(matches!(
            configurable(&regs, &ram, config).finalize(),
            Err(ConfigurationError::BitTiming(
                BitTimingError::PrescalerOutOfRange(_)
            ))
        ));

        config.nominal_timing = BitTiming::new(25, 7, 0, 1);
        assert!(matches!(
            configurable(&regs, &ram, config).finalize(),
            Err(ConfigurationError::BitTiming(
                BitTimingError::PhaseSeg2OutOfRange(_)
            ))
        ));

        config.nominal_timing = ONE_MBIT;
        config.timestamp.prescaler = 0;
        assert!(matches!(
            configurable(&regs, &ram, config).finalize(),
            Err(ConfigurationError::InvalidTimeStampPrescaler)
        ));

        config.timestamp.prescaler = 1;
        config.standard_filters = 29;
        assert!(matches!(
            configurable(&regs, &ram, config).finalize(),
            Err(ConfigurationError::TooManyFilters)
        ));
        // Nothing was applied and the controller stays in initialization.
        assert_eq!(regs.nbtp.read(), 0);
        assert!(regs.cccr.is_set(cccr::INIT));
    }

    #[test]
    fn finalize_requires_configuration_mode() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let can = configurable(&regs, &ram, CanConfig::new(ONE_MBIT));
        // The controller left initialization on its own, e.g. after a reset.
        regs.cccr.clear_bits(cccr::CCE);
        assert!(matches!(
            can.finalize(),
            Err(ConfigurationError::NotInConfigurationMode)
        ));
    }

    #[test]
    fn reconfiguration_keeps_config() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let can = configurable(&regs, &ram, CanConfig::new(ONE_MBIT))
            .finalize()
            .unwrap();
        let mut can = can.configure().unwrap();
        assert!(regs.cccr.is_set(cccr::INIT));
        can.config().mode = Mode::BusMonitoring;
        let can = can.finalize().unwrap();
        assert_eq!(can.config().mode, Mode::BusMonitoring);
        assert!(regs.cccr.is_set(cccr::MON));
    }

    #[test]
    fn filter_slots_follow_the_configured_count() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let mut can = configurable(&regs, &ram, CanConfig::new(ONE_MBIT));
        can.config().standard_filters = 1;
        let filter = StandardFilter::disabled();
        assert!(can.filters_standard().program(0, filter).is_ok());
        assert!(can.filters_standard().program(1, filter).is_err());
    }

    #[test]
    fn global_filter_is_written() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let mut can = configurable(&regs, &ram, CanConfig::new(ONE_MBIT));
        can.set_global_filter(&GlobalFilter::reject_non_matching());
        assert_eq!(regs.rxgfc.read() & 0x3F, 0b10_10_1_1);
    }

    #[test]
    fn status_snapshots() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let can = configurable(&regs, &ram, CanConfig::new(ONE_MBIT))
            .finalize()
            .unwrap();

        regs.ecr.write(0x0012_8A05);
        assert_eq!(
            can.error_counters(),
            ErrorCounters {
                transmit: 5,
                receive: 0x0A,
                receive_error_passive: true,
                logging: 0x12,
            }
        );

        regs.psr.write(3 | (1 << 3) | psr::BO.mask());
        let status = can.protocol_status();
        assert_eq!(status.last_error, LastErrorCode::AckError);
        assert_eq!(status.activity, Activity::Idle);
        assert!(status.bus_off);
        assert!(!status.error_passive);

        regs.tscv.write(0x1234);
        assert_eq!(can.timestamp(), 0x1234);
    }

    #[test]
    fn flag_wait_gives_up() {
        let wait = BoundedWait::polls(3);
        assert_eq!(
            await_flag(&Reg::new(0), cccr::INIT, true, &wait),
            Err(ConfigurationError::ConfigurationTimeout)
        );
        assert_eq!(
            await_flag(&Reg::new(cccr::INIT.mask()), cccr::INIT, true, &wait),
            Ok(())
        );
        assert_eq!(
            await_flag(&Reg::new(cccr::INIT.mask()), cccr::CCE, false, &wait),
            Ok(())
        );
    }

    #[test]
    fn loopback_transmit_filtered_out() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let mut config = CanConfig::new(ONE_MBIT);
        config.mode = Mode::InternalLoopback;
        let mut can = configurable(&regs, &ram, config);
        let id = |raw| StandardId::new(raw).unwrap();
        can.filters_standard()
            .program(
                0,
                StandardFilter::classic(Action::StoreFifo0, id(0x125), id(0x7FF)),
            )
            .unwrap();
        let mut can = can.finalize().unwrap();
        assert_eq!(ram.filters_standard[0].get(), 0x8925_07FF);

        // The controller has room and accepts the request.
        regs.txfqs.write(txfqs::TFFL.value(3));
        regs.txbrp.write(1);
        let header = TxHeader::data(id(0x123), 2).unwrap();
        assert_eq!(can.tx.transmit(&header, &[1, 2]), Ok(0));

        // The register image does not run acceptance filtering, so an empty
        // FIFO 0 only shows that transmitting leaves the receive side alone.
        assert_eq!(regs.rxf0s.read_field(rxfs::FFL), 0);
        assert_eq!(
            can.rx_fifo_0.receive(&mut [0; 8]),
            Err(RxError::FifoEmpty)
        );
    }

    #[test]
    fn embedded_can_adapter() {
        let regs = RegisterBlock::zeroed();
        let ram = MessageRam::zeroed();
        let mut can = configurable(&regs, &ram, CanConfig::new(ONE_MBIT))
            .finalize()
            .unwrap();

        let frame = Frame::new(StandardId::new(0x42).unwrap(), &[7, 8, 9]).unwrap();
        assert_eq!(can.transmit(&frame), Err(nb::Error::WouldBlock));

        regs.txfqs.write(txfqs::TFFL.value(1));
        regs.txbrp.write(1);
        assert_eq!(can.transmit(&frame), Ok(None));
        assert_eq!(ram.tx_buffers[0].read_header()[1], 3 << 16);

        let extended = Frame::new(embedded_can::ExtendedId::MAX, &[]).unwrap();
        assert_eq!(
            can.transmit(&extended),
            Err(nb::Error::Other(Error::Tx(TxError::UnsupportedId)))
        );

        assert_eq!(can.receive(), Err(nb::Error::WouldBlock));
        let header = TxHeader::data(StandardId::new(0x42).unwrap(), 3).unwrap();
        ram.rx_fifo_1[0].write_header(header.words());
        ram.rx_fifo_1[0].write_payload(&[7, 8, 9]);
        regs.rxf1s.write(rxfs::FFL.value(1));
        assert_eq!(can.receive(), Ok(frame));
    }
}
