//! I2C2 controller, blocking writes
//!
//! Transfers are single transactions of at most 255 bytes with automatic STOP
//! generation. Every flag poll is bounded; a device that never answers
//! surfaces as [`I2cError::Timeout`].

use embedded_hal::blocking::i2c::Write;
use fdcan_h5_core::{BoundedWait, Field, PeripheralClocks, PeripheralId, Reg};

/// I2C registers
#[repr(C)]
pub struct RegisterBlock {
    /// Control 1
    pub cr1: Reg,
    /// Control 2
    pub cr2: Reg,
    /// Own address 1
    pub oar1: Reg,
    /// Own address 2
    pub oar2: Reg,
    /// Timing
    pub timingr: Reg,
    /// Timeout
    pub timeoutr: Reg,
    /// Interrupt and status
    pub isr: Reg,
    /// Interrupt clear, write 1 to clear
    pub icr: Reg,
    /// Packet error checking
    pub pecr: Reg,
    /// Receive data
    pub rxdr: Reg,
    /// Transmit data
    pub txdr: Reg,
}

impl RegisterBlock {
    const I2C2: usize = 0x4000_5800;
}

#[allow(missing_docs)]
pub mod cr1 {
    use super::Field;
    pub const PE: Field = Field::bit(0);
    pub const DNF: Field = Field::new(8, 4);
    pub const ANFOFF: Field = Field::bit(12);
}

#[allow(missing_docs)]
pub mod cr2 {
    use super::Field;
    /// 7-bit address position inside SADD
    pub const SADD7: Field = Field::new(1, 7);
    pub const RD_WRN: Field = Field::bit(10);
    pub const ADD10: Field = Field::bit(11);
    pub const START: Field = Field::bit(13);
    pub const STOP: Field = Field::bit(14);
    pub const NBYTES: Field = Field::new(16, 8);
    pub const AUTOEND: Field = Field::bit(25);
}

#[allow(missing_docs)]
pub mod timingr {
    use super::Field;
    pub const SCLL: Field = Field::new(0, 8);
    pub const SCLH: Field = Field::new(8, 8);
    pub const SDADEL: Field = Field::new(16, 4);
    pub const SCLDEL: Field = Field::new(20, 4);
    pub const PRESC: Field = Field::new(28, 4);
}

#[allow(missing_docs)]
pub mod isr {
    use super::Field;
    pub const TXE: Field = Field::bit(0);
    pub const TXIS: Field = Field::bit(1);
    pub const NACKF: Field = Field::bit(4);
    pub const STOPF: Field = Field::bit(5);
    pub const TC: Field = Field::bit(6);
    pub const BUSY: Field = Field::bit(15);
}

#[allow(missing_docs)]
pub mod icr {
    use super::Field;
    pub const NACKCF: Field = Field::bit(4);
    pub const STOPCF: Field = Field::bit(5);
}

/// Bus timing, written to `TIMINGR` as is
///
/// The default gives roughly 100 kHz from a 250 MHz kernel clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cTiming {
    /// Timing prescaler, 0..=15
    pub presc: u8,
    /// SCL low period
    pub scll: u8,
    /// SCL high period
    pub sclh: u8,
    /// Data hold time, 0..=15
    pub sdadel: u8,
    /// Data setup time, 0..=15
    pub scldel: u8,
}

impl Default for I2cTiming {
    fn default() -> Self {
        Self {
            presc: 2,
            scll: 107,
            sclh: 99,
            sdadel: 9,
            scldel: 9,
        }
    }
}

impl I2cTiming {
    fn word(&self) -> u32 {
        timingr::PRESC.value(self.presc.into())
            | timingr::SCLDEL.value(self.scldel.into())
            | timingr::SDADEL.value(self.sdadel.into())
            | timingr::SCLH.value(self.sclh.into())
            | timingr::SCLL.value(self.scll.into())
    }

    fn is_valid(&self) -> bool {
        self.presc <= 15 && self.sdadel <= 15 && self.scldel <= 15
    }
}

/// I2C transfer failures
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum I2cError {
    /// The target did not acknowledge its address or a data byte
    Nack,
    /// The bus stayed busy or a flag never came up
    Timeout,
    /// More than 255 bytes in one transaction
    TooLong,
    /// A timing field is out of range; the controller was left disabled
    InvalidTiming,
}

/// I2C controller in controller-transmitter mode
pub struct I2c<'a> {
    regs: &'a RegisterBlock,
    wait: BoundedWait,
}

impl I2c<'static> {
    /// Takes I2C2 at its fixed address and enables it.
    ///
    /// SCL and SDA have to be routed to I2C2 (AF8, open-drain, pull-up)
    /// beforehand.
    ///
    /// # Safety
    /// Only one instance may exist, and nothing else may access I2C2 while it
    /// does.
    pub unsafe fn i2c2(
        clocks: &impl PeripheralClocks,
        timing: I2cTiming,
        wait: BoundedWait,
    ) -> Result<Self, I2cError> {
        Self::new(
            &*(RegisterBlock::I2C2 as *const RegisterBlock),
            clocks,
            timing,
            wait,
        )
    }
}

impl<'a> I2c<'a> {
    /// Sets up the controller behind `regs`: analog and digital noise
    /// filters off, `timing` applied, peripheral enabled.
    pub fn new(
        regs: &'a RegisterBlock,
        clocks: &impl PeripheralClocks,
        timing: I2cTiming,
        wait: BoundedWait,
    ) -> Result<Self, I2cError> {
        if !timing.is_valid() {
            return Err(I2cError::InvalidTiming);
        }
        clocks.enable_peripheral_clock(PeripheralId::I2c2);
        regs.cr1.clear_bits(cr1::PE);
        regs.cr1
            .modify(|w| cr1::DNF.set(w, 0) | cr1::ANFOFF.mask());
        regs.timingr.write(timing.word());
        regs.cr1.set_bits(cr1::PE);
        debug!("i2c timing {:#x}", regs.timingr.read());
        Ok(Self { regs, wait })
    }

    /// Disables the controller and gives its registers back.
    pub fn free(self) -> &'a RegisterBlock {
        self.regs.cr1.clear_bits(cr1::PE);
        self.regs
    }

    fn wait_for(&self, field: Field) -> Result<(), I2cError> {
        self.wait
            .until(|| self.regs.isr.is_set(field))
            .map_err(|_| I2cError::Timeout)
    }

    fn acknowledge_stop(&self) {
        self.regs
            .icr
            .write(icr::STOPCF.mask() | icr::NACKCF.mask());
    }

    /// Waits for the automatic STOP after a NACK and clears both flags.
    fn abort(&self) -> I2cError {
        trace!("i2c nack");
        // A missing STOP is reported as the NACK that caused it.
        let _ = self.wait_for(isr::STOPF);
        self.acknowledge_stop();
        I2cError::Nack
    }
}

impl Write for I2c<'_> {
    type Error = I2cError;

    /// Writes `bytes` to the 7-bit `address` in one transaction.
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        let nbytes = u8::try_from(bytes.len()).map_err(|_| I2cError::TooLong)?;
        let regs = self.regs;

        self.wait
            .until(|| !regs.isr.is_set(isr::BUSY))
            .map_err(|_| I2cError::Timeout)?;

        regs.cr2.write(
            cr2::SADD7.value(address.into())
                | cr2::NBYTES.value(nbytes.into())
                | cr2::AUTOEND.mask()
                | cr2::START.mask(),
        );

        for &byte in bytes {
            self.wait
                .until(|| regs.isr.read() & (isr::TXIS.mask() | isr::NACKF.mask()) != 0)
                .map_err(|_| I2cError::Timeout)?;
            if regs.isr.is_set(isr::NACKF) {
                return Err(self.abort());
            }
            regs.txdr.write(byte.into());
        }

        self.wait
            .until(|| regs.isr.read() & (isr::STOPF.mask() | isr::NACKF.mask()) != 0)
            .map_err(|_| I2cError::Timeout)?;
        if regs.isr.is_set(isr::NACKF) {
            return Err(self.abort());
        }
        self.acknowledge_stop();
        Ok(())
    }
}
