//! Reset and clock control
//!
//! Brings the core up to 250 MHz from the internal 64 MHz oscillator through
//! PLL1 and gates the peripheral clocks.

use fdcan_h5_core::{BoundedWait, Field, PeripheralClocks, PeripheralId, Reg};
use fugit::HertzU32;

/// Frequency of the internal high speed oscillator
pub const HSI: HertzU32 = HertzU32::MHz(64);

/// RCC registers used by this crate
#[repr(C)]
pub struct RegisterBlock {
    /// Clock control
    pub cr: Reg,
    _reserved0: [u32; 6],
    /// Clock configuration 1
    pub cfgr1: Reg,
    /// Clock configuration 2
    pub cfgr2: Reg,
    _reserved1: u32,
    /// PLL1 configuration
    pub pll1cfgr: Reg,
    _reserved2: [u32; 2],
    /// PLL1 dividers
    pub pll1divr: Reg,
    /// PLL1 fractional divider
    pub pll1fracr: Reg,
    _reserved3: [u32; 20],
    /// AHB2 peripheral clock enable
    pub ahb2enr: Reg,
    _reserved4: [u32; 3],
    /// APB1 peripheral clock enable, low word
    pub apb1lenr: Reg,
    /// APB1 peripheral clock enable, high word
    pub apb1henr: Reg,
    _reserved5: [u32; 17],
    /// Kernel clock configuration 5
    pub ccipr5: Reg,
}

/// Power control registers used by this crate
#[repr(C)]
pub struct PwrRegisterBlock {
    _reserved0: [u32; 4],
    /// Voltage scaling control
    pub voscr: Reg,
    /// Voltage scaling status
    pub vossr: Reg,
}

/// Flash interface registers used by this crate
#[repr(C)]
pub struct FlashRegisterBlock {
    /// Access control
    pub acr: Reg,
}

impl RegisterBlock {
    const ADDRESS: usize = 0x4402_0C00;
}

impl PwrRegisterBlock {
    const ADDRESS: usize = 0x4402_0800;
}

impl FlashRegisterBlock {
    const ADDRESS: usize = 0x4002_2000;
}

#[allow(missing_docs)]
pub mod cr {
    use super::Field;
    pub const HSION: Field = Field::bit(0);
    pub const HSIRDY: Field = Field::bit(1);
    pub const HSIDIV: Field = Field::new(3, 2);
    pub const PLL1ON: Field = Field::bit(24);
    pub const PLL1RDY: Field = Field::bit(25);
}

#[allow(missing_docs)]
pub mod cfgr1 {
    use super::Field;
    pub const SW: Field = Field::new(0, 2);
    pub const SWS: Field = Field::new(3, 2);
    /// SW/SWS value of PLL1
    pub const PLL1: u32 = 3;
}

#[allow(missing_docs)]
pub mod cfgr2 {
    use super::Field;
    pub const HPRE: Field = Field::new(0, 4);
    pub const PPRE1: Field = Field::new(4, 3);
    pub const PPRE2: Field = Field::new(8, 3);
    pub const PPRE3: Field = Field::new(12, 3);
}

#[allow(missing_docs)]
pub mod pll1cfgr {
    use super::Field;
    pub const SRC: Field = Field::new(0, 2);
    pub const RGE: Field = Field::new(2, 2);
    pub const FRACEN: Field = Field::bit(4);
    pub const VCOSEL: Field = Field::bit(5);
    pub const M: Field = Field::new(8, 6);
    pub const PEN: Field = Field::bit(16);
    pub const QEN: Field = Field::bit(17);
    pub const REN: Field = Field::bit(18);
    /// SRC value of the HSI
    pub const SRC_HSI: u32 = 1;
}

#[allow(missing_docs)]
pub mod pll1divr {
    use super::Field;
    pub const N: Field = Field::new(0, 9);
    pub const P: Field = Field::new(9, 7);
    pub const Q: Field = Field::new(16, 7);
    pub const R: Field = Field::new(24, 7);
}

#[allow(missing_docs)]
pub mod pll1fracr {
    use super::Field;
    pub const FRACN: Field = Field::new(3, 13);
}

#[allow(missing_docs)]
pub mod ccipr5 {
    use super::Field;
    pub const FDCANSEL: Field = Field::new(8, 2);
    /// FDCANSEL value of PLL1 Q
    pub const PLL1_Q: u32 = 1;
}

#[allow(missing_docs)]
pub mod voscr {
    use super::Field;
    pub const VOS: Field = Field::new(4, 2);
    /// Highest performance range
    pub const VOS0: u32 = 3;
}

#[allow(missing_docs)]
pub mod vossr {
    use super::Field;
    pub const VOSRDY: Field = Field::bit(3);
}

#[allow(missing_docs)]
pub mod acr {
    use super::Field;
    pub const LATENCY: Field = Field::new(0, 4);
    pub const WRHIGHFREQ: Field = Field::new(4, 2);
}

/// PLL1 settings, with the HSI as reference
///
/// `sysclk = HSI / m * (n + fracn / 8192) / p`
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockConfig {
    /// Reference divider, 1..=63
    pub m: u8,
    /// Integer multiplier, 4..=512
    pub n: u16,
    /// Fractional multiplier in 1/8192, below 8192
    pub fracn: u16,
    /// System clock divider, 1..=128
    pub p: u8,
    /// FDCAN kernel clock divider, 1..=128
    pub q: u8,
    /// R output divider, 1..=128; the R output stays disabled
    pub r: u8,
    /// Flash wait states matching the resulting system clock
    pub flash_latency: u8,
    /// Flash signal delay matching the resulting system clock
    pub flash_write_delay: u8,
}

impl Default for ClockConfig {
    /// 64 MHz / 4 * 31.25 / 2 = 250 MHz for both the core and FDCAN
    fn default() -> Self {
        Self {
            m: 4,
            n: 31,
            fracn: 2048,
            p: 2,
            q: 2,
            r: 2,
            flash_latency: 5,
            flash_write_delay: 2,
        }
    }
}

impl ClockConfig {
    fn reference(&self) -> u64 {
        u64::from(HSI.to_Hz()) / u64::from(self.m.max(1))
    }

    fn vco(&self) -> u64 {
        let reference = self.reference();
        reference * u64::from(self.n) + reference * u64::from(self.fracn) / 8192
    }

    fn output(&self, divider: u8) -> HertzU32 {
        HertzU32::from_raw((self.vco() / u64::from(divider.max(1))) as u32)
    }

    /// PLL input frequency range selection
    fn range(&self) -> u32 {
        match self.reference() {
            0..=1_999_999 => 0,
            2_000_000..=3_999_999 => 1,
            4_000_000..=7_999_999 => 2,
            _ => 3,
        }
    }

    fn validate(&self) -> Result<(), ClockError> {
        let dividers_ok = [self.p, self.q, self.r]
            .iter()
            .all(|d| (1..=128).contains(d));
        let reference_ok = (1_000_000..=16_000_000).contains(&self.reference());
        if !(1..=63).contains(&self.m)
            || !(4..=512).contains(&self.n)
            || self.fracn >= 8192
            || !dividers_ok
            || !reference_ok
            || self.flash_latency > 15
            || self.flash_write_delay > 3
        {
            return Err(ClockError::InvalidPllConfig);
        }
        Ok(())
    }
}

/// Frozen clock frequencies
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Clocks {
    /// System clock
    pub sysclk: HertzU32,
    /// AHB clock
    pub hclk: HertzU32,
    /// APB1 clock, also the TIM2 kernel clock
    pub pclk1: HertzU32,
    /// APB2 clock
    pub pclk2: HertzU32,
    /// APB3 clock
    pub pclk3: HertzU32,
    /// FDCAN kernel clock
    pub fdcan: HertzU32,
}

/// Failures of the clock tree bring-up
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// A PLL or flash setting is out of range; nothing was written.
    InvalidPllConfig,
    /// The regulator did not report the requested voltage range
    VoltageScalingTimeout,
    /// The HSI did not become ready
    HsiTimeout,
    /// PLL1 did not lock
    PllLockTimeout,
    /// The system clock switch to PLL1 was not confirmed
    SwitchTimeout,
}

/// Clock control
pub struct Rcc<'a> {
    rcc: &'a RegisterBlock,
    pwr: &'a PwrRegisterBlock,
    flash: &'a FlashRegisterBlock,
}

impl Rcc<'static> {
    /// Takes the RCC, PWR and FLASH registers at their fixed addresses.
    ///
    /// # Safety
    /// Only one instance may exist, and nothing else may access these
    /// registers while it does.
    pub unsafe fn steal() -> Self {
        Self {
            rcc: &*(RegisterBlock::ADDRESS as *const RegisterBlock),
            pwr: &*(PwrRegisterBlock::ADDRESS as *const PwrRegisterBlock),
            flash: &*(FlashRegisterBlock::ADDRESS as *const FlashRegisterBlock),
        }
    }
}

impl<'a> Rcc<'a> {
    /// Clock control on explicitly provided register blocks
    pub fn from_parts(
        rcc: &'a RegisterBlock,
        pwr: &'a PwrRegisterBlock,
        flash: &'a FlashRegisterBlock,
    ) -> Self {
        Self { rcc, pwr, flash }
    }

    /// Switches the system clock to PLL1 fed by the HSI and selects PLL1 Q
    /// as FDCAN kernel clock. All bus prescalers are set to 1.
    pub fn configure_system_clock(
        &mut self,
        config: &ClockConfig,
        wait: BoundedWait,
    ) -> Result<Clocks, ClockError> {
        config.validate()?;
        let rcc = self.rcc;

        self.pwr.voscr.write_field(voscr::VOS, voscr::VOS0);
        wait.until(|| self.pwr.vossr.is_set(vossr::VOSRDY))
            .map_err(|_| ClockError::VoltageScalingTimeout)?;

        // Wait states must cover the new frequency before switching.
        self.flash.acr.write(
            acr::LATENCY.value(config.flash_latency.into())
                | acr::WRHIGHFREQ.value(config.flash_write_delay.into()),
        );

        rcc.pll1cfgr.write(
            pll1cfgr::SRC.value(pll1cfgr::SRC_HSI)
                | pll1cfgr::RGE.value(config.range())
                | pll1cfgr::FRACEN.mask()
                | pll1cfgr::M.value(config.m.into())
                | pll1cfgr::PEN.mask()
                | pll1cfgr::QEN.mask(),
        );
        rcc.pll1fracr
            .write(pll1fracr::FRACN.value(config.fracn.into()));
        rcc.ccipr5.write_field(ccipr5::FDCANSEL, ccipr5::PLL1_Q);
        rcc.pll1divr.write(
            pll1divr::N.value(u32::from(config.n) - 1)
                | pll1divr::P.value(u32::from(config.p) - 1)
                | pll1divr::Q.value(u32::from(config.q) - 1)
                | pll1divr::R.value(u32::from(config.r) - 1),
        );
        debug!(
            "pll1 cfgr {:#x} divr {:#x}",
            rcc.pll1cfgr.read(),
            rcc.pll1divr.read()
        );

        rcc.cr.modify(|w| cr::HSIDIV.set(w | cr::HSION.mask(), 0));
        wait.until(|| rcc.cr.is_set(cr::HSIRDY))
            .map_err(|_| ClockError::HsiTimeout)?;

        rcc.cr.set_bits(cr::PLL1ON);
        wait.until(|| rcc.cr.is_set(cr::PLL1RDY))
            .map_err(|_| ClockError::PllLockTimeout)?;

        rcc.cfgr1.write_field(cfgr1::SW, cfgr1::PLL1);
        wait.until(|| rcc.cfgr1.read_field(cfgr1::SWS) == cfgr1::PLL1)
            .map_err(|_| ClockError::SwitchTimeout)?;

        rcc.cfgr2.modify(|w| {
            let w = cfgr2::HPRE.set(w, 0);
            let w = cfgr2::PPRE1.set(w, 0);
            let w = cfgr2::PPRE2.set(w, 0);
            cfgr2::PPRE3.set(w, 0)
        });

        let sysclk = config.output(config.p);
        let clocks = Clocks {
            sysclk,
            hclk: sysclk,
            pclk1: sysclk,
            pclk2: sysclk,
            pclk3: sysclk,
            fdcan: config.output(config.q),
        };
        debug!(
            "sysclk {} Hz, fdcan {} Hz",
            clocks.sysclk.to_Hz(),
            clocks.fdcan.to_Hz()
        );
        Ok(clocks)
    }
}

impl PeripheralClocks for Rcc<'_> {
    fn enable_peripheral_clock(&self, peripheral: PeripheralId) {
        let (reg, bit) = match peripheral {
            PeripheralId::GpioA => (&self.rcc.ahb2enr, 0),
            PeripheralId::GpioB => (&self.rcc.ahb2enr, 1),
            PeripheralId::GpioC => (&self.rcc.ahb2enr, 2),
            PeripheralId::GpioD => (&self.rcc.ahb2enr, 3),
            PeripheralId::GpioH => (&self.rcc.ahb2enr, 7),
            PeripheralId::Tim2 => (&self.rcc.apb1lenr, 0),
            PeripheralId::I2c2 => (&self.rcc.apb1lenr, 22),
            PeripheralId::Fdcan1 => (&self.rcc.apb1henr, 9),
        };
        reg.set_bits(Field::bit(bit));
        // Read back so the clock is running before the first access.
        let _ = reg.read();
        trace!("clock enabled: {}", peripheral);
    }
}
