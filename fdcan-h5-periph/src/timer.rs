//! Blocking delays on TIM2
//!
//! TIM2 is a 32-bit up-counter. It is prescaled to tick once per microsecond
//! and left free running; delays compare wrapping differences of `CNT`.

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use fdcan_h5_core::{Field, PeripheralClocks, PeripheralId, Reg};
use fugit::HertzU32;

/// TIM2 registers used by this crate
#[repr(C)]
pub struct RegisterBlock {
    /// Control 1
    pub cr1: Reg,
    /// Control 2
    pub cr2: Reg,
    /// Slave mode control
    pub smcr: Reg,
    /// DMA / interrupt enable
    pub dier: Reg,
    /// Status
    pub sr: Reg,
    /// Event generation
    pub egr: Reg,
    /// Capture / compare mode 1
    pub ccmr1: Reg,
    /// Capture / compare mode 2
    pub ccmr2: Reg,
    /// Capture / compare enable
    pub ccer: Reg,
    /// Counter
    pub cnt: Reg,
    /// Prescaler
    pub psc: Reg,
    /// Auto-reload
    pub arr: Reg,
}

impl RegisterBlock {
    const ADDRESS: usize = 0x4000_0000;
}

const CEN: Field = Field::bit(0);
const UIF: Field = Field::bit(0);
const UG: Field = Field::bit(0);

const TICK: HertzU32 = HertzU32::MHz(1);

/// Microsecond delay provider
pub struct Delay<'a> {
    regs: &'a RegisterBlock,
}

impl Delay<'static> {
    /// Takes TIM2 at its fixed address and starts it.
    ///
    /// `pclk1` is the APB1 clock as returned by the clock bring-up.
    ///
    /// # Safety
    /// Only one instance may exist, and nothing else may access TIM2 while it
    /// does.
    pub unsafe fn tim2(clocks: &impl PeripheralClocks, pclk1: HertzU32) -> Self {
        Self::new(
            &*(RegisterBlock::ADDRESS as *const RegisterBlock),
            clocks,
            pclk1,
        )
    }
}

impl<'a> Delay<'a> {
    /// Starts the timer behind `regs` at 1 MHz.
    pub fn new(regs: &'a RegisterBlock, clocks: &impl PeripheralClocks, pclk1: HertzU32) -> Self {
        clocks.enable_peripheral_clock(PeripheralId::Tim2);
        let prescaler = (pclk1.to_Hz() / TICK.to_Hz()).max(1) - 1;
        regs.cr1.clear_bits(CEN);
        regs.psc.write(prescaler);
        regs.arr.write(u32::MAX);
        // Latch the prescaler; the update event also sets UIF.
        regs.egr.write(UG.mask());
        regs.sr.write(!UIF.mask());
        regs.cr1.set_bits(CEN);
        debug!("tim2 prescaler {}", prescaler);
        Self { regs }
    }

    /// Current counter value in microseconds
    pub fn now(&self) -> u32 {
        self.regs.cnt.read()
    }

    /// Stops the timer and gives its registers back.
    pub fn free(self) -> &'a RegisterBlock {
        self.regs.cr1.clear_bits(CEN);
        self.regs
    }
}

impl DelayUs<u32> for Delay<'_> {
    fn delay_us(&mut self, us: u32) {
        let start = self.now();
        while self.now().wrapping_sub(start) < us {
            core::hint::spin_loop();
        }
    }
}

impl DelayUs<u16> for Delay<'_> {
    fn delay_us(&mut self, us: u16) {
        DelayUs::<u32>::delay_us(self, us.into())
    }
}

impl DelayUs<u8> for Delay<'_> {
    fn delay_us(&mut self, us: u8) {
        DelayUs::<u32>::delay_us(self, us.into())
    }
}

impl DelayMs<u32> for Delay<'_> {
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            DelayUs::<u32>::delay_us(self, 1000);
        }
    }
}

impl DelayMs<u16> for Delay<'_> {
    fn delay_ms(&mut self, ms: u16) {
        DelayMs::<u32>::delay_ms(self, ms.into())
    }
}

impl DelayMs<u8> for Delay<'_> {
    fn delay_ms(&mut self, ms: u8) {
        DelayMs::<u32>::delay_ms(self, ms.into())
    }
}
