//! General purpose I/O
//!
//! [`Pins`] owns the GPIO ports of the STM32H503 and implements [`PinMux`].
//! Output pins for status LEDs are split off as [`OutputPin`] handles.

use core::convert::Infallible;
use embedded_hal::digital::v2;
use fdcan_h5_core::{
    Field, PeripheralClocks, PinConfig, PinError, PinMode, PinMux, Port, Reg,
};

/// Registers of one GPIO port
#[repr(C)]
pub struct RegisterBlock {
    /// Mode, 2 bits per pin
    pub moder: Reg,
    /// Output type, 1 bit per pin
    pub otyper: Reg,
    /// Output speed, 2 bits per pin
    pub ospeedr: Reg,
    /// Pull-up / pull-down, 2 bits per pin
    pub pupdr: Reg,
    /// Input data
    pub idr: Reg,
    /// Output data
    pub odr: Reg,
    /// Bit set (low half) / reset (high half), write only
    pub bsrr: Reg,
    /// Configuration lock
    pub lckr: Reg,
    /// Alternate function low (pins 0..=7) and high (pins 8..=15), 4 bits per
    /// pin
    pub afr: [Reg; 2],
    /// Bit reset, write only
    pub brr: Reg,
}

impl RegisterBlock {
    /// Address of the registers of `port`
    pub const fn address(port: Port) -> usize {
        match port {
            Port::A => 0x4202_0000,
            Port::B => 0x4202_0400,
            Port::C => 0x4202_0800,
            Port::D => 0x4202_0C00,
            Port::H => 0x4202_1C00,
        }
    }

    /// Port register block in ordinary memory, reset to zero
    #[cfg(test)]
    pub(crate) fn zeroed() -> Self {
        // Safety: `Reg` is a `u32` in a volatile cell; zero is a valid value.
        unsafe { core::mem::zeroed() }
    }
}

const fn index(port: Port) -> usize {
    match port {
        Port::A => 0,
        Port::B => 1,
        Port::C => 2,
        Port::D => 3,
        Port::H => 4,
    }
}

/// The GPIO ports
pub struct Pins<'a, C> {
    clocks: C,
    ports: [Option<&'a RegisterBlock>; 5],
}

impl<C: PeripheralClocks> Pins<'static, C> {
    /// Takes all GPIO ports at their fixed addresses.
    ///
    /// # Safety
    /// Only one instance may exist, and nothing else may access the GPIO
    /// registers while it does.
    pub unsafe fn steal(clocks: C) -> Self {
        let port = |p| Some(&*(RegisterBlock::address(p) as *const RegisterBlock));
        Self {
            clocks,
            ports: [port(Port::A), port(Port::B), port(Port::C), port(Port::D), port(Port::H)],
        }
    }
}

impl<'a, C: PeripheralClocks> Pins<'a, C> {
    /// GPIO on explicitly provided register blocks; ports given as `None` are
    /// reported as [`PinError::UnavailablePort`].
    pub fn from_parts(clocks: C, ports: [Option<&'a RegisterBlock>; 5]) -> Self {
        Self { clocks, ports }
    }

    fn port(&self, port: Port) -> Result<&'a RegisterBlock, PinError> {
        self.ports[index(port)].ok_or(PinError::UnavailablePort(port))
    }

    fn pin(&self, port: Port, pin: u8) -> Result<&'a RegisterBlock, PinError> {
        if pin > 15 {
            return Err(PinError::InvalidPin(pin));
        }
        self.port(port)
    }

    /// Drives `pin` high
    pub fn set_high(&self, port: Port, pin: u8) -> Result<(), PinError> {
        self.pin(port, pin)?.bsrr.write(1 << pin);
        Ok(())
    }

    /// Drives `pin` low
    pub fn set_low(&self, port: Port, pin: u8) -> Result<(), PinError> {
        self.pin(port, pin)?.bsrr.write(1 << (pin + 16));
        Ok(())
    }

    /// Inverts the output level of `pin`
    pub fn toggle(&self, port: Port, pin: u8) -> Result<(), PinError> {
        let regs = self.pin(port, pin)?;
        let bit = if regs.odr.read() & (1 << pin) != 0 {
            pin + 16
        } else {
            pin
        };
        regs.bsrr.write(1 << bit);
        Ok(())
    }

    /// Input level of `pin`
    pub fn is_high(&self, port: Port, pin: u8) -> Result<bool, PinError> {
        Ok(self.pin(port, pin)?.idr.read() & (1 << pin) != 0)
    }

    /// Configures `pin` as push-pull output and hands out a handle to it.
    pub fn into_output(&mut self, port: Port, pin: u8) -> Result<OutputPin<'a>, PinError> {
        self.configure_pin(port, pin, PinConfig::output())?;
        Ok(OutputPin {
            regs: self.port(port)?,
            pin,
        })
    }

    /// Returns the clock control handed in at construction.
    pub fn release(self) -> C {
        self.clocks
    }
}

impl<C: PeripheralClocks> PinMux for Pins<'_, C> {
    fn configure_pin(&mut self, port: Port, pin: u8, config: PinConfig) -> Result<(), PinError> {
        let regs = self.pin(port, pin)?;
        if config.alternate > 15 {
            return Err(PinError::InvalidAlternateFunction(config.alternate));
        }
        self.clocks.enable_peripheral_clock(port.into());

        let two_bits = Field::new(pin * 2, 2);
        regs.moder.write_field(two_bits, config.mode as u32);
        regs.pupdr.write_field(two_bits, config.pull as u32);

        if matches!(config.mode, PinMode::Output | PinMode::Alternate) {
            regs.otyper
                .write_field(Field::bit(pin), config.output_type as u32);
            regs.ospeedr.write_field(two_bits, config.speed as u32);
        }
        if config.mode == PinMode::Alternate {
            let afr = &regs.afr[usize::from(pin / 8)];
            afr.write_field(Field::new((pin % 8) * 4, 4), config.alternate.into());
        }
        trace!("{}{} configured: {}", port, pin, config);
        Ok(())
    }
}

/// A single push-pull output, e.g. a status LED
pub struct OutputPin<'a> {
    regs: &'a RegisterBlock,
    pin: u8,
}

impl v2::OutputPin for OutputPin<'_> {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.regs.bsrr.write(1 << (self.pin + 16));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.regs.bsrr.write(1 << self.pin);
        Ok(())
    }
}

impl v2::StatefulOutputPin for OutputPin<'_> {
    fn is_set_high(&self) -> Result<bool, Self::Error> {
        Ok(self.regs.odr.read() & (1 << self.pin) != 0)
    }

    fn is_set_low(&self) -> Result<bool, Self::Error> {
        self.is_set_high().map(|high| !high)
    }
}

impl v2::toggleable::Default for OutputPin<'_> {}

#[cfg(test)]
mod test {
    use super::*;
    use core::cell::RefCell;
    use embedded_hal::digital::v2::{OutputPin as _, ToggleableOutputPin};
    use fdcan_h5_core::{OutputType, PeripheralId, Pull, Speed};

    #[derive(Default)]
    struct Clocks(RefCell<Vec<PeripheralId>>);

    impl PeripheralClocks for Clocks {
        fn enable_peripheral_clock(&self, peripheral: PeripheralId) {
            self.0.borrow_mut().push(peripheral);
        }
    }

    #[test]
    fn can_pins_alternate_function() {
        let port_a = RegisterBlock::zeroed();
        let clocks = Clocks::default();
        let mut pins = Pins::from_parts(&clocks, [Some(&port_a), None, None, None, None]);
        for pin in [11, 12] {
            pins.configure_pin(Port::A, pin, PinConfig::alternate(9))
                .unwrap();
        }
        assert_eq!(port_a.moder.read(), (2 << 22) | (2 << 24));
        assert_eq!(port_a.ospeedr.read(), (3 << 22) | (3 << 24));
        assert_eq!(port_a.otyper.read(), 0);
        assert_eq!(port_a.pupdr.read(), 0);
        assert_eq!(port_a.afr[0].read(), 0);
        assert_eq!(port_a.afr[1].read(), (9 << 12) | (9 << 16));
        assert_eq!(*clocks.0.borrow(), [PeripheralId::GpioA; 2]);
    }

    #[test]
    fn reconfiguration_clears_fields() {
        let port_b = RegisterBlock::zeroed();
        port_b.moder.write(u32::MAX);
        port_b.afr[0].write(u32::MAX);
        let clocks = Clocks::default();
        let mut pins = Pins::from_parts(&clocks, [None, Some(&port_b), None, None, None]);
        let i2c = PinConfig::alternate(8)
            .with_output_type(OutputType::OpenDrain)
            .with_pull(Pull::Up);
        pins.configure_pin(Port::B, 5, i2c).unwrap();

        assert_eq!(port_b.moder.read(), !(1 << 10));
        assert_eq!(port_b.pupdr.read(), 1 << 10);
        assert_eq!(port_b.otyper.read(), 1 << 5);
        assert_eq!(port_b.afr[0].read(), !(0x7 << 20));
    }

    #[test]
    fn input_leaves_output_fields_alone() {
        let port_c = RegisterBlock::zeroed();
        port_c.ospeedr.write(0xAAAA_AAAA);
        let clocks = Clocks::default();
        let mut pins = Pins::from_parts(&clocks, [None, None, Some(&port_c), None, None]);
        let config = PinConfig::input()
            .with_speed(Speed::VeryHigh)
            .with_output_type(OutputType::OpenDrain);
        pins.configure_pin(Port::C, 13, config).unwrap();
        assert_eq!(port_c.moder.read(), 0);
        assert_eq!(port_c.ospeedr.read(), 0xAAAA_AAAA);
        assert_eq!(port_c.otyper.read(), 0);
    }

    #[test]
    fn invalid_requests() {
        let port_a = RegisterBlock::zeroed();
        let clocks = Clocks::default();
        let mut pins = Pins::from_parts(&clocks, [Some(&port_a), None, None, None, None]);
        assert_eq!(
            pins.configure_pin(Port::A, 16, PinConfig::output()),
            Err(PinError::InvalidPin(16))
        );
        assert_eq!(
            pins.configure_pin(Port::A, 1, PinConfig::alternate(16)),
            Err(PinError::InvalidAlternateFunction(16))
        );
        assert_eq!(
            pins.configure_pin(Port::D, 1, PinConfig::output()),
            Err(PinError::UnavailablePort(Port::D))
        );
        assert_eq!(port_a.moder.read(), 0);
        assert!(clocks.0.borrow().is_empty());
    }

    #[test]
    fn output_levels() {
        let port_b = RegisterBlock::zeroed();
        let clocks = Clocks::default();
        let mut pins = Pins::from_parts(&clocks, [None, Some(&port_b), None, None, None]);
        pins.set_high(Port::B, 2).unwrap();
        assert_eq!(port_b.bsrr.read(), 1 << 2);
        pins.set_low(Port::B, 2).unwrap();
        assert_eq!(port_b.bsrr.read(), 1 << 18);

        // BSRR does not reach ODR without hardware; the test sets it.
        port_b.odr.write(1 << 2);
        pins.toggle(Port::B, 2).unwrap();
        assert_eq!(port_b.bsrr.read(), 1 << 18);

        port_b.idr.write(1 << 0);
        assert_eq!(pins.is_high(Port::B, 0), Ok(true));
        assert_eq!(pins.is_high(Port::B, 1), Ok(false));
    }

    #[test]
    fn led_handle() {
        let port_c = RegisterBlock::zeroed();
        let clocks = Clocks::default();
        let mut pins = Pins::from_parts(&clocks, [None, None, Some(&port_c), None, None]);
        let mut led = pins.into_output(Port::C, 13).unwrap();
        assert_eq!(port_c.moder.read(), 1 << 26);

        led.set_high().unwrap();
        assert_eq!(port_c.bsrr.read(), 1 << 13);
        led.toggle().unwrap();
        assert_eq!(port_c.bsrr.read(), 1 << 13);
        port_c.odr.write(1 << 13);
        led.toggle().unwrap();
        assert_eq!(port_c.bsrr.read(), 1 << 29);
    }
}
