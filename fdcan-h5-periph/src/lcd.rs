//! HD44780 character display behind a PCF8574 I2C backpack
//!
//! The backpack maps its eight outputs to the display as follows:
//!
//! | Bit | Signal |
//! |-----|--------|
//! | 7-4 | D7-D4 |
//! | 3 | Backlight |
//! | 2 | Enable |
//! | 1 | Read/Write |
//! | 0 | Register select |
//!
//! The display runs in 4-bit mode, so every byte is clocked in as two
//! nibbles, each with an enable pulse of two I2C writes.

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::blocking::i2c::Write;

const BACKLIGHT: u8 = 0x08;
const ENABLE: u8 = 0x04;
const REGISTER_SELECT: u8 = 0x01;

const CLEAR: u8 = 0x01;
const HOME: u8 = 0x02;
const ENTRY_MODE_INCREMENT: u8 = 0x06;
const DISPLAY_ON_CURSOR_OFF: u8 = 0x0C;
const FUNCTION_SET_4BIT_2LINE: u8 = 0x28;
const SET_DDRAM_ROW_1: u8 = 0x80;
const SET_DDRAM_ROW_2: u8 = 0xC0;

/// Characters per row in display memory
pub const ROW_LENGTH: u8 = 40;

/// Display errors
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// The I2C transfer failed
    I2c(E),
    /// Row or column outside the display memory
    InvalidPosition,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Self::I2c(e)
    }
}

/// Two-line character display
pub struct Lcd<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C, D, E> Lcd<I2C, D>
where
    I2C: Write<Error = E>,
    D: DelayUs<u32> + DelayMs<u32>,
{
    /// 7-bit bus address of a PCF8574 backpack with all address pins high
    pub const DEFAULT_ADDRESS: u8 = 0x27;

    /// Display at `address`; call [`Lcd::init`] before anything else.
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
        }
    }

    /// Gives back the bus and the delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn expander(&mut self, byte: u8) -> Result<(), E> {
        self.i2c.write(self.address, &[byte])
    }

    fn write_nibble(&mut self, nibble: u8, flags: u8) -> Result<(), E> {
        let data = (nibble << 4) | BACKLIGHT | flags;
        self.expander(data | ENABLE)?;
        self.delay.delay_us(50);
        self.expander(data & !ENABLE)?;
        self.delay.delay_us(50);
        Ok(())
    }

    fn write_byte(&mut self, byte: u8, flags: u8) -> Result<(), E> {
        self.write_nibble(byte >> 4, flags)?;
        self.write_nibble(byte & 0xF, flags)
    }

    fn command(&mut self, command: u8) -> Result<(), E> {
        self.write_byte(command, 0)?;
        if matches!(command, CLEAR | HOME) {
            self.delay.delay_ms(10);
        } else {
            self.delay.delay_us(100);
        }
        Ok(())
    }

    /// Power-on initialization into 4-bit, two-line mode with the display on,
    /// cursor off, cleared, and left-to-right entry.
    pub fn init(&mut self) -> Result<(), Error<E>> {
        // Leaves the backpack outputs in a known state.
        self.expander(0x00)?;
        self.delay.delay_ms(50);

        // 8-bit mode, three times, then the switch to 4-bit mode
        self.write_nibble(0x3, 0)?;
        self.delay.delay_ms(5);
        self.write_nibble(0x3, 0)?;
        self.delay.delay_us(150);
        self.write_nibble(0x3, 0)?;
        self.write_nibble(0x2, 0)?;

        self.command(FUNCTION_SET_4BIT_2LINE)?;
        self.command(DISPLAY_ON_CURSOR_OFF)?;
        self.clear()?;
        self.command(ENTRY_MODE_INCREMENT)?;
        debug!("lcd at {:#x} initialized", self.address);
        Ok(())
    }

    /// Clears the display and moves the cursor home.
    pub fn clear(&mut self) -> Result<(), Error<E>> {
        Ok(self.command(CLEAR)?)
    }

    /// Moves the cursor to the first character of row 1.
    pub fn home(&mut self) -> Result<(), Error<E>> {
        Ok(self.command(HOME)?)
    }

    /// Moves the cursor to `column` of `row`, both counted from 1.
    pub fn set_cursor(&mut self, row: u8, column: u8) -> Result<(), Error<E>> {
        if !(1..=ROW_LENGTH).contains(&column) {
            return Err(Error::InvalidPosition);
        }
        let base = match row {
            1 => SET_DDRAM_ROW_1,
            2 => SET_DDRAM_ROW_2,
            _ => return Err(Error::InvalidPosition),
        };
        Ok(self.command(base | (column - 1))?)
    }

    /// Writes one character code at the cursor.
    pub fn write_char(&mut self, c: u8) -> Result<(), Error<E>> {
        Ok(self.write_byte(c, REGISTER_SELECT)?)
    }

    /// Writes the bytes of `s` at the cursor. Nothing is sent for an empty
    /// string.
    pub fn write_str(&mut self, s: &str) -> Result<(), Error<E>> {
        s.bytes().try_for_each(|c| self.write_char(c))
    }
}

impl<I2C, D, E> core::fmt::Write for Lcd<I2C, D>
where
    I2C: Write<Error = E>,
    D: DelayUs<u32> + DelayMs<u32>,
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        Lcd::write_str(self, s).map_err(|_| core::fmt::Error)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Default)]
    struct Bus {
        writes: Vec<(u8, Vec<u8>)>,
        fail: bool,
    }

    impl Write for Bus {
        type Error = ();

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            self.writes.push((address, bytes.to_vec()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Clock {
        us: u64,
    }

    impl DelayUs<u32> for Clock {
        fn delay_us(&mut self, us: u32) {
            self.us += u64::from(us);
        }
    }

    impl DelayMs<u32> for Clock {
        fn delay_ms(&mut self, ms: u32) {
            self.us += u64::from(ms) * 1000;
        }
    }

    fn lcd() -> Lcd<Bus, Clock> {
        Lcd::new(Bus::default(), Clock::default(), Lcd::<Bus, Clock>::DEFAULT_ADDRESS)
    }

    fn bytes(lcd: Lcd<Bus, Clock>) -> Vec<u8> {
        let (bus, _) = lcd.release();
        bus.writes
            .into_iter()
            .map(|(address, bytes)| {
                assert_eq!(address, 0x27);
                assert_eq!(bytes.len(), 1);
                bytes[0]
            })
            .collect()
    }

    #[test]
    fn init_sequence() {
        let mut lcd = lcd();
        lcd.init().unwrap();
        assert_eq!(
            bytes(lcd),
            [
                0x00, //
                0x3C, 0x38, 0x3C, 0x38, 0x3C, 0x38, 0x2C, 0x28, //
                0x2C, 0x28, 0x8C, 0x88, // function set
                0x0C, 0x08, 0xCC, 0xC8, // display on
                0x0C, 0x08, 0x1C, 0x18, // clear
                0x0C, 0x08, 0x6C, 0x68, // entry mode
            ]
        );
    }

    #[test]
    fn init_waits_for_the_controller() {
        let mut lcd = lcd();
        lcd.init().unwrap();
        let (_, clock) = lcd.release();
        // 50 ms + 5 ms + 150 us + 10 ms for clear, 3 x 100 us for the other
        // commands, 50 us after each of the 24 enable edges
        assert_eq!(clock.us, 50_000 + 5_000 + 150 + 10_000 + 300 + 24 * 50);
    }

    #[test]
    fn characters_set_register_select() {
        let mut lcd = lcd();
        lcd.write_str("A").unwrap();
        assert_eq!(bytes(lcd), [0x4D, 0x49, 0x1D, 0x19]);
    }

    #[test]
    fn empty_string_sends_nothing() {
        let mut lcd = lcd();
        lcd.write_str("").unwrap();
        assert!(bytes(lcd).is_empty());
    }

    #[test]
    fn formatted_output() {
        use core::fmt::Write as _;
        let mut lcd = lcd();
        write!(lcd, "{}", 7).unwrap();
        assert_eq!(bytes(lcd), [0x3D, 0x39, 0x7D, 0x79]);
    }

    #[test]
    fn cursor_positions() {
        let mut lcd = lcd();
        lcd.set_cursor(1, 5).unwrap();
        lcd.set_cursor(2, 3).unwrap();
        assert_eq!(lcd.set_cursor(3, 1), Err(Error::InvalidPosition));
        assert_eq!(lcd.set_cursor(1, 0), Err(Error::InvalidPosition));
        assert_eq!(lcd.set_cursor(2, 41), Err(Error::InvalidPosition));
        // 0x84, then 0xC2
        assert_eq!(
            bytes(lcd),
            [0x8C, 0x88, 0x4C, 0x48, 0xCC, 0xC8, 0x2C, 0x28]
        );
    }

    #[test]
    fn bus_errors_propagate() {
        let mut lcd = Lcd::new(
            Bus {
                fail: true,
                ..Bus::default()
            },
            Clock::default(),
            0x27,
        );
        assert_eq!(lcd.init(), Err(Error::I2c(())));
        assert_eq!(lcd.home(), Err(Error::I2c(())));
    }
}
