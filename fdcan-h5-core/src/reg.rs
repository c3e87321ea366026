//! Typed access to 32-bit memory-mapped registers
//!
//! Register blocks in the dependent crates are `#[repr(C)]` structs of [`Reg`]
//! with explicit padding, laid out to match the reference manual. Bit fields
//! are described by [`Field`] values so that every read-modify-write clears
//! the field before the new value is OR-ed in.

use vcell::VolatileCell;

/// A contiguous bit field inside a 32-bit register
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Field {
    offset: u8,
    width: u8,
}

impl Field {
    /// Field of `width` bits starting at bit `offset`
    ///
    /// Fields reaching past bit 31 are rejected at compile time when used in a
    /// `const` context.
    pub const fn new(offset: u8, width: u8) -> Self {
        assert!(width >= 1 && offset as u32 + width as u32 <= 32);
        Self { offset, width }
    }

    /// Single-bit field
    pub const fn bit(offset: u8) -> Self {
        Self::new(offset, 1)
    }

    /// Position of the least significant bit
    pub const fn offset(self) -> u8 {
        self.offset
    }

    /// Width in bits
    pub const fn width(self) -> u8 {
        self.width
    }

    /// Largest value the field can hold
    pub const fn max(self) -> u32 {
        if self.width == 32 {
            u32::MAX
        } else {
            (1 << self.width) - 1
        }
    }

    /// Mask of the field in its register position
    pub const fn mask(self) -> u32 {
        self.max() << self.offset
    }

    /// Extracts the field value from a whole register `word`
    pub const fn get(self, word: u32) -> u32 {
        (word >> self.offset) & self.max()
    }

    /// Returns `word` with the field replaced by `value`
    ///
    /// `value` is truncated to the field width so it never spills into the
    /// neighbouring fields.
    pub const fn set(self, word: u32, value: u32) -> u32 {
        (word & !self.mask()) | ((value & self.max()) << self.offset)
    }

    /// `value` placed in the field position, all other bits zero
    pub const fn value(self, value: u32) -> u32 {
        self.set(0, value)
    }
}

/// A single 32-bit memory-mapped register
#[repr(transparent)]
pub struct Reg(VolatileCell<u32>);

impl Reg {
    /// Register holding `value`
    ///
    /// Only useful for register images that live in ordinary memory, e.g.
    /// host-side tests.
    pub const fn new(value: u32) -> Self {
        Self(VolatileCell::new(value))
    }

    /// Volatile read of the whole register
    #[inline]
    pub fn read(&self) -> u32 {
        self.0.get()
    }

    /// Volatile write of the whole register
    ///
    /// This is the only correct way to access write-1-to-clear and set-only
    /// registers.
    #[inline]
    pub fn write(&self, value: u32) {
        self.0.set(value)
    }

    /// Read-modify-write of the whole register
    #[inline]
    pub fn modify(&self, f: impl FnOnce(u32) -> u32) {
        self.write(f(self.read()))
    }

    /// Reads a single field
    #[inline]
    pub fn read_field(&self, field: Field) -> u32 {
        field.get(self.read())
    }

    /// Clears `field` and writes `value` into it, leaving other bits intact
    #[inline]
    pub fn write_field(&self, field: Field, value: u32) {
        self.modify(|w| field.set(w, value))
    }

    /// `true` if any bit of `field` is set
    #[inline]
    pub fn is_set(&self, field: Field) -> bool {
        self.read() & field.mask() != 0
    }

    /// Sets every bit of `field`
    #[inline]
    pub fn set_bits(&self, field: Field) {
        self.modify(|w| w | field.mask())
    }

    /// Clears every bit of `field`
    #[inline]
    pub fn clear_bits(&self, field: Field) {
        self.modify(|w| w & !field.mask())
    }

    /// Sets or clears a single-bit `field`
    #[inline]
    pub fn set_flag(&self, field: Field, on: bool) {
        if on {
            self.set_bits(field)
        } else {
            self.clear_bits(field)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const LOW: Field = Field::new(0, 4);
    const MID: Field = Field::new(4, 4);

    #[test]
    fn field_masks() {
        assert_eq!(LOW.mask(), 0x0000_000F);
        assert_eq!(MID.mask(), 0x0000_00F0);
        assert_eq!(Field::new(0, 32).mask(), u32::MAX);
        assert_eq!(Field::bit(31).mask(), 0x8000_0000);
    }

    #[test]
    fn write_field_clears_stale_bits() {
        let reg = Reg::new(0xFFFF_FFFF);
        reg.write_field(MID, 0x5);
        assert_eq!(reg.read(), 0xFFFF_FF5F);
        assert_eq!(reg.read_field(MID), 0x5);
    }

    #[test]
    fn write_field_does_not_spill() {
        let reg = Reg::new(0);
        reg.write_field(LOW, 0x1F);
        assert_eq!(reg.read(), 0x0000_000F);
        assert_eq!(reg.read_field(MID), 0);
    }

    #[test]
    fn flags() {
        let reg = Reg::new(0);
        reg.set_flag(Field::bit(7), true);
        assert!(reg.is_set(Field::bit(7)));
        reg.set_flag(Field::bit(7), false);
        assert_eq!(reg.read(), 0);
    }
}
