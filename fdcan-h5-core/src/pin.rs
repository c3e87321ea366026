//! Pin multiplexing vocabulary shared between the drivers and the GPIO layer

/// GPIO port
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    /// GPIOA
    A,
    /// GPIOB
    B,
    /// GPIOC
    C,
    /// GPIOD
    D,
    /// GPIOH
    H,
}

/// Pin function, `MODER` encoding
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// Digital input
    Input = 0,
    /// General purpose output
    Output = 1,
    /// Routed to a peripheral through the alternate function multiplexer
    Alternate = 2,
    /// Analog (reset state)
    Analog = 3,
}

/// Output driver, `OTYPER` encoding
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OutputType {
    /// Push-pull
    #[default]
    PushPull = 0,
    /// Open-drain
    OpenDrain = 1,
}

/// Output slew rate, `OSPEEDR` encoding
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    /// Low speed
    #[default]
    Low = 0,
    /// Medium speed
    Medium = 1,
    /// High speed
    High = 2,
    /// Very high speed
    VeryHigh = 3,
}

/// Internal resistor, `PUPDR` encoding
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Pull {
    /// Floating
    #[default]
    None = 0,
    /// Pull-up
    Up = 1,
    /// Pull-down
    Down = 2,
}

/// Complete electrical and functional setup of a pin
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinConfig {
    /// Pin function
    pub mode: PinMode,
    /// Only applied in output and alternate modes
    pub output_type: OutputType,
    /// Only applied in output and alternate modes
    pub speed: Speed,
    /// Internal pull resistor
    pub pull: Pull,
    /// Alternate function number (`AF0`..=`AF15`), only applied in alternate
    /// mode
    pub alternate: u8,
}

impl PinConfig {
    /// Push-pull output, low speed, no pull
    pub const fn output() -> Self {
        Self {
            mode: PinMode::Output,
            output_type: OutputType::PushPull,
            speed: Speed::Low,
            pull: Pull::None,
            alternate: 0,
        }
    }

    /// Floating input
    pub const fn input() -> Self {
        Self {
            mode: PinMode::Input,
            ..Self::output()
        }
    }

    /// Alternate function `af`, push-pull, very high speed, no pull
    pub const fn alternate(af: u8) -> Self {
        Self {
            mode: PinMode::Alternate,
            output_type: OutputType::PushPull,
            speed: Speed::VeryHigh,
            pull: Pull::None,
            alternate: af,
        }
    }

    /// Same configuration with a different output driver
    pub const fn with_output_type(self, output_type: OutputType) -> Self {
        Self {
            output_type,
            ..self
        }
    }

    /// Same configuration with a different pull resistor
    pub const fn with_pull(self, pull: Pull) -> Self {
        Self { pull, ..self }
    }

    /// Same configuration with a different slew rate
    pub const fn with_speed(self, speed: Speed) -> Self {
        Self { speed, ..self }
    }
}

/// Invalid pin number or alternate function
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    /// Pins are numbered 0..=15
    InvalidPin(u8),
    /// Alternate functions are numbered 0..=15
    InvalidAlternateFunction(u8),
    /// The port is not available on this package
    UnavailablePort(Port),
}

/// Applies pin configurations
pub trait PinMux {
    /// Configures pin `pin` of `port`
    ///
    /// Mode, pull and alternate function fields are cleared before the new
    /// values are written; neighbouring pins are left untouched.
    fn configure_pin(&mut self, port: Port, pin: u8, config: PinConfig) -> Result<(), PinError>;
}
