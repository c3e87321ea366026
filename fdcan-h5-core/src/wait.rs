//! Bounded polling of hardware status flags

/// A status flag did not reach the expected state within the poll budget
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimedOut;

/// Upper bound on the number of times a status flag is polled
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BoundedWait {
    max_polls: u32,
}

impl BoundedWait {
    /// Roughly a few milliseconds at full core speed
    pub const DEFAULT_POLLS: u32 = 1_000_000;

    /// Gives up after `max_polls` unsuccessful polls
    ///
    /// A budget of 0 still polls once.
    pub const fn polls(max_polls: u32) -> Self {
        Self { max_polls }
    }

    /// Maximum number of polls
    pub const fn max_polls(&self) -> u32 {
        self.max_polls
    }

    /// Polls `ready` until it returns `true` or the budget runs out
    pub fn until(&self, mut ready: impl FnMut() -> bool) -> Result<(), TimedOut> {
        let mut remaining = self.max_polls;
        loop {
            if ready() {
                return Ok(());
            }
            if remaining == 0 {
                return Err(TimedOut);
            }
            remaining -= 1;
            core::hint::spin_loop();
        }
    }
}

impl Default for BoundedWait {
    fn default() -> Self {
        Self::polls(Self::DEFAULT_POLLS)
    }
}
