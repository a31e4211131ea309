/// Frequency of the system clock, in Hz.
pub const FREQUENCY: u64 = 1 << 24;

/// An amount of system clock cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cycles(pub u64);

impl Cycles {
    /// Returns the amount of cycles. Equivalent to `self.0`.
    #[inline(always)]
    pub const fn value(self) -> u64 {
        self.0
    }
}
