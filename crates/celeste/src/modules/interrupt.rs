//! Interrupt controller module interface.

/// An interrupt source. The discriminant is the bit of the source in the IE/IF registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Interrupt {
    VBlank = 0,
    HBlank = 1,
    VCount = 2,
    Timer0 = 3,
    Timer1 = 4,
    Timer2 = 5,
    Timer3 = 6,
    Serial = 7,
    Dma0 = 8,
    Dma1 = 9,
    Dma2 = 10,
    Dma3 = 11,
    Keypad = 12,
    GamePak = 13,
}

impl Interrupt {
    /// The overflow interrupt of the given timer channel.
    pub fn timer(id: usize) -> Self {
        match id {
            0 => Self::Timer0,
            1 => Self::Timer1,
            2 => Self::Timer2,
            _ => Self::Timer3,
        }
    }
}

/// Trait for interrupt controller modules.
pub trait InterruptModule {
    /// Requests an interrupt. Masking and dispatch are up to the module.
    fn raise(&mut self, interrupt: Interrupt);
}

/// An implementation of [`InterruptModule`] which drops every request.
#[derive(Debug, Clone, Copy)]
pub struct NopInterruptModule;

impl InterruptModule for NopInterruptModule {
    fn raise(&mut self, interrupt: Interrupt) {
        tracing::trace!(%interrupt, "dropping interrupt request");
    }
}
