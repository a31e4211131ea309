//! Celeste: timing core of a GBA emulator.
//!
//! Covers the event scheduler, the hardware timers, the GPIO-attached RTC and a high level
//! implementation of the MP2K sound driver mixer.

pub mod address;
pub mod audio_queue;
pub mod cycles;
pub mod primitive;

pub mod modules;
pub mod system;

#[cfg(test)]
mod test;

pub use address::Address;
pub use cycles::{Cycles, FREQUENCY};
pub use primitive::Primitive;
