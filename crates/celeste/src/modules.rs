//! Interfaces to the collaborators of the system.
//!
//! Each module is a trait object stored in [`Modules`](crate::system::Modules), with a `Nop`
//! implementation for when the collaborator is not needed.

pub mod backup;
pub mod interrupt;
pub mod memory;
pub mod rtc;
