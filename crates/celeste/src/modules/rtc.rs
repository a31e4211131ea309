//! RTC command module interface.

use bitos::integer::u3;

/// Trait for modules that give meaning to the commands of the RTC.
///
/// The serial protocol itself lives in [`gpio::rtc`](crate::system::gpio::rtc). Modules only
/// see complete write transfers.
pub trait RtcModule {
    /// Called once a write command has received its whole payload.
    fn write(&mut self, command: u3, data: &[u8; 8]);
}

/// An implementation of [`RtcModule`] which ignores every command.
#[derive(Debug, Clone, Copy)]
pub struct NopRtcModule;

impl RtcModule for NopRtcModule {
    fn write(&mut self, command: u3, data: &[u8; 8]) {
        tracing::debug!(command = command.value(), ?data, "ignoring rtc write");
    }
}
