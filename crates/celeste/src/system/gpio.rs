//! Cartridge GPIO port.
//!
//! Three 16-bit registers mapped over the ROM at [`BASE`]: data, direction and control. Only
//! the lower 4 bits of data and direction exist. While the control register does not enable
//! reading, reads see the ROM instead.
pub mod rtc;

use bitos::bitos;

use crate::system::System;
use crate::system::gpio::rtc::Rtc;

/// Address of the data register.
pub const BASE: u32 = 0x0800_00C4;
/// Length of the register block, in bytes.
pub const LEN: u32 = 6;

const DATA: u32 = 0;
const DIRECTION: u32 = 2;
const CONTROL: u32 = 4;

/// Levels of the port pins. In the direction register, a set bit means output.
#[bitos(16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pins {
    #[bits(0)]
    pub sck: bool,
    #[bits(1)]
    pub sio: bool,
    #[bits(2)]
    pub cs: bool,
    #[bits(3)]
    pub aux: bool,
}

#[bitos(16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Control {
    #[bits(0)]
    pub read_enable: bool,
}

#[derive(Debug, Default)]
pub struct Interface {
    pub data: Pins,
    pub direction: Pins,
    pub control: Control,
    /// Device attached to the port.
    pub rtc: Option<Rtc>,
}

impl Interface {
    pub fn new(rtc: bool) -> Self {
        Self {
            rtc: rtc.then(Rtc::default),
            ..Default::default()
        }
    }

    /// Whether reads of the register block see the port instead of the ROM.
    pub fn readable(&self) -> bool {
        self.control.read_enable()
    }

    /// Current levels of the data register: outputs as last written, inputs as driven by the
    /// device.
    fn levels(&self) -> Pins {
        let device = self.rtc.as_ref().map_or(0, |rtc| rtc.read_port().to_bits());
        let outputs = self.data.to_bits() & self.direction.to_bits();
        let inputs = device & !self.direction.to_bits();

        Pins::from_bits((outputs | inputs) & 0xF)
    }
}

pub fn write_data(sys: &mut System, value: Pins) {
    let value = Pins::from_bits(value.to_bits() & 0xF);
    sys.gpio.data = value;

    let Some(rtc) = sys.gpio.rtc.as_mut() else {
        return;
    };

    match rtc.write_port(value, sys.gpio.direction) {
        Ok(Some(transfer)) => {
            tracing::debug!(command = transfer.command.value(), data = ?transfer.data, "rtc write");
            sys.modules.rtc.write(transfer.command, &transfer.data);
        }
        Ok(None) => (),
        Err(fault) => tracing::warn!(%fault, state = %rtc.state(), "rtc protocol fault"),
    }
}

pub fn write_direction(sys: &mut System, value: Pins) {
    sys.gpio.direction = Pins::from_bits(value.to_bits() & 0xF);
}

pub fn write_control(sys: &mut System, value: Control) {
    sys.gpio.control = Control::from_bits(value.to_bits() & 1);
}

/// Reads a halfword from the register block. `offset` is relative to [`BASE`].
pub fn read_half(sys: &System, offset: u32) -> u16 {
    match offset & !1 {
        DATA => sys.gpio.levels().to_bits(),
        DIRECTION => sys.gpio.direction.to_bits(),
        CONTROL => sys.gpio.control.to_bits(),
        _ => 0,
    }
}

/// Writes a halfword to the register block. `offset` is relative to [`BASE`].
pub fn write_half(sys: &mut System, offset: u32, value: u16) {
    match offset & !1 {
        DATA => self::write_data(sys, Pins::from_bits(value)),
        DIRECTION => self::write_direction(sys, Pins::from_bits(value)),
        CONTROL => self::write_control(sys, Control::from_bits(value)),
        _ => (),
    }
}

/// Writes a byte to the register block. Only the low byte of each register is implemented.
pub fn write_byte(sys: &mut System, offset: u32, value: u8) {
    if offset & 1 == 0 {
        self::write_half(sys, offset, value as u16);
    }
}
