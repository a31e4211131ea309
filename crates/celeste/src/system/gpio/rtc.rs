//! Real time clock attached to the GPIO port.
//!
//! The RTC speaks a 3-wire serial protocol: chip select (CS), serial clock (SCK) and serial data
//! (SIO). A transfer starts with CS going high, followed by a command byte clocked in LSB first on
//! rising edges of SCK. The command byte carries a format nibble (`0110`) in either its low
//! nibble, or its high nibble if the game sends it in reverse bit order.

use bitos::integer::u3;
use easyerr::Error;

use crate::system::gpio::Pins;

/// Value of the format nibble of a command byte.
const COMMAND_FORMAT: u8 = 0b0110;
/// Size of the payload of a command.
pub const PAYLOAD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum State {
    #[default]
    WaitCommand,
    Sending,
    Receiving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Pin {
    Sck,
    Sio,
    Cs,
}

#[derive(Debug, Error)]
pub enum Fault {
    #[error("{f0} pin written while configured as input")]
    InputPin(Pin),
    #[error("unknown command format in byte {f0:#04X}")]
    UnknownCommand(u8),
}

/// A complete write command, ready to be handled.
#[derive(Debug, Clone, Copy)]
pub struct Transfer {
    pub command: u3,
    pub data: [u8; PAYLOAD_LEN],
}

/// Decodes a command byte into the command id and whether the RTC is sending a response.
fn decode(byte: u8) -> Result<(u3, bool), Fault> {
    let byte = if byte & 0xF == COMMAND_FORMAT {
        byte
    } else if byte >> 4 == COMMAND_FORMAT {
        tracing::debug!(byte, "rtc command in reverse bit order");
        byte.reverse_bits()
    } else {
        return Err(Fault::UnknownCommand(byte));
    };

    Ok((u3::new((byte >> 4) & 0b111), byte & 0x80 != 0))
}

#[derive(Debug)]
pub struct Rtc {
    state: State,
    sck: bool,
    sio: bool,
    cs: bool,

    /// Bits being shifted in.
    shift: u8,
    /// Index of the next bit to shift in.
    bit: usize,
    /// Index of the next payload byte.
    byte: usize,
    command: u3,
    data: [u8; PAYLOAD_LEN],
}

impl Default for Rtc {
    fn default() -> Self {
        Self {
            state: State::WaitCommand,
            sck: false,
            sio: false,
            cs: false,
            shift: 0,
            bit: 0,
            byte: 0,
            command: u3::new(0),
            data: [0; PAYLOAD_LEN],
        }
    }
}

impl Rtc {
    pub fn state(&self) -> State {
        self.state
    }

    pub fn command(&self) -> u3 {
        self.command
    }

    /// Index of the next bit to be shifted in and of the next payload byte.
    pub fn indices(&self) -> (usize, usize) {
        (self.bit, self.byte)
    }

    /// Shifts the current SIO level in. Returns the byte once 8 bits have accumulated.
    fn shift_in(&mut self) -> Option<u8> {
        self.shift = (self.shift & !(1 << self.bit)) | ((self.sio as u8) << self.bit);
        self.bit += 1;

        if self.bit == 8 {
            self.bit = 0;
            tracing::trace!(byte = self.shift, "rtc byte shifted in");
            Some(self.shift)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.state = State::WaitCommand;
        self.bit = 0;
        self.byte = 0;
    }

    /// Reads the port as seen from the pins the RTC drives.
    pub fn read_port(&self) -> Pins {
        if self.state == State::Sending {
            Pins::default().with_sio(self.sio)
        } else {
            // high impedance
            Pins::default().with_sck(true)
        }
    }

    /// Handles a write to the port. Only pins whose `direction` bit is set (output) are applied.
    ///
    /// Returns the completed transfer once a write command has received its whole payload.
    pub fn write_port(&mut self, value: Pins, direction: Pins) -> Result<Option<Transfer>, Fault> {
        if !direction.cs() {
            return Err(Fault::InputPin(Pin::Cs));
        }

        if !direction.sck() {
            return Err(Fault::InputPin(Pin::Sck));
        }

        let old_sck = self.sck;
        let old_cs = self.cs;

        self.sck = value.sck();
        self.cs = value.cs();
        if direction.sio() {
            self.sio = value.sio();
        }

        let sck_rising = !old_sck && self.sck;
        let sck_falling = old_sck && !self.sck;

        match (old_cs, self.cs) {
            (false, true) => {
                tracing::debug!(previous = %self.state, "rtc selected");
                self.reset();
            }
            (true, false) => tracing::debug!("rtc deselected"),
            _ => (),
        }

        if !self.cs {
            return Ok(None);
        }

        match self.state {
            State::WaitCommand if sck_rising => {
                let Some(byte) = self.shift_in() else {
                    return Ok(None);
                };

                let (command, sending) = self::decode(byte)?;
                self.command = command;
                self.byte = 0;
                self.state = if sending {
                    State::Sending
                } else {
                    State::Receiving
                };

                tracing::debug!(command = command.value(), state = %self.state, "rtc command");
            }
            State::Sending if sck_falling => {
                self.sio = !self.sio;
            }
            State::Receiving if sck_rising => {
                if self.byte == PAYLOAD_LEN {
                    return Ok(None);
                }

                let Some(byte) = self.shift_in() else {
                    return Ok(None);
                };

                self.data[self.byte] = byte;
                self.byte += 1;

                if self.byte == PAYLOAD_LEN {
                    return Ok(Some(Transfer {
                        command: self.command,
                        data: self.data,
                    }));
                }
            }
            _ => (),
        }

        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const OUTPUT: u16 = 0b0111;

    fn pins(sck: bool, sio: bool, cs: bool) -> Pins {
        Pins::default().with_sck(sck).with_sio(sio).with_cs(cs)
    }

    fn select(rtc: &mut Rtc) {
        rtc.write_port(pins(false, false, false), Pins::from_bits(OUTPUT)).unwrap();
        rtc.write_port(pins(false, false, true), Pins::from_bits(OUTPUT)).unwrap();
    }

    /// Clocks a byte in, LSB first, and returns the result of the last write.
    fn clock_byte(rtc: &mut Rtc, byte: u8) -> Result<Option<Transfer>, Fault> {
        let mut result = Ok(None);
        for i in 0..8 {
            let sio = (byte >> i) & 1 != 0;
            rtc.write_port(pins(false, sio, true), Pins::from_bits(OUTPUT)).unwrap();
            result = rtc.write_port(pins(true, sio, true), Pins::from_bits(OUTPUT));
        }

        result
    }

    #[test]
    fn forward_read_command() {
        let mut rtc = Rtc::default();
        select(&mut rtc);
        clock_byte(&mut rtc, 0xA6).unwrap();

        // bit 7 of the command byte set means the RTC answers
        assert_eq!(rtc.state(), State::Sending);
        assert_eq!(rtc.command().value(), 2);
    }

    #[test]
    fn forward_write_command() {
        let mut rtc = Rtc::default();
        select(&mut rtc);
        clock_byte(&mut rtc, 0x26).unwrap();

        assert_eq!(rtc.state(), State::Receiving);
        assert_eq!(rtc.command().value(), 2);
    }

    #[test]
    fn reverse_command_matches_forward() {
        let mut forward = Rtc::default();
        select(&mut forward);
        clock_byte(&mut forward, 0x26).unwrap();

        let mut reverse = Rtc::default();
        select(&mut reverse);
        clock_byte(&mut reverse, 0x26u8.reverse_bits()).unwrap();

        assert_eq!(reverse.state(), forward.state());
        assert_eq!(reverse.command().value(), forward.command().value());
    }

    #[test]
    fn unknown_command_is_dropped() {
        let mut rtc = Rtc::default();
        select(&mut rtc);

        let result = clock_byte(&mut rtc, 0x55);
        assert!(matches!(result, Err(Fault::UnknownCommand(0x55))));
        assert_eq!(rtc.state(), State::WaitCommand);
        assert_eq!(rtc.indices(), (0, 0));
    }

    #[test]
    fn chip_select_resets_from_any_state() {
        let mut rtc = Rtc::default();
        select(&mut rtc);
        clock_byte(&mut rtc, 0x26).unwrap();
        clock_byte(&mut rtc, 0x12).unwrap();
        rtc.write_port(pins(false, true, true), Pins::from_bits(OUTPUT)).unwrap();
        rtc.write_port(pins(true, true, true), Pins::from_bits(OUTPUT)).unwrap();
        assert_eq!(rtc.indices(), (1, 1));

        select(&mut rtc);
        assert_eq!(rtc.state(), State::WaitCommand);
        assert_eq!(rtc.indices(), (0, 0));
    }

    #[test]
    fn receiving_hands_off_full_payload() {
        let mut rtc = Rtc::default();
        select(&mut rtc);
        clock_byte(&mut rtc, 0x46).unwrap();

        let payload = [0x21, 0x10, 0x14, 0x03, 0x12, 0x34, 0x56, 0x78];
        for &byte in &payload[..7] {
            assert!(clock_byte(&mut rtc, byte).unwrap().is_none());
        }

        let transfer = clock_byte(&mut rtc, payload[7]).unwrap().unwrap();
        assert_eq!(transfer.command.value(), 4);
        assert_eq!(transfer.data, payload);

        // further clocks are ignored until the next transfer
        assert!(clock_byte(&mut rtc, 0xFF).unwrap().is_none());
    }

    #[test]
    fn sending_toggles_on_falling_edge() {
        let mut rtc = Rtc::default();
        select(&mut rtc);
        clock_byte(&mut rtc, 0xE6).unwrap();
        assert_eq!(rtc.state(), State::Sending);

        let sio_input = Pins::from_bits(0b0101);
        let before = rtc.read_port().sio();

        // rising edge: nothing
        rtc.write_port(pins(true, false, true), sio_input).unwrap();
        assert_eq!(rtc.read_port().sio(), before);

        // falling edge: toggle
        rtc.write_port(pins(false, false, true), sio_input).unwrap();
        assert_eq!(rtc.read_port().sio(), !before);
    }

    #[test]
    fn input_pins_are_rejected() {
        let mut rtc = Rtc::default();
        let no_cs = Pins::from_bits(0b0011);

        let result = rtc.write_port(pins(false, false, true), no_cs);
        assert!(matches!(result, Err(Fault::InputPin(Pin::Cs))));

        // nothing was applied, so this is still a rising edge of CS
        rtc.write_port(pins(false, false, true), Pins::from_bits(OUTPUT)).unwrap();
        assert_eq!(rtc.state(), State::WaitCommand);
        assert!(rtc.cs);
    }

    #[test]
    fn idle_port_reads_high_impedance() {
        let rtc = Rtc::default();
        assert_eq!(rtc.read_port().to_bits(), 1);
    }
}
