//! Routing of memory accesses to the components of the system.

use crate::system::{System, gpio, timer};
use crate::{Address, Primitive};

const TIMER_END: u32 = timer::BASE + 4 * timer::CHANNELS as u32 - 1;
const GPIO_END: u32 = gpio::BASE + gpio::LEN - 1;
const BACKUP_START: u32 = 0x0E00_0000;
const BACKUP_END: u32 = 0x0FFF_FFFF;

impl System {
    /// Reads a primitive from the given address.
    pub fn read<P: Primitive>(&mut self, addr: Address) -> P {
        let addr = addr.align_down(P::SIZE);
        match addr.value() {
            timer::BASE..=TIMER_END => {
                let offset = addr.value() - timer::BASE;
                let value = match P::SIZE {
                    1 => timer::read_byte(self, offset) as u32,
                    2 => timer::read_half(self, offset) as u32,
                    _ => timer::read_word(self, offset),
                };

                P::from_u32(value)
            }
            gpio::BASE..=GPIO_END if self.gpio.readable() => {
                let offset = addr.value() - gpio::BASE;
                let value = match P::SIZE {
                    1 => (gpio::read_half(self, offset) >> ((offset & 1) * 8)) as u32,
                    2 => gpio::read_half(self, offset) as u32,
                    _ => {
                        gpio::read_half(self, offset) as u32
                            | ((gpio::read_half(self, offset + 2) as u32) << 16)
                    }
                };

                P::from_u32(value)
            }
            BACKUP_START..=BACKUP_END => {
                // the backup bus is 8 bits wide, wider reads see the byte repeated
                let byte = self.modules.backup.read(addr.value()) as u32;
                P::from_u32(byte * 0x0101_0101)
            }
            _ => self.modules.memory.read_primitive(addr).unwrap_or_else(|| {
                tracing::trace!(%addr, "read from unmapped address");
                P::default()
            }),
        }
    }

    /// Writes a primitive to the given address.
    pub fn write<P: Primitive>(&mut self, addr: Address, value: P) {
        let unaligned = addr;
        let addr = addr.align_down(P::SIZE);
        match addr.value() {
            timer::BASE..=TIMER_END => {
                let offset = addr.value() - timer::BASE;
                match P::SIZE {
                    1 => timer::write_byte(self, offset, value.to_u32() as u8),
                    2 => timer::write_half(self, offset, value.to_u32() as u16),
                    _ => timer::write_word(self, offset, value.to_u32()),
                }
            }
            gpio::BASE..=GPIO_END => {
                let offset = addr.value() - gpio::BASE;
                match P::SIZE {
                    1 => gpio::write_byte(self, offset, value.to_u32() as u8),
                    2 => gpio::write_half(self, offset, value.to_u32() as u16),
                    _ => {
                        gpio::write_half(self, offset, value.to_u32() as u16);
                        gpio::write_half(self, offset + 2, (value.to_u32() >> 16) as u16);
                    }
                }
            }
            BACKUP_START..=BACKUP_END => {
                let shift = (unaligned.value() & (P::SIZE - 1)) * 8;
                let byte = (value.to_u32() >> shift) as u8;
                self.modules.backup.write(unaligned.value(), byte);
            }
            _ => {
                tracing::error!(%addr, ?value, "write to unhandled address");
            }
        }
    }
}
