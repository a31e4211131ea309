//! Hardware timers (TM0-TM3).
//!
//! Counters are never ticked. A running channel remembers the cycle it was last started at and
//! its counter is reconstructed from the elapsed time whenever it is needed.

use bitos::bitos;

use crate::FREQUENCY;
use crate::modules::interrupt::Interrupt;
use crate::system::scheduler::{EventId, Handler, HandlerCtx, Source};
use crate::system::{System, audio};

/// Number of timer channels.
pub const CHANNELS: usize = 4;
/// Base address of the timer registers.
pub const BASE: u32 = 0x0400_0100;
/// Bits of the control register which are actually implemented.
const CONTROL_MASK: u16 = 0x00C7;
const OVERFLOW: u64 = 0x1_0000;

#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prescaler {
    #[default]
    Div1    = 0b00,
    Div64   = 0b01,
    Div256  = 0b10,
    Div1024 = 0b11,
}

impl Prescaler {
    /// Log2 of the amount of system cycles per timer tick.
    pub fn shift(self) -> u32 {
        match self {
            Self::Div1 => 0,
            Self::Div64 => 6,
            Self::Div256 => 8,
            Self::Div1024 => 10,
        }
    }
}

#[bitos(16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Control {
    #[bits(0..2)]
    pub prescaler: Prescaler,
    #[bits(2)]
    pub cascade: bool,
    #[bits(6)]
    pub interrupt: bool,
    #[bits(7)]
    pub enable: bool,
}

#[derive(Debug, Default)]
pub struct Channel {
    /// Value loaded into the counter on start and on overflow.
    pub reload: u16,
    /// Counter value as of `started`.
    counter: u16,
    pub control: Control,
    /// Cycle at which `counter` was last brought up to date.
    started: u64,
    /// Pending overflow event.
    event: Option<EventId>,
}

impl Channel {
    /// Whether this channel counts overflows of the previous channel. Channel 0 has no previous
    /// channel and ignores the cascade bit.
    fn cascading(&self, id: usize) -> bool {
        id != 0 && self.control.cascade()
    }

    fn shift(&self) -> u32 {
        self.control.prescaler().shift()
    }

    /// Ticks between two overflows.
    fn ticks_per_overflow(&self) -> u64 {
        OVERFLOW - self.reload as u64
    }

    /// Whether this channel counts on its own prescaled clock.
    fn free_running(&self, id: usize) -> bool {
        self.control.enable() && !self.cascading(id)
    }

    /// Wraps a counter value which went past `0xFFFF` back into the reload period.
    fn wrap(&self, value: u64) -> u16 {
        if value < OVERFLOW {
            value as u16
        } else {
            self.reload + ((value - OVERFLOW) % self.ticks_per_overflow()) as u16
        }
    }

    /// Reconstructs the counter at cycle `now`.
    fn counter_at(&self, id: usize, now: u64) -> u16 {
        if !self.free_running(id) {
            return self.counter;
        }

        let ticks = (now - self.started) >> self.shift();
        self.wrap(self.counter as u64 + ticks)
    }

    /// Frequency at which this channel overflows, in Hz.
    pub fn overflow_rate(&self) -> f64 {
        FREQUENCY as f64 / (self.ticks_per_overflow() << self.shift()) as f64
    }
}

#[derive(Debug, Default)]
pub struct Timers {
    pub channels: [Channel; CHANNELS],
}

const OVERFLOW_HANDLERS: [Handler<System>; CHANNELS] =
    [overflow::<0>, overflow::<1>, overflow::<2>, overflow::<3>];

/// Brings the stored counter of a channel up to date, keeping the phase within the current tick.
///
/// If the clock was advanced past an overflow whose event has not been processed yet, the
/// overflow takes effect here and the channel is re-armed, so a register write cannot lose it.
fn fold(sys: &mut System, id: usize) {
    let now = sys.scheduler.elapsed();
    let channel = &mut sys.timers.channels[id];
    if !channel.free_running(id) {
        return;
    }

    let elapsed = now - channel.started;
    let remainder = elapsed & ((1 << channel.shift()) - 1);
    let value = channel.counter as u64 + (elapsed >> channel.shift());

    tracing::trace!(id, prev = channel.counter, value, now, "folding timer counter");
    channel.counter = channel.wrap(value);
    channel.started = now - remainder;

    if value < OVERFLOW {
        return;
    }

    let times = 1 + (value - OVERFLOW) / channel.ticks_per_overflow();
    tracing::trace!(id, times, "overdue timer overflow caught up");

    self::stop(sys, id);
    self::arm(sys, id, remainder);
    self::overflowed(sys, id, times);
}

/// Schedules the next overflow of a free running channel, `into_tick` cycles into the current
/// tick.
fn arm(sys: &mut System, id: usize, into_tick: u64) {
    let channel = &sys.timers.channels[id];
    let delay = ((OVERFLOW - channel.counter as u64) << channel.shift()) - into_tick;
    let event = sys
        .scheduler
        .schedule(delay, Source::Timer(id), OVERFLOW_HANDLERS[id]);

    sys.timers.channels[id].event = Some(event);
}

/// Starts counting from the current counter value.
fn start(sys: &mut System, id: usize) {
    let now = sys.scheduler.elapsed();
    let channel = &mut sys.timers.channels[id];
    channel.started = now;

    if !channel.cascading(id) {
        self::arm(sys, id, 0);
    }
}

fn stop(sys: &mut System, id: usize) {
    if let Some(event) = sys.timers.channels[id].event.take() {
        sys.scheduler.cancel(event);
    }
}

/// Scheduled overflow of a free running channel.
fn overflow<const ID: usize>(sys: &mut System, ctx: HandlerCtx) {
    let now = sys.scheduler.elapsed();
    let channel = &mut sys.timers.channels[ID];
    channel.event = None;

    // a late handler has to account for every overflow it missed
    let period = channel.ticks_per_overflow() << channel.shift();
    let late = ctx.cycles_late.value();
    let times = 1 + late / period;
    let phase = late % period;

    channel.counter = channel.reload;
    channel.started = now - phase;

    let event = sys
        .scheduler
        .schedule(period - phase, Source::Timer(ID), overflow::<ID>);

    sys.timers.channels[ID].event = Some(event);
    self::overflowed(sys, ID, times);
}

/// Effects of a channel overflowing `times` times in a row.
fn overflowed(sys: &mut System, id: usize, times: u64) {
    let channel = &sys.timers.channels[id];
    tracing::trace!(id, times, "timer overflow");

    if channel.control.interrupt() {
        sys.modules.interrupt.raise(Interrupt::timer(id));
    }

    if id < 2 {
        audio::timer_overflow(sys, id, times);
    }

    let next = id + 1;
    if next < CHANNELS {
        let next_channel = &sys.timers.channels[next];
        if next_channel.control.enable() && next_channel.cascading(next) {
            self::tick_cascade(sys, next, times);
        }
    }
}

/// Advances a cascading channel by `ticks`.
fn tick_cascade(sys: &mut System, id: usize, ticks: u64) {
    let channel = &mut sys.timers.channels[id];
    let value = channel.counter as u64 + ticks;
    if value < OVERFLOW {
        channel.counter = value as u16;
        return;
    }

    let overflows = 1 + (value - OVERFLOW) / channel.ticks_per_overflow();
    channel.counter = channel.wrap(value);
    self::overflowed(sys, id, overflows);
}

/// Notifies the audio engine of the overflow rates of the sound capable channels.
fn recalculate_sample_rates(sys: &mut System) {
    for id in 0..2 {
        let channel = &sys.timers.channels[id];
        let rate = if channel.free_running(id) {
            channel.overflow_rate()
        } else {
            0.0
        };

        audio::update_sample_rate(sys, id, rate);
    }
}

/// Reads `TMxCNT_L`: the live counter of a channel.
pub fn read_counter(sys: &System, id: usize) -> u16 {
    sys.timers.channels[id].counter_at(id, sys.scheduler.elapsed())
}

/// Writes `TMxCNT_L`: the reload value of a channel. Takes effect on the next start or overflow.
pub fn write_reload(sys: &mut System, id: usize, value: u16) {
    self::fold(sys, id);
    let channel = &mut sys.timers.channels[id];
    channel.reload = value;

    if id < 2 && channel.free_running(id) {
        self::recalculate_sample_rates(sys);
    }
}

/// Reads `TMxCNT_H`: the control register of a channel.
pub fn read_control(sys: &System, id: usize) -> Control {
    sys.timers.channels[id].control
}

/// Writes `TMxCNT_H`: the control register of a channel.
pub fn write_control(sys: &mut System, id: usize, value: Control) {
    let value = Control::from_bits(value.to_bits() & CONTROL_MASK);

    self::fold(sys, id);
    let channel = &mut sys.timers.channels[id];
    let old = channel.control;
    channel.control = value;

    tracing::debug!(id, ?old, new = ?value, "timer control write");
    match (old.enable(), value.enable()) {
        (false, true) => {
            channel.counter = channel.reload;
            self::start(sys, id);
        }
        (true, false) => self::stop(sys, id),
        (true, true)
            if old.prescaler() != value.prescaler() || old.cascade() != value.cascade() =>
        {
            self::stop(sys, id);
            self::start(sys, id);
        }
        _ => (),
    }

    if id < 2 {
        self::recalculate_sample_rates(sys);
    }
}

/// Reads a byte from the timer register block. `offset` is relative to [`BASE`].
pub fn read_byte(sys: &System, offset: u32) -> u8 {
    let half = self::read_half(sys, offset & !1);
    (half >> ((offset & 1) * 8)) as u8
}

/// Reads a halfword from the timer register block. `offset` is relative to [`BASE`].
pub fn read_half(sys: &System, offset: u32) -> u16 {
    let id = (offset / 4) as usize % CHANNELS;
    match offset & 3 {
        0 => self::read_counter(sys, id),
        _ => self::read_control(sys, id).to_bits(),
    }
}

/// Reads a word from the timer register block. `offset` is relative to [`BASE`].
pub fn read_word(sys: &System, offset: u32) -> u32 {
    let id = (offset / 4) as usize % CHANNELS;
    self::read_counter(sys, id) as u32 | ((self::read_control(sys, id).to_bits() as u32) << 16)
}

/// Writes a byte to the timer register block. `offset` is relative to [`BASE`].
pub fn write_byte(sys: &mut System, offset: u32, value: u8) {
    let id = (offset / 4) as usize % CHANNELS;
    let channel = &sys.timers.channels[id];
    let shift = (offset & 1) * 8;
    let keep = !(0xFFu16 << shift);

    match offset & 3 {
        0 | 1 => {
            let reload = (channel.reload & keep) | ((value as u16) << shift);
            self::write_reload(sys, id, reload);
        }
        _ => {
            let control = (channel.control.to_bits() & keep) | ((value as u16) << shift);
            self::write_control(sys, id, Control::from_bits(control));
        }
    }
}

/// Writes a halfword to the timer register block. `offset` is relative to [`BASE`].
pub fn write_half(sys: &mut System, offset: u32, value: u16) {
    let id = (offset / 4) as usize % CHANNELS;
    match offset & 3 {
        0 => self::write_reload(sys, id, value),
        _ => self::write_control(sys, id, Control::from_bits(value)),
    }
}

/// Writes a word to the timer register block. `offset` is relative to [`BASE`].
///
/// The reload is written first, so a word write that starts a channel loads the new reload.
pub fn write_word(sys: &mut System, offset: u32, value: u32) {
    let id = (offset / 4) as usize % CHANNELS;
    self::write_reload(sys, id, value as u16);
    self::write_control(sys, id, Control::from_bits((value >> 16) as u16));
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::system::scheduler::Clocked;
    use crate::test::harness;

    fn enable(prescaler: Prescaler) -> Control {
        Control::default().with_prescaler(prescaler).with_enable(true)
    }

    #[test]
    fn reload_roundtrips_while_stopped() {
        let (mut sys, _) = harness::system();
        for value in [0, 1, 0x1234, 0xFFFF] {
            write_reload(&mut sys, 2, value);
            assert_eq!(sys.timers.channels[2].reload, value);
            assert_eq!(read_counter(&sys, 2), 0);
        }
    }

    #[test]
    fn counter_matches_per_cycle_model() {
        let (mut sys, _) = harness::system();
        write_reload(&mut sys, 1, 0xFFF0);
        write_control(&mut sys, 1, enable(Prescaler::Div64));
        assert_eq!(read_counter(&sys, 1), 0xFFF0);

        let mut model = 0xFFF0u32;
        for cycle in 1..=(64 * 40) {
            sys.step(1);
            if cycle % 64 == 0 {
                model += 1;
                if model == 0x1_0000 {
                    model = 0xFFF0;
                }
            }

            assert_eq!(read_counter(&sys, 1) as u32, model, "cycle {cycle}");
        }
    }

    #[test]
    fn overflow_reloads_after_period() {
        let (mut sys, interrupts) = harness::system();
        write_reload(&mut sys, 0, 0xFF00);
        write_control(&mut sys, 0, enable(Prescaler::Div256).with_interrupt(true));

        let period = (0x1_0000 - 0xFF00) * 256;
        sys.step(period - 1);
        assert_eq!(read_counter(&sys, 0), 0xFFFF);
        assert_eq!(interrupts.count(Interrupt::Timer0), 0);

        sys.step(1);
        assert_eq!(read_counter(&sys, 0), 0xFF00);
        assert_eq!(interrupts.count(Interrupt::Timer0), 1);

        sys.step(period * 3);
        assert_eq!(interrupts.count(Interrupt::Timer0), 4);
    }

    #[test]
    fn late_processing_does_not_drift() {
        let (mut precise, _) = harness::system();
        let (mut lazy, _) = harness::system();
        for sys in [&mut precise, &mut lazy] {
            write_reload(sys, 0, 0xFFFD);
            write_control(sys, 0, enable(Prescaler::Div1));
            write_control(sys, 1, Control::default().with_cascade(true).with_enable(true));
        }

        precise.step(1000);
        lazy.scheduler.advance(1000);
        lazy.process_events();

        assert_eq!(read_counter(&precise, 0), read_counter(&lazy, 0));
        assert_eq!(read_counter(&precise, 1), read_counter(&lazy, 1));
        assert_eq!(read_counter(&lazy, 1), 333);

        precise.step(7);
        lazy.step(7);
        assert_eq!(read_counter(&precise, 0), read_counter(&lazy, 0));
        assert_eq!(read_counter(&precise, 1), read_counter(&lazy, 1));
    }

    /// Channel 0 overflowing at cycle 16 into a cascading channel 1, with the clock advanced to
    /// cycle 20 and nothing processed yet.
    fn overdue_overflow() -> (System, harness::Interrupts) {
        let (mut sys, interrupts) = harness::system();
        write_reload(&mut sys, 0, 0xFFF0);
        write_control(&mut sys, 0, enable(Prescaler::Div1).with_interrupt(true));
        write_control(&mut sys, 1, Control::default().with_cascade(true).with_enable(true));

        sys.scheduler.advance(20);
        (sys, interrupts)
    }

    #[test]
    fn stop_with_overdue_overflow_keeps_it() {
        let (mut sys, interrupts) = overdue_overflow();
        write_control(&mut sys, 0, Control::default().with_interrupt(true));
        sys.process_events();

        assert_eq!(interrupts.count(Interrupt::Timer0), 1);
        assert_eq!(read_counter(&sys, 0), 0xFFF4);
        assert_eq!(read_counter(&sys, 1), 1);
        assert_eq!(sys.scheduler.len(), 0);
    }

    #[test]
    fn prescaler_change_with_overdue_overflow_keeps_it() {
        let (mut sys, interrupts) = overdue_overflow();
        write_control(&mut sys, 0, enable(Prescaler::Div64).with_interrupt(true));
        sys.process_events();

        assert_eq!(interrupts.count(Interrupt::Timer0), 1);
        assert_eq!(read_counter(&sys, 0), 0xFFF4);
        assert_eq!(read_counter(&sys, 1), 1);

        sys.step(12 * 64 - 1);
        assert_eq!(interrupts.count(Interrupt::Timer0), 1);
        sys.step(1);
        assert_eq!(interrupts.count(Interrupt::Timer0), 2);
        assert_eq!(read_counter(&sys, 1), 2);
    }

    #[test]
    fn reload_write_with_overdue_overflow_matches_precise() {
        let (mut lazy, lazy_interrupts) = overdue_overflow();
        let (mut precise, precise_interrupts) = harness::system();
        write_reload(&mut precise, 0, 0xFFF0);
        write_control(&mut precise, 0, enable(Prescaler::Div1).with_interrupt(true));
        write_control(&mut precise, 1, Control::default().with_cascade(true).with_enable(true));
        precise.step(20);

        for sys in [&mut lazy, &mut precise] {
            write_reload(sys, 0, 0xFF00);
            sys.process_events();
            sys.step(300);
        }

        assert_eq!(read_counter(&lazy, 0), read_counter(&precise, 0));
        assert_eq!(read_counter(&lazy, 1), read_counter(&precise, 1));
        assert_eq!(read_counter(&lazy, 1), 2);
        assert_eq!(
            lazy_interrupts.count(Interrupt::Timer0),
            precise_interrupts.count(Interrupt::Timer0)
        );
    }

    #[test]
    fn cascade_ticks_once_per_overflow() {
        let (mut sys, interrupts) = harness::system();
        write_reload(&mut sys, 0, 0xFFFF);
        write_control(&mut sys, 0, enable(Prescaler::Div64));

        write_reload(&mut sys, 1, 0xFFFE);
        write_control(
            &mut sys,
            1,
            Control::default()
                .with_prescaler(Prescaler::Div1)
                .with_cascade(true)
                .with_interrupt(true)
                .with_enable(true),
        );

        // the cascading channel ignores its own prescaler
        sys.step(63);
        assert_eq!(read_counter(&sys, 1), 0xFFFE);

        sys.step(1);
        assert_eq!(read_counter(&sys, 1), 0xFFFF);
        assert_eq!(interrupts.count(Interrupt::Timer1), 0);

        sys.step(64);
        assert_eq!(read_counter(&sys, 1), 0xFFFE);
        assert_eq!(interrupts.count(Interrupt::Timer1), 1);
    }

    #[test]
    fn channel_zero_ignores_cascade() {
        let (mut sys, _) = harness::system();
        write_control(&mut sys, 0, enable(Prescaler::Div1).with_cascade(true));
        sys.step(10);
        assert_eq!(read_counter(&sys, 0), 10);
    }

    #[test]
    fn stop_freezes_and_cancels() {
        let (mut sys, interrupts) = harness::system();
        write_control(&mut sys, 3, enable(Prescaler::Div1).with_interrupt(true));
        sys.step(100);
        write_control(&mut sys, 3, Control::default().with_interrupt(true));

        assert_eq!(read_counter(&sys, 3), 100);
        assert_eq!(sys.scheduler.len(), 0);

        sys.step(0x2_0000);
        assert_eq!(read_counter(&sys, 3), 100);
        assert_eq!(interrupts.count(Interrupt::Timer3), 0);
    }

    #[test]
    fn prescaler_change_keeps_count() {
        let (mut sys, _) = harness::system();
        write_control(&mut sys, 2, enable(Prescaler::Div1));
        sys.step(500);
        write_control(&mut sys, 2, enable(Prescaler::Div64));
        assert_eq!(read_counter(&sys, 2), 500);

        sys.step(64 * 3);
        assert_eq!(read_counter(&sys, 2), 503);
    }

    #[test]
    fn control_reads_back_masked() {
        let (mut sys, _) = harness::system();
        write_control(&mut sys, 0, Control::from_bits(0xFFFF));
        assert_eq!(read_control(&sys, 0).to_bits(), 0x00C7);
    }

    #[test]
    fn register_access_widths() {
        let (mut sys, _) = harness::system();
        write_word(&mut sys, 0x4, 0x0080_FFF0);
        assert_eq!(sys.timers.channels[1].reload, 0xFFF0);
        assert!(read_control(&sys, 1).enable());

        sys.step(3);
        assert_eq!(read_half(&sys, 0x4), 0xFFF3);
        assert_eq!(read_byte(&sys, 0x4), 0xF3);
        assert_eq!(read_byte(&sys, 0x5), 0xFF);
        assert_eq!(read_byte(&sys, 0x6), 0x80);
        assert_eq!(read_word(&sys, 0x4), 0x0080_FFF3);

        write_byte(&mut sys, 0x8, 0x34);
        write_byte(&mut sys, 0x9, 0x12);
        assert_eq!(sys.timers.channels[2].reload, 0x1234);
    }
}
