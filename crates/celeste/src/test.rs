use std::cell::RefCell;
use std::rc::Rc;

use bitos::integer::u3;
use zerocopy::{FromZeros, IntoBytes};

use crate::Address;
use crate::audio_queue::ReadSample;
use crate::modules::memory::MappedMemory;
use crate::modules::rtc::RtcModule;
use crate::system::audio::mp2k::{SAMPLES_PER_FRAME, SoundInfo, WaveHeader};
use crate::system::scheduler::Clocked;
use crate::system::timer::{self, Control};
use crate::system::{Config, Modules, System, audio};

pub mod harness {
    use super::*;
    use crate::audio_queue::SampleConsumer;
    use crate::modules::interrupt::{Interrupt, InterruptModule};

    /// Records every interrupt raised. Clones share the same record.
    #[derive(Debug, Clone, Default)]
    pub struct Interrupts(Rc<RefCell<Vec<Interrupt>>>);

    impl Interrupts {
        pub fn count(&self, interrupt: Interrupt) -> usize {
            self.0.borrow().iter().filter(|&&i| i == interrupt).count()
        }
    }

    impl InterruptModule for Interrupts {
        fn raise(&mut self, interrupt: Interrupt) {
            self.0.borrow_mut().push(interrupt);
        }
    }

    /// A system with nothing mapped and the default configuration.
    pub fn system() -> (System, Interrupts) {
        let (sys, interrupts, _) = self::system_with(Modules::default(), Config::default());
        (sys, interrupts)
    }

    /// A system with the given modules, except for the interrupt module which is replaced by a
    /// recording one.
    pub fn system_with(mut modules: Modules, config: Config) -> (System, Interrupts, SampleConsumer) {
        let interrupts = Interrupts::default();
        modules.interrupt = Box::new(interrupts.clone());

        let (sys, consumer) = System::new(modules, config);
        (sys, interrupts, consumer)
    }
}

#[derive(Debug, Clone, Default)]
struct RtcWrites(Rc<RefCell<Vec<(u8, [u8; 8])>>>);

impl RtcModule for RtcWrites {
    fn write(&mut self, command: u3, data: &[u8; 8]) {
        self.0.borrow_mut().push((command.value(), *data));
    }
}

const INFO: Address = Address(0x0300_0000);
const WAVE: Address = Address(0x0800_1000);

fn driver(samples_per_tick: i32, voices: u8) -> SoundInfo {
    let mut info = SoundInfo::new_zeroed();
    info.magic.set(0x6873_6D53);
    info.max_channels = voices;
    info.master_volume = 15;
    info.pcm_samples_per_vblank.set(samples_per_tick);
    info.pcm_sample_rate.set(13379);
    info
}

fn square_wave() -> Vec<u8> {
    let mut header = WaveHeader::new_zeroed();
    header.status.set(0x4000);
    header.sample_count.set(64);

    let mut data = header.as_bytes().to_vec();
    data.extend((0..64).map(|i| if i % 8 < 4 { 64u8 } else { (-64i8) as u8 }));
    data
}

/// Starts timer 0 overflowing every `period` cycles.
fn start_sample_timer(sys: &mut System, period: u16) {
    timer::write_reload(sys, 0, 0u16.wrapping_sub(period));
    timer::write_control(sys, 0, Control::default().with_enable(true));
}

#[test]
fn driver_ticks_follow_sample_timer() {
    let memory = MappedMemory::default().with(INFO, driver(4, 0).as_bytes().to_vec());
    let modules = Modules {
        memory: Box::new(memory),
        ..Default::default()
    };

    let (mut sys, _, consumer) = harness::system_with(modules, Config::default());
    start_sample_timer(&mut sys, 1);
    audio::engage(&mut sys, INFO);

    sys.step(3);
    assert!(consumer.is_empty());

    sys.step(1);
    assert_eq!(consumer.len(), SAMPLES_PER_FRAME);
    assert!(sys.audio.mp2k.is_engaged());

    sys.step(7);
    assert_eq!(consumer.len(), 2 * SAMPLES_PER_FRAME);
}

#[test]
fn other_timer_does_not_pace_audio() {
    let memory = MappedMemory::default().with(INFO, driver(1, 0).as_bytes().to_vec());
    let modules = Modules {
        memory: Box::new(memory),
        ..Default::default()
    };

    let (mut sys, _, consumer) = harness::system_with(modules, Config::default());
    timer::write_reload(&mut sys, 1, 0xFFFF);
    timer::write_control(&mut sys, 1, Control::default().with_enable(true));
    audio::engage(&mut sys, INFO);

    sys.step(100);
    assert!(consumer.is_empty());
}

#[test]
fn active_voice_reaches_the_queue() {
    let mut info = driver(1, 1);
    let channel = &mut info.channels[0];
    channel.status = 0x80;
    channel.volume_left = 255;
    channel.volume_right = 255;
    channel.attack = 255;
    channel.sustain = 255;
    channel.decay = 255;
    channel.frequency.set(65536);
    channel.wave_address.set(WAVE.value());

    let memory = MappedMemory::default()
        .with(INFO, info.as_bytes().to_vec())
        .with(WAVE, square_wave());

    let modules = Modules {
        memory: Box::new(memory),
        ..Default::default()
    };

    let (mut sys, _, consumer) = harness::system_with(modules, Config::default());
    start_sample_timer(&mut sys, 16);
    audio::engage(&mut sys, INFO);
    sys.step(32);

    assert_eq!(sys.audio.mp2k.active_voices(), 1);
    assert_eq!(consumer.len(), 2 * SAMPLES_PER_FRAME);

    let mut loudest = 0.0f32;
    while let ReadSample::Sample(sample) = consumer.read_sample() {
        loudest = loudest.max(sample.left.abs());
    }

    assert!(loudest > 0.4, "loudest sample was {loudest}");
}

#[test]
fn unmapped_driver_is_skipped() {
    let (mut sys, _, consumer) = harness::system_with(Modules::default(), Config::default());
    start_sample_timer(&mut sys, 1);
    audio::engage(&mut sys, INFO);

    sys.step(64);
    assert!(consumer.is_empty());
    assert!(!sys.audio.mp2k.is_engaged());
}

#[test]
fn rtc_writes_reach_module() {
    let writes = RtcWrites::default();
    let modules = Modules {
        rtc: Box::new(writes.clone()),
        ..Default::default()
    };

    let (mut sys, _, _) = harness::system_with(modules, Config::default());
    let data = Address(0x0800_00C4);
    sys.write::<u16>(Address(0x0800_00C6), 0b0111);
    sys.write::<u16>(data, 0b0000);
    sys.write::<u16>(data, 0b0100);

    let payload = [0x26, 0x10, 0x14, 0x03, 0x12, 0x34, 0x56, 0x00];
    for byte in std::iter::once(0x46u8).chain(payload) {
        for i in 0..8 {
            let sio = (((byte >> i) & 1) as u16) << 1;
            sys.write::<u16>(data, 0b0100 | sio);
            sys.write::<u16>(data, 0b0101 | sio);
        }
    }

    sys.write::<u16>(data, 0b0000);
    assert_eq!(writes.0.borrow().as_slice(), &[(4, payload)]);
}

#[test]
fn rtc_can_be_absent() {
    let config = Config {
        rtc: false,
        ..Default::default()
    };

    let (mut sys, _, _) = harness::system_with(Modules::default(), config);
    assert!(sys.gpio.rtc.is_none());

    // nothing to drive, writes only land in the register
    sys.write::<u16>(Address(0x0800_00C6), 0b0111);
    sys.write::<u16>(Address(0x0800_00C4), 0b0101);
    assert_eq!(sys.gpio.data.to_bits(), 0b0101);
}

#[test]
fn audio_timer_is_clamped() {
    let config = Config {
        audio_timer: 3,
        ..Default::default()
    };

    let (sys, _, _) = harness::system_with(Modules::default(), config);
    assert_eq!(sys.config.audio_timer, 0);
}

#[test]
fn reset_drops_pending_events() {
    let (mut sys, _) = harness::system();
    start_sample_timer(&mut sys, 100);
    audio::engage(&mut sys, INFO);
    sys.step(50);
    assert_eq!(sys.scheduler.len(), 1);

    sys.reset();
    assert_eq!(sys.scheduler.len(), 0);
    assert_eq!(sys.scheduler.elapsed(), 0);
    assert!(!sys.timers.channels[0].control.enable());
    assert!(sys.audio.sound_info().is_none());
}
