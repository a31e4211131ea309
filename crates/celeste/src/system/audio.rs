//! Audio interface: drives the MP2K engine from timer overflows.
//!
//! Games using the sound driver program one of the sound timers to overflow once per output
//! sample. The engine renders a frame after every `pcm_samples_per_vblank` overflows of that
//! timer, which is the cadence at which the driver itself would have mixed.
pub mod mp2k;

use crate::Address;
use crate::audio_queue::SampleConsumer;
use crate::system::System;
use crate::system::audio::mp2k::Engine;
use crate::system::audio::mp2k::sampler::Interpolation;

pub struct Interface {
    pub mp2k: Engine,
    /// Address of the driver's `SoundInfo`, once the driver has been found.
    sound_info: Option<Address>,
    /// Overflows of the cadence timer since the last frame.
    pending: u64,
    /// Overflow rate of timers 0 and 1, in Hz.
    sample_rates: [f64; 2],
}

impl Interface {
    pub fn new(interpolation: Interpolation, buffer_frames: usize) -> (Self, SampleConsumer) {
        let (mp2k, consumer) = Engine::new(interpolation, buffer_frames);
        let interface = Self {
            mp2k,
            sound_info: None,
            pending: 0,
            sample_rates: [0.0; 2],
        };

        (interface, consumer)
    }

    pub fn sound_info(&self) -> Option<Address> {
        self.sound_info
    }

    /// Overflow rate of a sound timer, in Hz. Zero if it is not running.
    pub fn sample_rate(&self, id: usize) -> f64 {
        self.sample_rates[id]
    }

    /// Timer overflows needed for a frame.
    fn samples_per_tick(&self, timer: usize) -> u64 {
        let from_driver = self.mp2k.globals().samples_per_tick as u64;
        if from_driver != 0 {
            return from_driver;
        }

        ((self.sample_rates[timer] / 60.0).round() as u64).max(1)
    }
}

/// Starts mixing the sound driver whose `SoundInfo` lives at `sound_info`.
///
/// This is what a hook on the driver's main routine calls.
pub fn engage(sys: &mut System, sound_info: Address) {
    if sys.audio.sound_info == Some(sound_info) {
        return;
    }

    tracing::info!(%sound_info, timer = sys.config.audio_timer, "engaging mp2k");
    sys.audio.sound_info = Some(sound_info);
    sys.audio.pending = 0;
    sys.audio.mp2k.reset();

    // the cadence comes from the driver, so it is needed before the first tick
    match mp2k::read_snapshot(&*sys.modules.memory, sound_info) {
        Ok(info) => sys.audio.mp2k.observe(&info),
        Err(e) => tracing::warn!(%e, "driver not readable yet"),
    }
}

/// Stops mixing. The last frames stay queued.
pub fn disengage(sys: &mut System) {
    tracing::info!("disengaging mp2k");
    sys.audio.sound_info = None;
    sys.audio.pending = 0;
    sys.audio.mp2k.reset();
}

/// Called by a sound timer whenever its overflow rate changes.
pub fn update_sample_rate(sys: &mut System, id: usize, rate: f64) {
    let previous = std::mem::replace(&mut sys.audio.sample_rates[id], rate);
    if previous.to_bits() != rate.to_bits() {
        tracing::debug!(id, previous, rate, "sound timer rate changed");
    }
}

/// Called by a sound timer after overflowing `times` times.
pub fn timer_overflow(sys: &mut System, id: usize, times: u64) {
    if id != sys.config.audio_timer || sys.audio.sound_info.is_none() {
        return;
    }

    sys.audio.pending += times;
    loop {
        let needed = sys.audio.samples_per_tick(id);
        if sys.audio.pending < needed {
            break;
        }

        sys.audio.pending -= needed;
        self::tick(sys);
    }
}

/// Ingests the driver state and renders a frame.
pub fn tick(sys: &mut System) {
    let Some(addr) = sys.audio.sound_info else {
        return;
    };

    let memory = &*sys.modules.memory;
    match mp2k::read_snapshot(memory, addr) {
        Ok(info) => {
            sys.audio.mp2k.ingest(&info, memory);
            sys.audio.mp2k.render_frame(memory);
        }
        Err(e) => tracing::warn!(%e, "skipping mp2k frame"),
    }
}
