//! State of the system (i.e. the timing sensitive hardware of the GBA).

pub mod bus;
pub mod scheduler;

pub mod audio;
pub mod gpio;
pub mod timer;

use crate::audio_queue::SampleConsumer;
use crate::modules::backup::{BackupModule, NopBackupModule};
use crate::modules::interrupt::{InterruptModule, NopInterruptModule};
use crate::modules::memory::{MemoryModule, NopMemoryModule};
use crate::modules::rtc::{NopRtcModule, RtcModule};
use crate::system::audio::mp2k::sampler::Interpolation;
use crate::system::scheduler::{Clocked, Scheduler};

/// System configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interpolation used by the MP2K engine.
    pub interpolation: Interpolation,
    /// Which of timers 0 and 1 paces the sound driver.
    pub audio_timer: usize,
    /// How many frames the audio queue holds.
    pub audio_buffer_frames: usize,
    /// Whether an RTC is attached to the GPIO port.
    pub rtc: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Linear,
            audio_timer: 0,
            audio_buffer_frames: 4,
            rtc: true,
        }
    }
}

/// System modules.
pub struct Modules {
    pub memory: Box<dyn MemoryModule>,
    pub interrupt: Box<dyn InterruptModule>,
    pub rtc: Box<dyn RtcModule>,
    pub backup: Box<dyn BackupModule>,
}

impl Default for Modules {
    fn default() -> Self {
        Self {
            memory: Box::new(NopMemoryModule),
            interrupt: Box::new(NopInterruptModule),
            rtc: Box::new(NopRtcModule),
            backup: Box::new(NopBackupModule),
        }
    }
}

/// System state.
pub struct System {
    /// System configuration.
    pub config: Config,
    /// System modules.
    pub modules: Modules,
    /// Scheduler for events.
    pub scheduler: Scheduler<System>,
    /// The hardware timers.
    pub timers: timer::Timers,
    /// The cartridge GPIO port.
    pub gpio: gpio::Interface,
    /// The audio interface.
    pub audio: audio::Interface,
}

impl System {
    /// Creates a powered on system, along with the consumer of its audio output.
    pub fn new(modules: Modules, mut config: Config) -> (Self, SampleConsumer) {
        if config.audio_timer > 1 {
            tracing::warn!(timer = config.audio_timer, "only timers 0 and 1 can pace audio, using 0");
            config.audio_timer = 0;
        }

        let (audio, consumer) =
            audio::Interface::new(config.interpolation, config.audio_buffer_frames);

        let system = System {
            scheduler: Scheduler::default(),
            timers: timer::Timers::default(),
            gpio: gpio::Interface::new(config.rtc),
            audio,

            config,
            modules,
        };

        (system, consumer)
    }

    /// Reinitializes every component. Modules are kept, pending events are dropped.
    pub fn reset(&mut self) {
        tracing::info!("resetting system");
        self.scheduler = Scheduler::default();
        self.timers = timer::Timers::default();
        self.gpio = gpio::Interface::new(self.config.rtc);
        audio::disengage(self);
    }
}

impl Clocked for System {
    #[inline(always)]
    fn scheduler(&mut self) -> &mut Scheduler<Self> {
        &mut self.scheduler
    }
}
