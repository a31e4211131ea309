//! High level emulation of the MP2K (m4a) sound driver mixer.
//!
//! Games using the driver keep a [`SoundInfo`] structure in memory which describes every voice
//! being played. Instead of running the driver's mixing routine, the engine reads that structure
//! once per driver tick and mixes the voices itself, at a higher rate and with better
//! interpolation than the driver itself.

pub mod envelope;
pub mod sampler;

use bitos::bitos;
use bitos::integer::u2;
use easyerr::Error;
use static_assertions::const_assert_eq;
use zerocopy::little_endian::{I32, U16, U32};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use crate::Address;
use crate::audio_queue::{SampleConsumer, SampleProducer, Stereo, sample_queue};
use crate::modules::memory::MemoryModule;
use crate::system::audio::mp2k::envelope::{Envelope, Params};
use crate::system::audio::mp2k::sampler::{Interpolation, Sampler};

/// Maximum amount of voices driven by the sound driver.
pub const MAX_CHANNELS: usize = 12;
/// Rate at which the engine mixes, in Hz.
pub const SAMPLE_RATE: u32 = 65536;
/// Samples in one frame produced by the engine.
pub const SAMPLES_PER_FRAME: usize = SAMPLE_RATE as usize / 60 + 1;

/// Magic value of an idle driver. The driver increments it while busy.
const MAGIC: u32 = 0x6873_6D53;

/// Channel type flag: plays at the driver sample rate, regardless of the channel frequency.
const TYPE_FIXED_FREQUENCY: u8 = 0x08;
/// Channel type flag: wave data is compressed.
const TYPE_COMPRESSED: u8 = 0x20;

#[bitos(8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    #[bits(0..2)]
    pub envelope: u2,
    #[bits(2)]
    pub echo: bool,
    #[bits(4)]
    pub looped: bool,
    #[bits(6)]
    pub stop: bool,
    #[bits(7)]
    pub start: bool,
}

impl Status {
    /// Whether the driver considers the channel in use.
    pub fn on(&self) -> bool {
        self.to_bits() & 0xC7 != 0
    }
}

/// A channel of the driver, as laid out in memory.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SoundChannel {
    pub status: u8,
    pub kind: u8,
    pub volume_right: u8,
    pub volume_left: u8,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    pub unknown0: u8,
    pub envelope_volume: u8,
    pub envelope_volume_right: u8,
    pub envelope_volume_left: u8,
    pub echo_volume: u8,
    pub echo_length: u8,
    pub unknown1: [u8; 18],
    pub frequency: U32,
    pub wave_address: U32,
    pub unknown2: [U32; 6],
}

/// Global state of the driver, as laid out in memory.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct SoundInfo {
    pub magic: U32,
    pub pcm_dma_counter: u8,
    pub reverb: u8,
    pub max_channels: u8,
    pub master_volume: u8,
    pub unknown0: [u8; 8],
    pub pcm_samples_per_vblank: I32,
    pub pcm_sample_rate: I32,
    pub unknown1: [U32; 14],
    pub channels: [SoundChannel; MAX_CHANNELS],
}

/// Header of a wave, followed by its samples.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct WaveHeader {
    pub kind: U16,
    pub status: U16,
    pub frequency: U32,
    pub loop_position: U32,
    pub sample_count: U32,
}

const_assert_eq!(size_of::<SoundChannel>(), 64);
const_assert_eq!(size_of::<SoundInfo>(), 848);
const_assert_eq!(size_of::<WaveHeader>(), 16);

impl SoundInfo {
    /// Whether the magic marks a driver that is idle or mid update.
    pub fn is_valid(&self) -> bool {
        self.magic.get().wrapping_sub(MAGIC) <= 1
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("sound info at {f0} is not mapped")]
    Unmapped(Address),
    #[error("bad sound info magic {f0:#010X}")]
    Magic(u32),
}

/// Reads the driver state at `addr`.
pub fn read_snapshot(memory: &dyn MemoryModule, addr: Address) -> Result<SoundInfo, SnapshotError> {
    let mut info = SoundInfo::new_zeroed();
    if !memory.read(addr, info.as_mut_bytes()) {
        return Err(SnapshotError::Unmapped(addr));
    }

    if !info.is_valid() {
        return Err(SnapshotError::Magic(info.magic.get()));
    }

    Ok(info)
}

/// Global parameters of the latest snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Globals {
    pub reverb: u8,
    pub channel_count: usize,
    pub master_volume: u8,
    pub samples_per_tick: u32,
    pub sample_rate: u32,
}

impl Globals {
    fn reverb_gain(&self) -> f32 {
        (self.reverb & 0x7F) as f32 / 128.0
    }
}

struct Voice {
    channel: SoundChannel,
    active: bool,
    /// Whether the start flag was set in the previous snapshot.
    start_seen: bool,
    envelope: Envelope,
    sampler: Sampler,
    /// Gain at the end of the previous frame.
    previous_gain: Stereo,
    /// Gain at the end of the next frame.
    gain: Stereo,
    /// One frame worth of the dry output, for echo.
    delay: Box<[Stereo]>,
}

impl Default for Voice {
    fn default() -> Self {
        Self {
            channel: SoundChannel::default(),
            active: false,
            start_seen: false,
            envelope: Envelope::default(),
            sampler: Sampler::default(),
            previous_gain: Stereo::SILENCE,
            gain: Stereo::SILENCE,
            delay: vec![Stereo::SILENCE; SAMPLES_PER_FRAME].into_boxed_slice(),
        }
    }
}

impl Voice {
    fn start(&mut self, channel: &SoundChannel, memory: &dyn MemoryModule) {
        let wave = Address(channel.wave_address.get());
        let mut header = WaveHeader::new_zeroed();
        if !memory.read(wave, header.as_mut_bytes()) {
            tracing::warn!(%wave, "wave header is not mapped, voice stays silent");
            self.active = false;
            return;
        }

        let compressed = channel.kind & TYPE_COMPRESSED != 0;
        tracing::debug!(
            %wave,
            samples = header.sample_count.get(),
            loop_position = header.loop_position.get(),
            compressed,
            "voice started"
        );

        self.sampler = Sampler::new(header, wave, compressed, memory);
        self.envelope = Envelope::default();
        self.active = true;
        self.previous_gain = Stereo::SILENCE;
        self.gain = Stereo::SILENCE;
        self.delay.fill(Stereo::SILENCE);
    }

    fn stop(&mut self) {
        self.active = false;
        self.previous_gain = Stereo::SILENCE;
        self.gain = Stereo::SILENCE;
    }

    fn target_gain(&self, master_volume: u8) -> Stereo {
        let volume = (self.envelope.volume() as u32 * (master_volume as u32 + 1)) >> 4;
        let side = |pan: u8| ((pan as u32 * volume) >> 8) as f32 / 255.0;

        Stereo {
            left: side(self.channel.volume_left),
            right: side(self.channel.volume_right),
        }
    }

    fn echoes(&self) -> bool {
        Status::from_bits(self.channel.status).echo()
            || self.envelope.stage() == envelope::Stage::Echo
    }

    /// Resample step, in input samples per output sample.
    fn step(&self, globals: &Globals) -> f32 {
        if self.channel.kind & TYPE_FIXED_FREQUENCY != 0 {
            globals.sample_rate as f32 / SAMPLE_RATE as f32
        } else {
            self.channel.frequency.get() as f32 / SAMPLE_RATE as f32
        }
    }

    fn render(
        &mut self,
        mix: &mut [Stereo],
        globals: &Globals,
        interpolation: Interpolation,
        memory: &dyn MemoryModule,
    ) {
        let step = self.step(globals);
        let echo_gain = if self.echoes() {
            globals.reverb_gain()
        } else {
            0.0
        };

        let len = mix.len() as f32;
        for (index, out) in mix.iter_mut().enumerate() {
            let t = (index + 1) as f32 / len;
            let gain_left = self.previous_gain.left + (self.gain.left - self.previous_gain.left) * t;
            let gain_right =
                self.previous_gain.right + (self.gain.right - self.previous_gain.right) * t;

            let sample = self.sampler.next(step, interpolation, memory);
            let dry = Stereo {
                left: sample * gain_left,
                right: sample * gain_right,
            };

            let delayed = std::mem::replace(&mut self.delay[index], dry);
            *out += dry + delayed * echo_gain;
        }

        self.previous_gain = self.gain;
        if self.sampler.finished() {
            tracing::trace!("voice ran out of samples");
            self.stop();
        }
    }
}

/// The MP2K mixing engine.
pub struct Engine {
    interpolation: Interpolation,
    engaged: bool,
    globals: Globals,
    voices: [Voice; MAX_CHANNELS],
    mix: Vec<Stereo>,
    queue: SampleProducer,
}

impl Engine {
    /// Creates an engine whose output queue holds `buffer_frames` frames.
    pub fn new(interpolation: Interpolation, buffer_frames: usize) -> (Self, SampleConsumer) {
        let (queue, consumer) = sample_queue(buffer_frames.max(1) * SAMPLES_PER_FRAME);
        let engine = Self {
            interpolation,
            engaged: false,
            globals: Globals::default(),
            voices: std::array::from_fn(|_| Voice::default()),
            mix: vec![Stereo::SILENCE; SAMPLES_PER_FRAME],
            queue,
        };

        (engine, consumer)
    }

    /// Whether a valid snapshot has been ingested since the last reset.
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// Number of voices currently producing sound.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Silences every voice and forgets about the driver.
    pub fn reset(&mut self) {
        self.engaged = false;
        self.globals = Globals::default();
        for voice in &mut self.voices {
            *voice = Voice::default();
        }
    }

    /// Takes the global parameters of a snapshot, leaving the voices alone.
    pub fn observe(&mut self, info: &SoundInfo) {
        self.globals = Globals {
            reverb: info.reverb,
            channel_count: (info.max_channels as usize).min(MAX_CHANNELS),
            master_volume: info.master_volume & 0xF,
            samples_per_tick: info.pcm_samples_per_vblank.get().max(0) as u32,
            sample_rate: info.pcm_sample_rate.get().max(0) as u32,
        };
    }

    /// Mirrors a driver snapshot and advances the voice envelopes by one tick.
    pub fn ingest(&mut self, info: &SoundInfo, memory: &dyn MemoryModule) {
        if !self.engaged {
            tracing::info!(
                sample_rate = info.pcm_sample_rate.get(),
                samples_per_tick = info.pcm_samples_per_vblank.get(),
                "mp2k engaged"
            );
        }

        self.engaged = true;
        self.observe(info);

        for (index, (voice, channel)) in self.voices.iter_mut().zip(&info.channels).enumerate() {
            let status = Status::from_bits(channel.status);
            if index >= self.globals.channel_count {
                voice.stop();
                voice.start_seen = false;
                continue;
            }

            if status.start() && !voice.start_seen {
                voice.channel = *channel;
                voice.start(channel, memory);
            }
            voice.start_seen = status.start();

            if !voice.active {
                continue;
            }

            if !status.on() {
                voice.stop();
                continue;
            }

            voice.channel = *channel;
            if status.stop() {
                voice.envelope.release();
            }

            let params = Params::from(channel);
            voice.envelope.tick(&params);
            if voice.envelope.is_off() {
                tracing::trace!(index, "voice envelope finished");
            }

            voice.gain = voice.target_gain(self.globals.master_volume);
        }
    }

    /// Mixes one frame from the mirrored state and appends it to the output queue. Returns
    /// whether the queue had room for it.
    pub fn render_frame(&mut self, memory: &dyn MemoryModule) -> bool {
        self.mix.fill(Stereo::SILENCE);
        for voice in self.voices.iter_mut().filter(|v| v.active) {
            voice.render(&mut self.mix, &self.globals, self.interpolation, memory);
            if voice.envelope.is_off() {
                voice.stop();
            }
        }

        for sample in &mut self.mix {
            *sample = sample.clamp();
        }

        let pushed = self.queue.push_frame(&self.mix);
        if !pushed {
            tracing::debug!("audio queue full, dropping frame");
        }

        pushed
    }

    /// The last frame mixed.
    pub fn last_frame(&self) -> &[Stereo] {
        &self.mix
    }
}
