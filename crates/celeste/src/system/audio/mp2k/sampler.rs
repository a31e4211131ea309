//! Wave data fetching and resampling.

use crate::Address;
use crate::modules::memory::MemoryModule;
use crate::system::audio::mp2k::WaveHeader;

/// Samples per block of compressed wave data.
const BLOCK_SAMPLES: u32 = 64;
/// Bytes per block of compressed wave data: one raw sample followed by 4-bit deltas.
const BLOCK_LEN: u32 = 33;
/// Wave status flag for looping samples.
const WAVE_LOOP: u16 = 0x4000;

const DPCM_LUT: [i8; 16] = [0, 1, 4, 9, 16, 25, 36, 49, -64, -49, -36, -25, -16, -9, -4, -1];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Interpolation {
    /// Uses the 2 samples around the read position.
    #[default]
    Linear,
    /// Catmull-Rom spline over the 4 samples around the read position.
    Cubic,
}

impl Interpolation {
    /// Interpolates between `history[1]` and `history[2]`, with `t` in `0.0..1.0`.
    #[inline(always)]
    pub fn apply(self, history: &[f32; 4], t: f32) -> f32 {
        let [p0, p1, p2, p3] = *history;
        match self {
            Self::Linear => p1 + (p2 - p1) * t,
            Self::Cubic => {
                let a = -0.5 * p0 + 1.5 * p1 - 1.5 * p2 + 0.5 * p3;
                let b = p0 - 2.5 * p1 + 2.0 * p2 - 0.5 * p3;
                let c = -0.5 * p0 + 0.5 * p2;
                ((a * t + b) * t + c) * t + p1
            }
        }
    }
}

/// Decodes a block of compressed wave data.
fn decode_block(raw: &[u8; BLOCK_LEN as usize]) -> [i8; BLOCK_SAMPLES as usize] {
    let mut out = [0i8; BLOCK_SAMPLES as usize];
    out[0] = raw[0] as i8;

    for i in 1..BLOCK_SAMPLES as usize {
        let byte = raw[1 + i / 2];
        let nibble = if i % 2 == 1 { byte & 0xF } else { byte >> 4 };
        out[i] = out[i - 1].wrapping_add(DPCM_LUT[nibble as usize]);
    }

    out
}

#[derive(Debug, Clone, Default)]
pub struct Sampler {
    compressed: bool,
    /// Index of the sample in `history[1]`.
    position: u32,
    /// Fractional read position between `history[1]` and `history[2]`.
    phase: f32,
    /// Samples at `position - 1 ..= position + 2`.
    history: [f32; 4],
    wave: WaveHeader,
    /// Address of the first sample.
    data: Address,
    /// Last decoded block of compressed data.
    block: Option<(u32, [i8; BLOCK_SAMPLES as usize])>,
    finished: bool,
}

impl Sampler {
    /// Creates a sampler reading the wave whose header is at `wave`.
    pub fn new(header: WaveHeader, wave: Address, compressed: bool, memory: &dyn MemoryModule) -> Self {
        let mut sampler = Self {
            compressed,
            position: 0,
            phase: 0.0,
            history: [0.0; 4],
            wave: header,
            data: wave + size_of::<WaveHeader>() as u32,
            block: None,
            finished: header.sample_count.get() == 0,
        };

        sampler.history[1] = sampler.fetch(0, memory);
        sampler.history[2] = sampler.fetch(1, memory);
        sampler.history[3] = sampler.fetch(2, memory);
        sampler
    }

    pub fn looping(&self) -> bool {
        self.wave.status.get() & WAVE_LOOP != 0
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    /// Maps a sample index into the wave, following the loop. `None` if past the end.
    fn resolve(&self, index: u64) -> Option<u32> {
        let count = self.wave.sample_count.get() as u64;
        let loop_start = self.wave.loop_position.get() as u64;
        if index < count {
            Some(index as u32)
        } else if self.looping() && loop_start < count {
            Some((loop_start + (index - count) % (count - loop_start)) as u32)
        } else {
            None
        }
    }

    fn fetch(&mut self, index: u64, memory: &dyn MemoryModule) -> f32 {
        let Some(index) = self.resolve(index) else {
            return 0.0;
        };

        let sample = if self.compressed {
            let block = index / BLOCK_SAMPLES;
            let decoded = match self.block {
                Some((cached, decoded)) if cached == block => decoded,
                _ => {
                    let mut raw = [0; BLOCK_LEN as usize];
                    if !memory.read(self.data + block * BLOCK_LEN, &mut raw) {
                        tracing::warn!(data = %self.data, block, "compressed wave data is unmapped");
                    }

                    let decoded = self::decode_block(&raw);
                    self.block = Some((block, decoded));
                    decoded
                }
            };

            decoded[(index % BLOCK_SAMPLES) as usize]
        } else {
            memory
                .read_primitive::<u8>(self.data + index)
                .map_or(0, |b| b as i8)
        };

        sample as f32 / 128.0
    }

    /// Produces the next output sample and advances the read position by `step` input samples.
    pub fn next(&mut self, step: f32, interpolation: Interpolation, memory: &dyn MemoryModule) -> f32 {
        if self.finished {
            return 0.0;
        }

        let out = interpolation.apply(&self.history, self.phase);
        self.phase += step;
        if self.phase < 1.0 {
            return out;
        }

        // skip every whole sample at once, only the ones that end up in the history are fetched
        let whole = self.phase.floor();
        self.phase -= whole;

        let target = self.position as u64 + whole as u64;
        let Some(position) = self.resolve(target) else {
            self.finished = true;
            return out;
        };

        self.position = position;
        let kept = 4usize.saturating_sub(whole as usize);
        self.history.rotate_left(4 - kept);
        for slot in kept..4 {
            self.history[slot] = self.fetch(target + slot as u64 - 1, memory);
        }

        out
    }
}
