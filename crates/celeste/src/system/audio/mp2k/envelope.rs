//! Per voice volume envelope, advanced once per driver tick.

use crate::system::audio::mp2k::SoundChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum Stage {
    #[default]
    Attack,
    Decay,
    Sustain,
    Release,
    /// Holding the echo volume after release.
    Echo,
    /// The voice is done.
    Off,
}

/// Envelope parameters of a channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct Params {
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    pub echo_volume: u8,
    pub echo_length: u8,
}

impl From<&SoundChannel> for Params {
    fn from(channel: &SoundChannel) -> Self {
        Self {
            attack: channel.attack,
            decay: channel.decay,
            sustain: channel.sustain,
            release: channel.release,
            echo_volume: channel.echo_volume,
            echo_length: channel.echo_length,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Envelope {
    stage: Stage,
    volume: u8,
    echo_remaining: u8,
}

#[inline(always)]
fn scale(volume: u8, factor: u8) -> u8 {
    ((volume as u16 * factor as u16) >> 8) as u8
}

impl Envelope {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_off(&self) -> bool {
        self.stage == Stage::Off
    }

    /// Starts releasing, unless already releasing or done.
    pub fn release(&mut self) {
        if matches!(self.stage, Stage::Attack | Stage::Decay | Stage::Sustain) {
            self.stage = Stage::Release;
        }
    }

    /// Either holds the echo volume or turns the voice off.
    fn finish(&mut self, params: &Params) {
        if params.echo_volume != 0 && params.echo_length != 0 {
            self.stage = Stage::Echo;
            self.volume = params.echo_volume;
            self.echo_remaining = params.echo_length;
        } else {
            self.stage = Stage::Off;
            self.volume = 0;
        }
    }

    pub fn tick(&mut self, params: &Params) {
        match self.stage {
            Stage::Attack => {
                self.volume = self.volume.saturating_add(params.attack);
                if self.volume == u8::MAX {
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.volume = scale(self.volume, params.decay);
                if self.volume <= params.sustain {
                    self.volume = params.sustain;
                    if self.volume == 0 {
                        self.finish(params);
                    } else {
                        self.stage = Stage::Sustain;
                    }
                }
            }
            Stage::Sustain => (),
            Stage::Release => {
                self.volume = scale(self.volume, params.release);
                if self.volume <= params.echo_volume {
                    self.finish(params);
                }
            }
            Stage::Echo => {
                self.echo_remaining = self.echo_remaining.saturating_sub(1);
                if self.echo_remaining == 0 {
                    self.stage = Stage::Off;
                    self.volume = 0;
                }
            }
            Stage::Off => (),
        }
    }
}
