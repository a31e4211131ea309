use std::path::PathBuf;

use celeste::system::audio::mp2k::sampler::Interpolation;
use clap::{Args, Parser, Subcommand};

fn parse_address(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(&digits.replace('_', ""), 16).map_err(|e| format!("bad address {s}: {e}"))
}

#[derive(Args, Debug)]
pub struct Dumps {
    /// Path to the cartridge ROM
    #[arg(long)]
    pub rom: Option<PathBuf>,
    /// Path to a dump of the internal work RAM (32 KiB at 0x03000000)
    #[arg(long)]
    pub iwram: PathBuf,
    /// Path to a dump of the external work RAM (256 KiB at 0x02000000)
    #[arg(long)]
    pub ewram: Option<PathBuf>,
    /// Address of the driver's SoundInfo, in hex
    ///
    /// If not given, IWRAM is searched for the driver's magic.
    #[arg(long, value_parser = parse_address)]
    pub sound_info: Option<u32>,
}

#[derive(Args, Debug)]
pub struct Render {
    #[command(flatten)]
    pub dumps: Dumps,
    /// Path of the WAV file to write
    #[arg(short, long, default_value = "out.wav")]
    pub output: PathBuf,
    /// How many video frames worth of audio to render
    #[arg(short, long, default_value_t = 300)]
    pub frames: u32,
    /// Interpolation used when resampling voices
    #[arg(long, default_value_t = Interpolation::Linear)]
    pub interpolation: Interpolation,
    /// Reload value of the sample timer
    ///
    /// Defaults to the one the driver would program for its sample rate.
    #[arg(long)]
    pub reload: Option<u16>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Renders the audio of a memory snapshot of a game using the MP2K sound driver
    Render(Render),
    /// Prints the state of the MP2K sound driver in a memory snapshot
    Inspect(Dumps),
}

/// agbtool: GBA timing core utilities
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,
}
