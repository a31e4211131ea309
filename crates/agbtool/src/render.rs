use celeste::audio_queue::ReadSample;
use celeste::system::audio::mp2k::{self, SoundInfo, Status};
use celeste::system::scheduler::Clocked;
use celeste::system::timer::{self, Control};
use celeste::system::{Config, Modules, System, audio};
use eyre_pretty::eyre::{Result, bail};

use crate::cli;
use crate::snapshot::Snapshot;

/// System cycles in a video frame: 228 lines of 1232 cycles.
const CYCLES_PER_FRAME: u64 = 280_896;

/// Reload value the driver programs into the sample timer.
fn sample_timer_reload(info: &SoundInfo) -> Result<u16> {
    let samples = info.pcm_samples_per_vblank.get();
    if samples <= 0 {
        bail!("driver reports {samples} samples per frame");
    }

    let period = CYCLES_PER_FRAME / samples as u64;
    if !(1..=0x1_0000).contains(&period) {
        bail!("sample period of {period} cycles does not fit a timer");
    }

    Ok((0x1_0000 - period) as u16)
}

pub fn render(args: &cli::Render) -> Result<()> {
    let snapshot = Snapshot::open(&args.dumps)?;
    let info = snapshot.sound_info()?;
    let reload = match args.reload {
        Some(reload) => reload,
        None => self::sample_timer_reload(&info)?,
    };

    let sound_info = snapshot.sound_info;
    let modules = Modules {
        memory: Box::new(snapshot.memory),
        ..Default::default()
    };

    let config = Config {
        interpolation: args.interpolation,
        audio_buffer_frames: 8,
        ..Default::default()
    };

    let (mut sys, consumer) = System::new(modules, config);
    timer::write_reload(&mut sys, 0, reload);
    timer::write_control(&mut sys, 0, Control::default().with_enable(true));
    audio::engage(&mut sys, sound_info);

    tracing::info!(
        reload = format_args!("{reload:#06X}"),
        rate = sys.audio.sample_rate(0),
        frames = args.frames,
        "rendering"
    );

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: mp2k::SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(&args.output, spec)?;
    let mut written = 0u64;
    for _ in 0..args.frames {
        sys.step(CYCLES_PER_FRAME);
        while let ReadSample::Sample(sample) = consumer.read_sample() {
            writer.write_sample(sample.left)?;
            writer.write_sample(sample.right)?;
            written += 1;
        }
    }

    writer.finalize()?;
    tracing::info!(written, output = %args.output.display(), "done");

    Ok(())
}

pub fn inspect(args: &cli::Dumps) -> Result<()> {
    let snapshot = Snapshot::open(args)?;
    let info = snapshot.sound_info()?;

    println!("sound info at {}", snapshot.sound_info);
    println!(
        "  channels: {}, master volume: {}, reverb: {:#04X}",
        info.max_channels, info.master_volume, info.reverb
    );
    println!(
        "  sample rate: {} Hz, {} samples per frame",
        info.pcm_sample_rate.get(),
        info.pcm_samples_per_vblank.get()
    );

    let count = (info.max_channels as usize).min(mp2k::MAX_CHANNELS);
    for (index, channel) in info.channels[..count].iter().enumerate() {
        let status = Status::from_bits(channel.status);
        if !status.on() {
            continue;
        }

        println!(
            "  [{index:2}] status {:#04X} kind {:#04X} vol {:3}/{:3} adsr {:3} {:3} {:3} {:3} freq {:6} wave {:#010X}",
            channel.status,
            channel.kind,
            channel.volume_left,
            channel.volume_right,
            channel.attack,
            channel.decay,
            channel.sustain,
            channel.release,
            channel.frequency.get(),
            channel.wave_address.get(),
        );
    }

    Ok(())
}
