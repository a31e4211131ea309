//! Memory snapshots of a running game.

use celeste::Address;
use celeste::modules::memory::MappedMemory;
use celeste::system::audio::mp2k::{self, SoundInfo};
use eyre_pretty::eyre::{Result, WrapErr, bail};
use zerocopy::FromBytes;

use crate::cli::Dumps;

const ROM: Address = Address(0x0800_0000);
const IWRAM: Address = Address(0x0300_0000);
const EWRAM: Address = Address(0x0200_0000);

const IWRAM_LEN: usize = 0x8000;
const EWRAM_LEN: usize = 0x4_0000;

/// First bytes of an idle driver's `SoundInfo`.
const MAGIC: [u8; 4] = 0x6873_6D53u32.to_le_bytes();

pub struct Snapshot {
    pub memory: MappedMemory,
    pub sound_info: Address,
}

fn load(path: &std::path::Path, max_len: Option<usize>) -> Result<Vec<u8>> {
    let data = std::fs::read(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    if let Some(max_len) = max_len
        && data.len() > max_len
    {
        bail!("{} is {} bytes long, expected at most {max_len}", path.display(), data.len());
    }

    Ok(data)
}

/// Looks for a plausible `SoundInfo` on a word boundary of `iwram`.
fn find_sound_info(iwram: &[u8]) -> Option<Address> {
    iwram
        .chunks_exact(4)
        .enumerate()
        .filter(|(_, word)| *word == MAGIC)
        .map(|(index, _)| index * 4)
        .find(|&offset| {
            SoundInfo::read_from_prefix(&iwram[offset..])
                .is_ok_and(|(info, _)| info.max_channels as usize <= mp2k::MAX_CHANNELS)
        })
        .map(|offset| IWRAM + offset as u32)
}

impl Snapshot {
    pub fn open(dumps: &Dumps) -> Result<Self> {
        let mut memory = MappedMemory::default();
        if let Some(path) = &dumps.rom {
            memory.map(ROM, self::load(path, None)?);
        }

        if let Some(path) = &dumps.ewram {
            memory.map(EWRAM, self::load(path, Some(EWRAM_LEN))?);
        }

        let iwram = self::load(&dumps.iwram, Some(IWRAM_LEN))?;
        let sound_info = match dumps.sound_info {
            Some(addr) => Address(addr),
            None => match self::find_sound_info(&iwram) {
                Some(addr) => {
                    tracing::info!(%addr, "found sound info");
                    addr
                }
                None => bail!("no sound info found in IWRAM, pass its address explicitly"),
            },
        };

        memory.map(IWRAM, iwram);
        Ok(Self { memory, sound_info })
    }

    /// Reads the driver state.
    pub fn sound_info(&self) -> Result<SoundInfo> {
        Ok(mp2k::read_snapshot(&self.memory, self.sound_info)?)
    }
}
