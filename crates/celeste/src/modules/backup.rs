//! Backup memory module interface.

use easyerr::Error;

/// Size of battery backed SRAM, in bytes.
pub const SRAM_LEN: usize = 0x8000;
/// Address mask of battery backed SRAM.
pub const SRAM_MASK: u32 = 0x7FFF;

/// Trait for backup (save) memory modules. Accesses are always a single byte wide.
pub trait BackupModule {
    fn read(&mut self, addr: u32) -> u8;
    fn write(&mut self, addr: u32, value: u8);
}

/// An implementation of [`BackupModule`] with no memory present. Reads return open bus.
#[derive(Debug, Clone, Copy)]
pub struct NopBackupModule;

impl BackupModule for NopBackupModule {
    fn read(&mut self, _: u32) -> u8 {
        0xFF
    }

    fn write(&mut self, addr: u32, value: u8) {
        tracing::trace!(addr, value, "write to missing backup memory");
    }
}

#[derive(Debug, Error)]
pub enum SramError {
    #[error("sram image must be 32768 bytes long, got {f0}")]
    Size(usize),
}

/// Battery backed SRAM.
pub struct Sram {
    data: Box<[u8; SRAM_LEN]>,
}

impl Default for Sram {
    fn default() -> Self {
        Self {
            data: Box::new([0xFF; SRAM_LEN]),
        }
    }
}

impl Sram {
    /// Creates SRAM with the contents of an existing image.
    pub fn from_image(image: &[u8]) -> Result<Self, SramError> {
        let data: Box<[u8; SRAM_LEN]> = image
            .to_vec()
            .into_boxed_slice()
            .try_into()
            .map_err(|_| SramError::Size(image.len()))?;

        Ok(Self { data })
    }

    /// The current contents of the SRAM.
    pub fn image(&self) -> &[u8] {
        self.data.as_slice()
    }
}

impl BackupModule for Sram {
    #[inline(always)]
    fn read(&mut self, addr: u32) -> u8 {
        self.data[(addr & SRAM_MASK) as usize]
    }

    #[inline(always)]
    fn write(&mut self, addr: u32, value: u8) {
        self.data[(addr & SRAM_MASK) as usize] = value;
    }
}
