//! Firmware image split into AVR memory spaces.

use std::path::Path;

use tracing::{debug, trace};

use crate::constants::*;
use crate::file::ElfFile;
use crate::header::ProgramHeader;
use crate::{ElfError, Result};

/// Memory space a load address belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Flash,
    Data,
    Eeprom,
    /// Fuses, lock bits, signature and anything else the simulator ignores.
    Other,
}

impl Region {
    /// Classify a physical (load) address using avr-gcc's offsets.
    pub const fn of(paddr: u32) -> Self {
        if paddr < AVR_FLASH_END {
            Self::Flash
        } else if paddr < AVR_EEPROM_OFFSET {
            Self::Data
        } else if paddr < AVR_EEPROM_END {
            Self::Eeprom
        } else {
            Self::Other
        }
    }
}

/// Firmware image ready to be handed to a simulator.
///
/// `flash` starts at address 0 and covers everything up to the end of the
/// highest flash segment, gaps zero-filled. Initialised `.data` is part of
/// it because avr-gcc stores the data initialisers in flash.
#[derive(Clone, Debug, Default)]
pub struct FirmwareImage {
    pub entry_point: u32,
    pub flash: Vec<u8>,
    pub eeprom: Vec<u8>,
    /// Size of the `.data` initialisers at the tail of flash.
    pub data_size: u32,
}

impl FirmwareImage {
    /// Read and parse a firmware file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let image = Self::parse(&data)?;
        debug!(
            path = %path.display(),
            flash = image.flash.len(),
            eeprom = image.eeprom.len(),
            data = image.data_size,
            "loaded firmware"
        );
        Ok(image)
    }

    /// Parse an AVR ELF executable.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let elf = ElfFile::parse(data)?;
        let loadable = Self::validate_segments(&elf, data)?;

        let mut flash = Vec::new();
        let mut eeprom = Vec::new();
        for phdr in &loadable {
            let start = phdr.offset as usize;
            let bytes = &data[start..start + phdr.filesz as usize];
            match Region::of(phdr.paddr) {
                Region::Flash => place(&mut flash, phdr.paddr, bytes),
                Region::Eeprom => place(&mut eeprom, phdr.paddr - AVR_EEPROM_OFFSET, bytes),
                region => {
                    trace!(paddr = format!("{:#x}", phdr.paddr), ?region, "skipping segment");
                }
            }
        }

        if flash.is_empty() {
            return Err(ElfError::NoLoadableSegments);
        }

        Ok(Self {
            entry_point: elf.entry_point,
            flash,
            eeprom,
            data_size: elf.section(".data").map_or(0, |s| s.size),
        })
    }

    /// Build an image from raw flash bytes (e.g. an objcopy'd `.bin`).
    pub fn from_flash(flash: Vec<u8>) -> Self {
        Self {
            entry_point: 0,
            flash,
            eeprom: Vec::new(),
            data_size: 0,
        }
    }

    /// Bytes programmed into flash. This is the size reported for a benchmark.
    pub fn flash_size(&self) -> u32 {
        u32::try_from(self.flash.len()).unwrap_or(u32::MAX)
    }

    /// End of executable code in flash (the `.data` initialisers follow it).
    pub fn code_end(&self) -> u32 {
        self.flash_size().saturating_sub(self.data_size)
    }

    /// Serialise as a minimal ELF executable with one segment per memory space.
    ///
    /// No section headers are written, so `data_size` does not survive.
    pub fn to_elf_bytes(&self) -> Vec<u8> {
        let mut segments: Vec<(u32, u32, &[u8])> = vec![(0, PF_R | PF_X, &self.flash)];
        if !self.eeprom.is_empty() {
            segments.push((AVR_EEPROM_OFFSET, PF_R | PF_W, &self.eeprom));
        }

        let phoff = ELF32_HEADER_SIZE;
        let mut offset = phoff + segments.len() * ELF32_PHDR_SIZE;

        let mut out = Vec::with_capacity(offset + self.flash.len() + self.eeprom.len());
        out.extend_from_slice(&ELF_MAGIC.to_le_bytes());
        out.extend_from_slice(&[ELF_CLASS_32, ELF_DATA_LSB, ELF_VERSION_CURRENT]);
        out.resize(16, 0);
        out.extend_from_slice(&ELF_TYPE_EXEC.to_le_bytes());
        out.extend_from_slice(&ELF_MACHINE_AVR.to_le_bytes());
        out.extend_from_slice(&u32::from(ELF_VERSION_CURRENT).to_le_bytes());
        out.extend_from_slice(&self.entry_point.to_le_bytes());
        out.extend_from_slice(&(phoff as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // e_shoff
        out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        out.extend_from_slice(&(ELF32_HEADER_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(ELF32_PHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&(segments.len() as u16).to_le_bytes());
        out.extend_from_slice(&(ELF32_SHDR_SIZE as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

        for &(addr, flags, bytes) in &segments {
            let len = bytes.len() as u32;
            for word in [PT_LOAD, offset as u32, addr, addr, len, len, flags, 1] {
                out.extend_from_slice(&word.to_le_bytes());
            }
            offset += bytes.len();
        }
        for &(_, _, bytes) in &segments {
            out.extend_from_slice(bytes);
        }
        out
    }

    fn validate_segments(elf: &ElfFile, file_data: &[u8]) -> Result<Vec<ProgramHeader>> {
        let mut loadable = Vec::new();

        for phdr in &elf.program_headers {
            // .bss and .noinit have no file bytes and live in data space only.
            if phdr.p_type != PT_LOAD || phdr.filesz == 0 {
                continue;
            }

            let end = phdr.offset as usize + phdr.filesz as usize;
            if end > file_data.len() {
                return Err(ElfError::SegmentBeyondFile);
            }

            let load_end = phdr
                .paddr
                .checked_add(phdr.filesz)
                .ok_or(ElfError::RegionOverflow("load address"))?;
            match Region::of(phdr.paddr) {
                Region::Flash if load_end > AVR_FLASH_END => {
                    return Err(ElfError::RegionOverflow("flash"));
                }
                Region::Eeprom if load_end > AVR_EEPROM_END => {
                    return Err(ElfError::RegionOverflow("eeprom"));
                }
                _ => {}
            }

            loadable.push(phdr.clone());
        }

        if loadable.is_empty() {
            return Err(ElfError::NoLoadableSegments);
        }
        if loadable.len() > MAX_SEGMENTS {
            return Err(ElfError::TooManySegments);
        }

        for (i, a) in loadable.iter().enumerate() {
            let a_end = a.paddr + a.filesz;
            for b in loadable.iter().skip(i + 1) {
                let b_end = b.paddr + b.filesz;
                if a.paddr < b_end && b.paddr < a_end {
                    return Err(ElfError::OverlappingSegments);
                }
            }
        }

        Ok(loadable)
    }
}

/// Copy `bytes` into `buf` at `addr`, growing and zero-filling as needed.
fn place(buf: &mut Vec<u8>, addr: u32, bytes: &[u8]) {
    let start = addr as usize;
    let end = start + bytes.len();
    if buf.len() < end {
        buf.resize(end, 0);
    }
    buf[start..end].copy_from_slice(bytes);
}
