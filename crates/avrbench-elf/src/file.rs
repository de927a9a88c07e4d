//! ELF file parser.

use crate::constants::*;
use crate::header::*;
use crate::{ElfError, Result};

#[inline]
fn read_le16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn read_le32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Parsed AVR ELF file.
#[derive(Clone, Debug)]
pub struct ElfFile {
    pub entry_point: u32,
    pub sections: Vec<LoadedSection>,
    pub program_headers: Vec<ProgramHeader>,
}

impl ElfFile {
    /// Parse ELF file from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Self::parse_header(data)?;
        let program_headers = Self::parse_program_headers(data, &header)?;
        let all_sections = Self::parse_all_sections(data, &header)?;
        let shstrtab = all_sections.get(header.shstrndx as usize);
        let sections = Self::load_allocatable_sections(data, &all_sections, shstrtab);

        Ok(Self {
            entry_point: header.entry,
            sections,
            program_headers,
        })
    }

    /// Look up an allocatable section by name.
    pub fn section(&self, name: &str) -> Option<&LoadedSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn parse_header(data: &[u8]) -> Result<ElfHeader> {
        if data.len() < ELF32_HEADER_SIZE {
            return Err(ElfError::TooSmall);
        }

        if read_le32(data, 0) != ELF_MAGIC {
            return Err(ElfError::InvalidMagic);
        }

        let class = data[4];
        if class != ELF_CLASS_32 {
            return Err(ElfError::UnsupportedClass(class));
        }
        if data[5] != ELF_DATA_LSB {
            return Err(ElfError::NotLittleEndian);
        }

        let machine = read_le16(data, 18);
        if machine != ELF_MACHINE_AVR {
            return Err(ElfError::WrongMachine(machine));
        }

        Ok(ElfHeader {
            class,
            data: data[5],
            version: data[6],
            machine,
            entry: read_le32(data, 24),
            phoff: read_le32(data, 28),
            shoff: read_le32(data, 32),
            flags: read_le32(data, 36),
            phentsize: read_le16(data, 42),
            phnum: read_le16(data, 44),
            shentsize: read_le16(data, 46),
            shnum: read_le16(data, 48),
            shstrndx: read_le16(data, 50),
        })
    }

    fn parse_program_headers(data: &[u8], header: &ElfHeader) -> Result<Vec<ProgramHeader>> {
        (0..header.phnum as usize)
            .map(|i| {
                let offset = header.phoff as usize + i * header.phentsize as usize;
                Self::parse_program_header(data, offset)
            })
            .collect()
    }

    fn parse_program_header(data: &[u8], offset: usize) -> Result<ProgramHeader> {
        if offset + ELF32_PHDR_SIZE > data.len() {
            return Err(ElfError::ProgramOutOfBounds);
        }
        Ok(ProgramHeader {
            p_type: read_le32(data, offset),
            offset: read_le32(data, offset + 4),
            vaddr: read_le32(data, offset + 8),
            paddr: read_le32(data, offset + 12),
            filesz: read_le32(data, offset + 16),
            memsz: read_le32(data, offset + 20),
            flags: read_le32(data, offset + 24),
            align: read_le32(data, offset + 28),
        })
    }

    fn parse_all_sections(data: &[u8], header: &ElfHeader) -> Result<Vec<SectionHeader>> {
        (0..header.shnum as usize)
            .map(|i| {
                let offset = header.shoff as usize + i * header.shentsize as usize;
                Self::parse_section_header(data, offset)
            })
            .collect()
    }

    fn parse_section_header(data: &[u8], offset: usize) -> Result<SectionHeader> {
        if offset + ELF32_SHDR_SIZE > data.len() {
            return Err(ElfError::SectionOutOfBounds);
        }
        Ok(SectionHeader {
            name: read_le32(data, offset),
            sh_type: read_le32(data, offset + 4),
            flags: read_le32(data, offset + 8),
            addr: read_le32(data, offset + 12),
            offset: read_le32(data, offset + 16),
            size: read_le32(data, offset + 20),
            link: read_le32(data, offset + 24),
            info: read_le32(data, offset + 28),
            addralign: read_le32(data, offset + 32),
            entsize: read_le32(data, offset + 36),
        })
    }

    fn load_allocatable_sections(
        data: &[u8],
        sections: &[SectionHeader],
        shstrtab: Option<&SectionHeader>,
    ) -> Vec<LoadedSection> {
        sections
            .iter()
            .filter(|s| s.flags & SHF_ALLOC != 0)
            .filter(|s| matches!(s.sh_type, SHT_PROGBITS | SHT_NOBITS))
            .map(|section| {
                let name = shstrtab.map_or_else(
                    || "unknown".to_string(),
                    |strtab| extract_string(data, strtab.offset as usize, section.name as usize),
                );
                LoadedSection {
                    name,
                    addr: section.addr,
                    size: section.size,
                    sh_type: section.sh_type,
                }
            })
            .collect()
    }
}

fn extract_string(data: &[u8], strtab_offset: usize, string_offset: usize) -> String {
    let start = strtab_offset + string_offset;
    let Some(bytes) = data.get(start..) else {
        return String::new();
    };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
