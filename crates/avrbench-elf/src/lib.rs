//! ELF firmware reader for AVR benchmark images.
//!
//! Splits an avr-gcc executable into the flash and EEPROM contents a
//! simulator needs, and reports the programmed flash size.

mod constants;
mod file;
mod header;
mod image;

pub use constants::*;
pub use file::*;
pub use header::*;
pub use image::*;

use thiserror::Error;

/// ELF parsing errors.
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ELF data too small")]
    TooSmall,
    #[error("Invalid ELF magic number")]
    InvalidMagic,
    #[error("Only little-endian ELF supported")]
    NotLittleEndian,
    #[error("Unsupported ELF class: {0} (AVR images are ELF32)")]
    UnsupportedClass(u8),
    #[error("Not an AVR executable: e_machine = {0}")]
    WrongMachine(u16),
    #[error("Section header out of bounds")]
    SectionOutOfBounds,
    #[error("Program header out of bounds")]
    ProgramOutOfBounds,
    #[error("Segment extends beyond file")]
    SegmentBeyondFile,
    #[error("Segment does not fit in {0}")]
    RegionOverflow(&'static str),
    #[error("No loadable flash segments found")]
    NoLoadableSegments,
    #[error("Too many loadable segments")]
    TooManySegments,
    #[error("Overlapping load address ranges")]
    OverlappingSegments,
}

pub type Result<T> = std::result::Result<T, ElfError>;
