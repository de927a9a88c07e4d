//! Simulator error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::PinId;

/// Simulator error type.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("firmware not found: {}", .0.display())]
    FirmwareNotFound(PathBuf),

    #[error("invalid firmware: {0}")]
    Firmware(#[from] avrbench_elf::ElfError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown MCU: {0}")]
    UnknownMcu(String),

    #[error("simavr failed to initialise {0}")]
    InitFailed(String),

    #[error("firmware needs {size} bytes of flash but the MCU has {capacity}")]
    FirmwareTooLarge { size: u32, capacity: u32 },

    #[error("simavr rejected {size} bytes of EEPROM data")]
    EepromRejected { size: u32 },

    #[error("failed to load library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    #[error("failed to find symbol '{0}': {1}")]
    SymbolNotFound(String, libloading::Error),

    #[error("failed to build simavr shim: {0}")]
    ShimBuild(String),

    #[error("invalid pin '{0}': expected a port letter A-L followed by a bit 0-7")]
    InvalidPin(String),

    #[error("pin {0} does not exist on this MCU")]
    PinUnavailable(PinId),

    #[error("simulated core crashed at cycle {cycle}")]
    Crashed { cycle: u64 },

    #[error("firmware halted at cycle {cycle} without signalling stop")]
    Halted { cycle: u64 },
}
