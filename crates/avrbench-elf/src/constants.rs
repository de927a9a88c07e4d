//! ELF and avr-gcc memory map constants.

// ELF header constants
pub const ELF_MAGIC: u32 = 0x464C_457F; // 0x7F 'E' 'L' 'F'
pub const ELF_CLASS_32: u8 = 1;
pub const ELF_DATA_LSB: u8 = 1;
pub const ELF_VERSION_CURRENT: u8 = 1;
pub const ELF_TYPE_EXEC: u16 = 2;
pub const ELF_MACHINE_AVR: u16 = 83;

pub const ELF32_HEADER_SIZE: usize = 52;
pub const ELF32_PHDR_SIZE: usize = 32;
pub const ELF32_SHDR_SIZE: usize = 40;

// Program header constants
pub const PT_LOAD: u32 = 1;

// Program header flags
pub const PF_X: u32 = 0x1;
pub const PF_W: u32 = 0x2;
pub const PF_R: u32 = 0x4;

// Section header constants
pub const SHT_PROGBITS: u32 = 1;
pub const SHT_NOBITS: u32 = 8;

pub const SHF_ALLOC: u32 = 0x2;

// avr-gcc places each memory space at a fixed offset in the load address space.
pub const AVR_FLASH_END: u32 = 0x80_0000;
pub const AVR_DATA_OFFSET: u32 = 0x80_0000;
pub const AVR_EEPROM_OFFSET: u32 = 0x81_0000;
pub const AVR_EEPROM_END: u32 = 0x82_0000;

// Limits
pub const MAX_SEGMENTS: usize = 16;
