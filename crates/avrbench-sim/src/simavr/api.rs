//! Shim API loading and types.

use std::ffi::{c_char, c_void};

use libloading::os::unix::{Library, Symbol};
use tracing::error;

use crate::SimError;

/// Called by the shim for every level change on a subscribed pin.
pub type PinCallback = unsafe extern "C" fn(ctx: *mut c_void, value: u32, cycle: u64);

pub type ShimOpen = unsafe extern "C" fn(
    mcu: *const c_char,
    frequency: u32,
    flash: *const u8,
    flash_len: u32,
    code_end: u32,
    eeprom: *const u8,
    eeprom_len: u32,
    log_level: u8,
    status: *mut i32,
    capacity: *mut u32,
) -> *mut c_void;
pub type ShimRun = unsafe extern "C" fn(handle: *mut c_void, steps: u32) -> i32;
pub type ShimCycle = unsafe extern "C" fn(handle: *mut c_void) -> u64;
pub type ShimSubscribe = unsafe extern "C" fn(
    handle: *mut c_void,
    port: c_char,
    bit: u8,
    callback: PinCallback,
    ctx: *mut c_void,
) -> i32;
pub type ShimClose = unsafe extern "C" fn(handle: *mut c_void);

/// `status` values written by `avrbench_shim_open`.
pub const OPEN_OK: i32 = 0;
pub const OPEN_UNKNOWN_MCU: i32 = -1;
pub const OPEN_INIT_FAILED: i32 = -2;
/// Flash image larger than the chip; `capacity` holds the flash size.
pub const OPEN_FLASH_TOO_LARGE: i32 = -3;
/// simavr refused the EEPROM contents.
pub const OPEN_EEPROM_REJECTED: i32 = -4;

/// Values returned by `avrbench_shim_run`.
pub const RUN_RUNNING: i32 = 0;
pub const RUN_DONE: i32 = 1;
pub const RUN_CRASHED: i32 = 2;

/// simavr log levels (`LOG_NONE` .. `LOG_TRACE`).
pub const LOG_NONE: u8 = 0;
pub const LOG_TRACE: u8 = 4;

/// Entry points exported by the compiled shim.
#[derive(Clone, Copy)]
pub struct ShimApi {
    pub open: ShimOpen,
    pub run: ShimRun,
    pub cycle: ShimCycle,
    pub subscribe: ShimSubscribe,
    pub close: ShimClose,
}

impl ShimApi {
    pub unsafe fn load(lib: &Library) -> Result<Self, SimError> {
        unsafe {
            Ok(Self {
                open: load_symbol(lib, b"avrbench_shim_open", "avrbench_shim_open")?,
                run: load_symbol(lib, b"avrbench_shim_run", "avrbench_shim_run")?,
                cycle: load_symbol(lib, b"avrbench_shim_cycle", "avrbench_shim_cycle")?,
                subscribe: load_symbol(lib, b"avrbench_shim_subscribe", "avrbench_shim_subscribe")?,
                close: load_symbol(lib, b"avrbench_shim_close", "avrbench_shim_close")?,
            })
        }
    }
}

pub unsafe fn load_symbol<T: Copy>(
    lib: &Library,
    symbol: &'static [u8],
    label: &'static str,
) -> Result<T, SimError> {
    unsafe {
        let sym: Symbol<T> = lib.get(symbol).map_err(|e| {
            error!(symbol = label, "symbol not found in shim");
            SimError::SymbolNotFound(label.to_string(), e)
        })?;
        Ok(*sym)
    }
}
