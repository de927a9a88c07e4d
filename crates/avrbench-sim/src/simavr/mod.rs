//! simavr backend.
//!
//! Firmware is parsed in Rust and handed to simavr as raw flash/EEPROM
//! bytes; only the core itself runs in C.

mod api;
mod shim;

use std::ffi::{CString, c_char, c_void};
use std::path::Path;
use std::ptr::NonNull;
use std::rc::Rc;

use avrbench_elf::FirmwareImage;
use tracing::{debug, error, trace};

use crate::{Mcu, PinChange, PinHandler, PinId, SimError};

pub use shim::{ShimBuildConfig, ShimLibrary};

/// Instructions executed per `advance`.
pub const DEFAULT_STEPS_PER_ADVANCE: u32 = 1024;

/// Parameters for constructing a simulated MCU.
#[derive(Clone, Debug)]
pub struct SimavrOptions {
    /// simavr core name, e.g. `atmega328p`.
    pub mcu: String,
    pub frequency_hz: u32,
    /// Let simavr print its own trace output.
    pub engine_log: bool,
    pub steps_per_advance: u32,
}

impl SimavrOptions {
    pub fn new(mcu: impl Into<String>, frequency_hz: u32) -> Self {
        Self {
            mcu: mcu.into(),
            frequency_hz,
            engine_log: false,
            steps_per_advance: DEFAULT_STEPS_PER_ADVANCE,
        }
    }
}

struct Subscription {
    pin: PinId,
    handler: PinHandler,
}

/// A simavr core with firmware loaded.
pub struct SimavrMcu {
    handle: NonNull<c_void>,
    firmware_size: u32,
    steps_per_advance: u32,
    /// Owned; freed in `Drop` after the core is closed.
    subscriptions: Vec<NonNull<Subscription>>,
    shim: Rc<ShimLibrary>,
}

impl SimavrMcu {
    /// Load a firmware file and construct the core.
    pub fn load(
        shim: Rc<ShimLibrary>,
        firmware_path: impl AsRef<Path>,
        options: &SimavrOptions,
    ) -> Result<Self, SimError> {
        let path = firmware_path.as_ref();
        if !path.exists() {
            error!(path = %path.display(), "firmware not found");
            return Err(SimError::FirmwareNotFound(path.to_path_buf()));
        }
        let image = FirmwareImage::load(path)?;
        Self::from_image(shim, &image, options)
    }

    /// Construct the core from an already parsed image.
    pub fn from_image(
        shim: Rc<ShimLibrary>,
        image: &FirmwareImage,
        options: &SimavrOptions,
    ) -> Result<Self, SimError> {
        let mcu = CString::new(options.mcu.as_str())
            .map_err(|_| SimError::UnknownMcu(options.mcu.clone()))?;
        let log_level = if options.engine_log {
            api::LOG_TRACE
        } else {
            api::LOG_NONE
        };

        let mut status = api::OPEN_OK;
        let mut capacity = 0u32;
        // simavr copies flash and EEPROM contents, so `image` may be dropped afterwards.
        let raw = unsafe {
            (shim.api.open)(
                mcu.as_ptr(),
                options.frequency_hz,
                image.flash.as_ptr(),
                image.flash_size(),
                image.code_end(),
                image.eeprom.as_ptr(),
                u32::try_from(image.eeprom.len()).unwrap_or(u32::MAX),
                log_level,
                &raw mut status,
                &raw mut capacity,
            )
        };

        let handle = match NonNull::new(raw) {
            Some(handle) if status == api::OPEN_OK => handle,
            _ => return Err(open_error(status, capacity, image, &options.mcu)),
        };

        debug!(
            mcu = %options.mcu,
            frequency = options.frequency_hz,
            flash = image.flash_size(),
            "constructed simavr core"
        );

        Ok(Self {
            handle,
            firmware_size: image.flash_size(),
            steps_per_advance: options.steps_per_advance.max(1),
            subscriptions: Vec::new(),
            shim,
        })
    }
}

/// Translate a failed `avrbench_shim_open` status.
fn open_error(status: i32, capacity: u32, image: &FirmwareImage, mcu: &str) -> SimError {
    match status {
        api::OPEN_UNKNOWN_MCU => SimError::UnknownMcu(mcu.to_string()),
        api::OPEN_FLASH_TOO_LARGE => SimError::FirmwareTooLarge {
            size: image.flash_size(),
            capacity,
        },
        api::OPEN_EEPROM_REJECTED => SimError::EepromRejected {
            size: u32::try_from(image.eeprom.len()).unwrap_or(u32::MAX),
        },
        api::OPEN_INIT_FAILED => SimError::InitFailed(mcu.to_string()),
        other => {
            error!(mcu, status = other, "unexpected shim open status");
            SimError::InitFailed(mcu.to_string())
        }
    }
}

/// Entry point for pin notifications coming back from C.
unsafe extern "C" fn deliver_pin_change(ctx: *mut c_void, value: u32, cycle: u64) {
    // SAFETY: `ctx` is a `Subscription` leaked in `subscribe` and only freed
    // after the core that calls us has been closed.
    let sub = unsafe { &mut *ctx.cast::<Subscription>() };
    trace!(pin = %sub.pin, value, cycle, "pin change");
    (sub.handler)(PinChange {
        pin: sub.pin,
        value,
        cycle,
    });
}

impl Mcu for SimavrMcu {
    fn advance(&mut self) -> Result<(), SimError> {
        let state = unsafe { (self.shim.api.run)(self.handle.as_ptr(), self.steps_per_advance) };
        match state {
            api::RUN_RUNNING => Ok(()),
            api::RUN_DONE => Err(SimError::Halted {
                cycle: self.cycle(),
            }),
            api::RUN_CRASHED => Err(SimError::Crashed {
                cycle: self.cycle(),
            }),
            other => {
                error!(state = other, "unknown run state from shim");
                Err(SimError::Crashed {
                    cycle: self.cycle(),
                })
            }
        }
    }

    fn cycle(&self) -> u64 {
        unsafe { (self.shim.api.cycle)(self.handle.as_ptr()) }
    }

    fn firmware_size(&self) -> u32 {
        self.firmware_size
    }

    fn subscribe(&mut self, pin: PinId, handler: PinHandler) -> Result<(), SimError> {
        let sub = NonNull::from(Box::leak(Box::new(Subscription { pin, handler })));
        let rc = unsafe {
            (self.shim.api.subscribe)(
                self.handle.as_ptr(),
                pin.port() as c_char,
                pin.bit(),
                deliver_pin_change,
                sub.as_ptr().cast::<c_void>(),
            )
        };
        if rc != 0 {
            // SAFETY: the shim did not keep the pointer.
            drop(unsafe { Box::from_raw(sub.as_ptr()) });
            return Err(SimError::PinUnavailable(pin));
        }
        debug!(%pin, "subscribed");
        self.subscriptions.push(sub);
        Ok(())
    }
}

impl Drop for SimavrMcu {
    fn drop(&mut self) {
        unsafe { (self.shim.api.close)(self.handle.as_ptr()) };
        for sub in self.subscriptions.drain(..) {
            // SAFETY: created by `Box::leak` in `subscribe`; the core is gone.
            drop(unsafe { Box::from_raw(sub.as_ptr()) });
        }
    }
}
