//! Run configuration.

use std::path::PathBuf;

use avrbench_sim::PinId;

use crate::{Error, Result};

/// Clock the benchmarks are simulated at unless overridden.
pub const DEFAULT_FREQUENCY_HZ: u32 = 8_000_000;
/// Firmware images are named `<mode>-<benchmark>.avr`.
pub const FIRMWARE_EXTENSION: &str = "avr";
/// Results for an MCU accumulate in `result-<mcu>`.
pub const RESULT_PREFIX: &str = "result-";

/// How the result file is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Add one line per run, keeping earlier results.
    #[default]
    Append,
    /// Start the file over.
    Truncate,
}

/// Everything needed to run one benchmark.
#[derive(Clone, Debug)]
pub struct RunConfig {
    /// simavr core name, also used to key the result file.
    pub mcu: String,
    /// Build mode or tag, e.g. `opt` or `size`.
    pub mode: String,
    pub benchmark: String,
    pub frequency_hz: u32,
    pub begin_pin: PinId,
    pub stop_pin: PinId,
    pub firmware_dir: PathBuf,
    pub output_dir: PathBuf,
    pub write_mode: WriteMode,
    /// Give up if the firmware has not signalled stop by this cycle.
    pub max_cycles: Option<u64>,
}

impl RunConfig {
    /// Create a configuration with defaults for everything but the three names.
    pub fn new(
        mcu: impl Into<String>,
        mode: impl Into<String>,
        benchmark: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            mcu: mcu.into(),
            mode: mode.into(),
            benchmark: benchmark.into(),
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            begin_pin: PinId::BEGIN,
            stop_pin: PinId::STOP,
            firmware_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            write_mode: WriteMode::Append,
            max_cycles: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Build from exactly three positional values: `<mcu> <mode> <benchmark>`.
    pub fn from_positional<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        match args {
            [mcu, mode, benchmark] => Self::new(mcu.as_ref(), mode.as_ref(), benchmark.as_ref()),
            [_, _, _, extra, ..] => Err(Error::Argument(format!(
                "unexpected extra argument '{}'",
                extra.as_ref()
            ))),
            _ => Err(Error::Argument(format!(
                "expected <mcu> <mode> <benchmark>, got {} value(s)",
                args.len()
            ))),
        }
    }

    #[must_use]
    pub const fn with_frequency(mut self, frequency_hz: u32) -> Self {
        self.frequency_hz = frequency_hz;
        self
    }

    #[must_use]
    pub fn with_firmware_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.firmware_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    #[must_use]
    pub const fn with_max_cycles(mut self, limit: Option<u64>) -> Self {
        self.max_cycles = limit;
        self
    }

    /// Use different signal pins. They must differ.
    pub fn with_pins(mut self, begin: PinId, stop: PinId) -> Result<Self> {
        self.begin_pin = begin;
        self.stop_pin = stop;
        self.validate()?;
        Ok(self)
    }

    /// `<mode>-<benchmark>.avr`
    pub fn firmware_name(&self) -> String {
        format!("{}-{}.{FIRMWARE_EXTENSION}", self.mode, self.benchmark)
    }

    pub fn firmware_path(&self) -> PathBuf {
        self.firmware_dir.join(self.firmware_name())
    }

    /// `<output_dir>/result-<mcu>`
    pub fn result_path(&self) -> PathBuf {
        self.output_dir.join(format!("{RESULT_PREFIX}{}", self.mcu))
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("mcu", &self.mcu),
            ("mode", &self.mode),
            ("benchmark", &self.benchmark),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Argument(format!("{name} must not be empty")));
            }
        }
        // The MCU name becomes part of a file name.
        if self.mcu.contains(std::path::is_separator) {
            return Err(Error::Argument(format!(
                "mcu '{}' must not contain a path separator",
                self.mcu
            )));
        }
        if self.begin_pin == self.stop_pin {
            return Err(Error::Argument(format!(
                "begin and stop signals share pin {}",
                self.begin_pin
            )));
        }
        Ok(())
    }
}
