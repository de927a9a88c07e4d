//! Cycle-accurate benchmarking of AVR firmware.
//!
//! A benchmark image signals the harness on two port pins: it pulls the
//! begin pin low at the start of every timed iteration and raises the stop
//! pin once it is done. The harness runs the image on a simulated MCU,
//! records the cycle distance between consecutive begin pulses, and appends
//! one summary line per run to `result-<mcu>`:
//!
//! ```text
//! opt   sort: size = 4096, timings = [150, 150]
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//!
//! use avrbench::{RunConfig, run_benchmark};
//! use avrbench_sim::{ShimBuildConfig, ShimLibrary, SimavrMcu, SimavrOptions};
//!
//! let config = RunConfig::new("atmega328p", "opt", "sort")?;
//! let shim = Rc::new(ShimLibrary::build(&ShimBuildConfig::default())?);
//! let options = SimavrOptions::new(&config.mcu, config.frequency_hz);
//! let report = run_benchmark(&config, |path| SimavrMcu::load(shim, path, &options))?;
//! println!("{}", report.line);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
mod error;
pub mod harness;
pub mod metrics;
mod report;

use std::path::Path;

use avrbench_sim::{Mcu, SimError};
use tracing::{debug, info};

pub use avrbench_elf::FirmwareImage;
pub use config::{
    DEFAULT_FREQUENCY_HZ, FIRMWARE_EXTENSION, RESULT_PREFIX, RunConfig, WriteMode,
};
pub use error::{Error, Result};
pub use harness::{Harness, RunOutcome, RunState};
pub use report::{ResultLine, ResultSink};

/// A finished benchmark: the line written and what the run measured.
#[derive(Clone, Debug)]
pub struct BenchReport {
    pub line: ResultLine,
    pub outcome: RunOutcome,
}

/// Run one benchmark and append its result line.
///
/// The result file is opened before the engine is built, so a bad output
/// location fails fast and a firmware load error still leaves the file in
/// place (without a line). `open_mcu` receives the firmware path and must
/// return an engine with that image loaded.
pub fn run_benchmark<M, F>(config: &RunConfig, open_mcu: F) -> Result<BenchReport>
where
    M: Mcu,
    F: FnOnce(&Path) -> std::result::Result<M, SimError>,
{
    let mut sink = ResultSink::open(config.result_path(), config.write_mode)?;

    let firmware = config.firmware_path();
    debug!(firmware = %firmware.display(), mcu = %config.mcu, "loading firmware");
    let mcu = open_mcu(&firmware).map_err(Error::Load)?;

    let outcome = Harness::new(mcu, config.begin_pin, config.stop_pin)?
        .with_max_cycles(config.max_cycles)
        .run()?;

    let line = ResultLine::new(&config.mode, &config.benchmark, &outcome);
    sink.append(&line)?;
    metrics::record_run(config, &outcome);

    info!(
        mode = %config.mode,
        benchmark = %config.benchmark,
        size = outcome.firmware_size,
        samples = outcome.samples.len(),
        cycles = outcome.cycles,
        result = %sink.path().display(),
        "benchmark complete"
    );

    Ok(BenchReport { line, outcome })
}
