//! CLI definitions and argument types.

use std::path::PathBuf;

use avrbench::DEFAULT_FREQUENCY_HZ;
use avrbench_sim::PinId;
use avrbench_sim::simavr::DEFAULT_STEPS_PER_ADVANCE;
use clap::{Args, Parser, ValueEnum};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "avrbench")]
#[command(about = "Run AVR firmware under simavr and record per-iteration cycle counts")]
#[command(version)]
pub struct Cli {
    /// Show metrics summary after execution
    #[arg(long)]
    pub metrics: bool,

    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, conflicts_with = "verbose")]
    pub silent: bool,

    /// MCU name, build mode and benchmark name; runs <MODE>-<BENCHMARK>.avr
    #[arg(value_name = "MCU MODE BENCHMARK", num_args = 0..)]
    pub positional: Vec<String>,

    /// Simulated clock in Hz
    #[arg(long, default_value_t = DEFAULT_FREQUENCY_HZ)]
    pub freq: u32,

    /// Pin pulled low at the start of every timed iteration
    #[arg(long, default_value = "B0")]
    pub begin_pin: PinId,

    /// Pin raised when the benchmark is done
    #[arg(long, default_value = "B1")]
    pub stop_pin: PinId,

    /// Directory holding the firmware images
    #[arg(long, default_value = ".")]
    pub firmware_dir: PathBuf,

    /// Directory the result file is written to
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Overwrite the result file instead of appending to it
    #[arg(long)]
    pub truncate: bool,

    /// Fail if no stop signal arrives by this cycle
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// What to print on stdout once the run finishes
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    #[command(flatten)]
    pub simavr: SimavrArgs,
}

/// How to reach libsimavr.
#[derive(Args, Clone, Debug)]
pub struct SimavrArgs {
    /// C compiler used to build the simavr shim (e.g., cc, clang, gcc-13)
    #[arg(long, default_value = "cc")]
    pub cc: String,

    /// Directory containing simavr/sim_avr.h (repeatable)
    #[arg(long = "simavr-include", value_name = "DIR")]
    pub include_dirs: Vec<PathBuf>,

    /// Directory containing libsimavr (repeatable)
    #[arg(long = "simavr-lib", value_name = "DIR")]
    pub lib_dirs: Vec<PathBuf>,

    /// Extra library to link the shim against, e.g. elf (repeatable)
    #[arg(long = "link-lib", value_name = "NAME")]
    pub extra_libs: Vec<String>,

    /// Instructions executed per engine advance
    #[arg(long, default_value_t = DEFAULT_STEPS_PER_ADVANCE)]
    pub steps: u32,

    /// Let simavr print its own trace output
    #[arg(long)]
    pub trace_engine: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// The result line (default)
    #[default]
    Text,
    /// Raw key-value output (for scripting)
    Raw,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["avrbench", "atmega328p", "opt", "sort"]).unwrap();
        assert_eq!(cli.positional, ["atmega328p", "opt", "sort"]);
        assert_eq!(cli.freq, 8_000_000);
        assert_eq!(cli.begin_pin, PinId::BEGIN);
        assert_eq!(cli.stop_pin, PinId::STOP);
        assert!(!cli.truncate);
        assert_eq!(cli.max_cycles, None);
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.simavr.cc, "cc");
        assert_eq!(cli.simavr.steps, DEFAULT_STEPS_PER_ADVANCE);
    }

    #[test]
    fn test_options() {
        let cli = Cli::try_parse_from([
            "avrbench",
            "--begin-pin",
            "PD2",
            "--max-cycles",
            "1000000",
            "--simavr-lib",
            "/opt/simavr/lib",
            "--simavr-lib",
            "/usr/local/lib",
            "-o",
            "out",
            "atmega328p",
            "size",
            "fib",
        ])
        .unwrap();
        assert_eq!(cli.begin_pin.to_string(), "D2");
        assert_eq!(cli.max_cycles, Some(1_000_000));
        assert_eq!(cli.simavr.lib_dirs.len(), 2);
        assert_eq!(cli.output_dir, PathBuf::from("out"));
        assert_eq!(cli.positional, ["atmega328p", "size", "fib"]);
    }

    #[test]
    fn test_bad_pin_rejected() {
        assert!(Cli::try_parse_from(["avrbench", "--stop-pin", "Z9", "a", "b", "c"]).is_err());
    }

    #[test]
    fn test_verbose_and_silent_conflict() {
        assert!(Cli::try_parse_from(["avrbench", "-v", "-s", "a", "b", "c"]).is_err());
    }
}
