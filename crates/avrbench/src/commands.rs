//! Command implementation.

use std::rc::Rc;

use avrbench::{BenchReport, RunConfig, WriteMode, run_benchmark};
use avrbench_sim::{ShimBuildConfig, ShimLibrary, SimavrMcu, SimavrOptions};
use tracing::{debug, error};

use crate::cli::{Cli, EXIT_FAILURE, EXIT_SUCCESS, OutputFormat, SimavrArgs};
use crate::terminal::{self, Spinner};

/// Run the benchmark described by the command line.
pub fn run_command(cli: &Cli) -> i32 {
    let config = match build_config(cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid arguments");
            return EXIT_FAILURE;
        }
    };

    let spinner = if cli.silent {
        Spinner::hidden()
    } else {
        Spinner::new(format!("Building simavr shim for {}", config.mcu))
    };

    let shim_config = shim_build_config(&cli.simavr);
    let options = SimavrOptions {
        engine_log: cli.simavr.trace_engine,
        steps_per_advance: cli.simavr.steps,
        ..SimavrOptions::new(&config.mcu, config.frequency_hz)
    };

    let result = run_benchmark(&config, |path| {
        let shim = Rc::new(ShimLibrary::build(&shim_config)?);
        spinner.set_message(format!("Running {}", config.firmware_name()));
        SimavrMcu::load(shim, path, &options)
    });

    match result {
        Ok(report) => {
            spinner.finish_with_success(&format!(
                "{} {} on {}",
                config.mode, config.benchmark, config.mcu
            ));
            if !cli.silent {
                terminal::path_output(&config.result_path());
            }
            print_report(cli.format, &report);
            EXIT_SUCCESS
        }
        Err(e) => {
            spinner.finish_with_failure(&format!("{} failed", config.firmware_name()));
            error!(error = %e, firmware = %config.firmware_path().display(), "benchmark failed");
            EXIT_FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> avrbench::Result<RunConfig> {
    let write_mode = if cli.truncate {
        WriteMode::Truncate
    } else {
        WriteMode::Append
    };
    let config = RunConfig::from_positional(&cli.positional)?
        .with_frequency(cli.freq)
        .with_firmware_dir(&cli.firmware_dir)
        .with_output_dir(&cli.output_dir)
        .with_write_mode(write_mode)
        .with_max_cycles(cli.max_cycles)
        .with_pins(cli.begin_pin, cli.stop_pin)?;
    debug!(?config, "run configuration");
    Ok(config)
}

fn shim_build_config(args: &SimavrArgs) -> ShimBuildConfig {
    let mut config = ShimBuildConfig {
        compiler: args.cc.clone(),
        include_dirs: args.include_dirs.clone(),
        lib_dirs: args.lib_dirs.clone(),
        ..ShimBuildConfig::default()
    };
    config.libs.extend(args.extra_libs.iter().cloned());
    config
}

fn print_report(format: OutputFormat, report: &BenchReport) {
    let outcome = &report.outcome;
    match format {
        OutputFormat::Text => {
            println!("{}", report.line);
        }
        OutputFormat::Raw => {
            println!("size: {}", report.line.size);
            println!("timings: {}", report.line.timings_list());
            println!("cycles: {}", outcome.cycles);
            println!("time: {:.6}", outcome.wall_time.as_secs_f64());
            println!("speed_mhz: {:.2}", outcome.simulated_mhz());
        }
        OutputFormat::Json => match report.line.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => error!(error = %e, "failed to serialize result"),
        },
    }
}
