//! avrbench CLI - cycle-count benchmarks for AVR firmware

mod cli;
mod commands;
mod terminal;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let metrics_handle = if cli.metrics {
        avrbench::metrics::CliRecorder::new().install()
    } else {
        None
    };
    avrbench::metrics::init();

    let default_level = if cli.verbose {
        "avrbench=debug"
    } else if cli.silent {
        "avrbench=error"
    } else {
        "avrbench=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(default_level.parse().unwrap()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = commands::run_command(&cli);

    if let Some(handle) = metrics_handle {
        handle.print_summary();
    }

    std::process::exit(exit_code);
}
