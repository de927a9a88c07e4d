use std::path::PathBuf;

use avrbench_sim::SimError;
use thiserror::Error;

/// Benchmark run errors. None of them are recovered from locally.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    Argument(String),
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load firmware: {0}")]
    Load(#[source] SimError),
    #[error("simulation failed: {0}")]
    Engine(#[source] SimError),
    #[error("no stop signal after {cycle} cycles (limit {limit})")]
    CycleLimit { limit: u64, cycle: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
