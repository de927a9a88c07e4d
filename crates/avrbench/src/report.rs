//! Result line formatting and the result file.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::WriteMode;
use crate::harness::RunOutcome;
use crate::{Error, Result};

/// One benchmark's summary, rendered as
/// `<mode>   <benchmark>: size = <bytes>, timings = [<cycles>, ...]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResultLine {
    pub mode: String,
    pub benchmark: String,
    pub size: u32,
    pub timings: Vec<u64>,
}

impl ResultLine {
    pub fn new(mode: impl Into<String>, benchmark: impl Into<String>, outcome: &RunOutcome) -> Self {
        Self {
            mode: mode.into(),
            benchmark: benchmark.into(),
            size: outcome.firmware_size,
            timings: outcome.samples.clone(),
        }
    }

    /// `[a, b, c]`
    pub fn timings_list(&self) -> String {
        let items: Vec<String> = self.timings.iter().map(u64::to_string).collect();
        format!("[{}]", items.join(", "))
    }

    /// Single-line JSON object.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl fmt::Display for ResultLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}   {}: size = {}, timings = {}",
            self.mode,
            self.benchmark,
            self.size,
            self.timings_list()
        )
    }
}

/// The `result-<mcu>` file, held open for the whole run.
pub struct ResultSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ResultSink {
    /// Open (creating if needed) the result file.
    pub fn open(path: impl AsRef<Path>, mode: WriteMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            WriteMode::Append => options.append(true),
            WriteMode::Truncate => options.write(true).truncate(true),
        };
        let file = options.open(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), ?mode, "opened result file");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one newline-terminated line and flush it to disk.
    pub fn append(&mut self, line: &ResultLine) -> Result<()> {
        writeln!(self.writer, "{line}")
            .and_then(|()| self.writer.flush())
            .map_err(|source| Error::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn outcome(size: u32, samples: Vec<u64>) -> RunOutcome {
        RunOutcome {
            firmware_size: size,
            samples,
            cycles: 0,
            advances: 0,
            wall_time: Duration::ZERO,
        }
    }

    #[test]
    fn test_line_format() {
        let line = ResultLine::new("opt", "sort", &outcome(4096, vec![150, 150]));
        assert_eq!(line.to_string(), "opt   sort: size = 4096, timings = [150, 150]");
    }

    #[test]
    fn test_empty_timings() {
        let line = ResultLine::new("opt", "idle", &outcome(128, Vec::new()));
        assert_eq!(line.to_string(), "opt   idle: size = 128, timings = []");
    }

    #[test]
    fn test_large_samples_have_no_suffix() {
        let line = ResultLine::new("opt", "big", &outcome(1, vec![u64::from(u32::MAX) + 1]));
        assert!(line.to_string().ends_with("timings = [4294967296]"));
    }

    #[test]
    fn test_json() {
        let line = ResultLine::new("opt", "so\"rt", &outcome(10, vec![1, 2]));
        assert_eq!(
            line.to_json().unwrap(),
            r#"{"mode":"opt","benchmark":"so\"rt","size":10,"timings":[1,2]}"#
        );
    }

    #[test]
    fn test_json_escapes_control_characters() {
        let line = ResultLine::new("o", "b\u{1}", &outcome(1, Vec::new()));
        let json = line.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"mode":"o","benchmark":"b\u0001","size":1,"timings":[]}"#
        );
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["benchmark"], "b\u{1}");
    }

    #[test]
    fn test_append_keeps_previous_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result-atmega328");
        for bench in ["sort", "fib"] {
            let mut sink = ResultSink::open(&path, WriteMode::Append).unwrap();
            sink.append(&ResultLine::new("opt", bench, &outcome(1, vec![3])))
                .unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            contents,
            "opt   sort: size = 1, timings = [3]\nopt   fib: size = 1, timings = [3]\n"
        );
    }

    #[test]
    fn test_truncate_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result-atmega328");
        std::fs::write(&path, "stale\n").unwrap();

        let mut sink = ResultSink::open(&path, WriteMode::Truncate).unwrap();
        sink.append(&ResultLine::new("opt", "sort", &outcome(1, Vec::new())))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "opt   sort: size = 1, timings = []\n");
    }

    #[test]
    fn test_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("result-atmega328");
        let err = ResultSink::open(&path, WriteMode::Append).err().unwrap();
        assert!(matches!(err, Error::Io { path: p, .. } if p == path));
    }
}
