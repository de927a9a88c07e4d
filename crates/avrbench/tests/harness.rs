//! End-to-end runs against the scripted engine: firmware on disk, result
//! file on disk.

use std::fs;
use std::path::Path;

use avrbench::{Error, FirmwareImage, Harness, RunConfig, WriteMode, run_benchmark};
use avrbench_sim::{PinId, ScriptedMcu, SimError};
use tempfile::TempDir;

fn write_firmware(dir: &Path, name: &str, flash_size: usize) {
    let bytes = FirmwareImage::from_flash(vec![0; flash_size]).to_elf_bytes();
    fs::write(dir.join(name), bytes).unwrap();
}

fn config(dir: &TempDir, mode: &str, benchmark: &str) -> RunConfig {
    RunConfig::new("atmega328p", mode, benchmark)
        .unwrap()
        .with_firmware_dir(dir.path())
        .with_output_dir(dir.path())
}

fn results(dir: &TempDir) -> String {
    fs::read_to_string(dir.path().join("result-atmega328p")).unwrap()
}

#[test]
fn test_three_pulses_give_two_samples() {
    let dir = tempfile::tempdir().unwrap();
    write_firmware(dir.path(), "opt-sort.avr", 4096);

    let report = run_benchmark(&config(&dir, "opt", "sort"), |path| {
        Ok(ScriptedMcu::load(path)?
            .with_event(100, PinId::BEGIN, 0)
            .with_event(250, PinId::BEGIN, 0)
            .with_event(400, PinId::BEGIN, 0)
            .with_event(400, PinId::STOP, 1))
    })
    .unwrap();

    assert_eq!(report.outcome.samples, vec![150, 150]);
    assert_eq!(
        results(&dir),
        "opt   sort: size = 4096, timings = [150, 150]\n"
    );
}

#[test]
fn test_stop_without_begin_gives_empty_timings() {
    let dir = tempfile::tempdir().unwrap();
    write_firmware(dir.path(), "opt-sort.avr", 4096);

    run_benchmark(&config(&dir, "opt", "sort"), |path| {
        Ok(ScriptedMcu::load(path)?.with_event(50, PinId::STOP, 1))
    })
    .unwrap();

    assert_eq!(results(&dir), "opt   sort: size = 4096, timings = []\n");
}

#[test]
fn test_single_begin_only_sets_baseline() {
    let dir = tempfile::tempdir().unwrap();
    write_firmware(dir.path(), "size-fib.avr", 512);

    let report = run_benchmark(&config(&dir, "size", "fib"), |path| {
        Ok(ScriptedMcu::load(path)?
            .with_low_pulse(10, PinId::BEGIN)
            .with_event(900, PinId::STOP, 1))
    })
    .unwrap();

    assert!(report.outcome.samples.is_empty());
    assert_eq!(report.line.size, 512);
}

#[test]
fn test_runs_append_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_firmware(dir.path(), "opt-sort.avr", 4096);
    write_firmware(dir.path(), "opt-crc.avr", 2048);

    for (benchmark, gap) in [("sort", 150), ("crc", 75)] {
        run_benchmark(&config(&dir, "opt", benchmark), |path| {
            Ok(ScriptedMcu::load(path)?
                .with_low_pulse(100, PinId::BEGIN)
                .with_low_pulse(100 + gap, PinId::BEGIN)
                .with_event(100 + gap, PinId::STOP, 1))
        })
        .unwrap();
    }

    assert_eq!(
        results(&dir),
        "opt   sort: size = 4096, timings = [150]\n\
         opt   crc: size = 2048, timings = [75]\n"
    );
}

#[test]
fn test_truncate_starts_over() {
    let dir = tempfile::tempdir().unwrap();
    write_firmware(dir.path(), "opt-sort.avr", 64);
    fs::write(dir.path().join("result-atmega328p"), "old line\n").unwrap();

    run_benchmark(
        &config(&dir, "opt", "sort").with_write_mode(WriteMode::Truncate),
        |path| Ok(ScriptedMcu::load(path)?.with_event(1, PinId::STOP, 1)),
    )
    .unwrap();

    assert_eq!(results(&dir), "opt   sort: size = 64, timings = []\n");
}

#[test]
fn test_missing_firmware_writes_no_line() {
    let dir = tempfile::tempdir().unwrap();

    let err = run_benchmark(&config(&dir, "opt", "missing"), |path| ScriptedMcu::load(path))
        .unwrap_err();

    assert!(matches!(err, Error::Load(SimError::FirmwareNotFound(_))));
    assert_eq!(results(&dir), "");
}

#[test]
fn test_corrupt_firmware_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("opt-sort.avr"), b"not an elf file at all, just text").unwrap();

    let err = run_benchmark(&config(&dir, "opt", "sort"), |path| ScriptedMcu::load(path))
        .unwrap_err();

    assert!(matches!(err, Error::Load(SimError::Firmware(_))));
}

#[test]
fn test_cycle_limit_stops_runaway_firmware() {
    let dir = tempfile::tempdir().unwrap();
    write_firmware(dir.path(), "opt-loop.avr", 128);

    let err = run_benchmark(
        &config(&dir, "opt", "loop").with_max_cycles(Some(10_000)),
        |path| Ok(ScriptedMcu::load(path)?.with_low_pulse(5, PinId::BEGIN)),
    )
    .unwrap_err();

    assert!(matches!(err, Error::CycleLimit { limit: 10_000, .. }));
    assert_eq!(results(&dir), "");
}

#[test]
fn test_engine_crash_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    write_firmware(dir.path(), "opt-sort.avr", 128);

    let err = run_benchmark(&config(&dir, "opt", "sort"), |path| {
        Ok(ScriptedMcu::load(path)?
            .with_low_pulse(100, PinId::BEGIN)
            .with_fault_at(3000)
            .with_event(4000, PinId::STOP, 1))
    })
    .unwrap_err();

    assert!(matches!(
        err,
        Error::Engine(SimError::Crashed { cycle: 3000 })
    ));
}

#[test]
fn test_custom_pins() {
    let dir = tempfile::tempdir().unwrap();
    write_firmware(dir.path(), "opt-sort.avr", 256);
    let begin = PinId::new('D', 2).unwrap();
    let stop = PinId::new('D', 3).unwrap();

    let report = run_benchmark(
        &config(&dir, "opt", "sort").with_pins(begin, stop).unwrap(),
        |path| {
            Ok(ScriptedMcu::load(path)?
                // Default pins are ignored once others are configured.
                .with_event(20, PinId::STOP, 1)
                .with_event(30, begin, 0)
                .with_event(90, begin, 0)
                .with_event(2000, stop, 1))
        },
    )
    .unwrap();

    assert_eq!(report.outcome.samples, vec![60]);
}

#[test]
fn test_independent_harnesses_in_one_process() {
    let first = ScriptedMcu::new(100)
        .with_event(10, PinId::BEGIN, 0)
        .with_event(40, PinId::BEGIN, 0)
        .with_event(40, PinId::STOP, 1);
    let second = ScriptedMcu::new(200)
        .with_event(10, PinId::BEGIN, 0)
        .with_event(510, PinId::BEGIN, 0)
        .with_event(1510, PinId::BEGIN, 0)
        .with_event(1600, PinId::STOP, 1);

    let a = Harness::new(first, PinId::BEGIN, PinId::STOP).unwrap();
    let b = Harness::new(second, PinId::BEGIN, PinId::STOP).unwrap();
    let b = b.run().unwrap();
    let a = a.run().unwrap();

    assert_eq!(a.samples, vec![30]);
    assert_eq!(b.samples, vec![500, 1000]);
    assert_eq!((a.firmware_size, b.firmware_size), (100, 200));
}
