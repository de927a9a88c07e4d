//! Drive loop: run the MCU until the firmware signals stop, timing the
//! intervals between begin pulses.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use avrbench_sim::{Mcu, PinChange, PinId};
use tracing::{debug, trace};

use crate::metrics;
use crate::{Error, Result};

/// State shared by the two signal handlers and the drive loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunState {
    pending_begin: Option<u64>,
    stop: bool,
    samples: Vec<u64>,
}

impl RunState {
    /// Begin pin went low: close the running interval, if any, and open the next.
    ///
    /// The first pulse only sets the baseline. `pending_begin` is never
    /// cleared, so every later pulse yields a sample.
    pub fn on_begin(&mut self, change: PinChange) {
        if change.value != 0 {
            return;
        }
        if let Some(previous) = self.pending_begin {
            let sample = change.cycle.saturating_sub(previous);
            trace!(sample, cycle = change.cycle, "interval closed");
            self.samples.push(sample);
        }
        self.pending_begin = Some(change.cycle);
    }

    /// Stop pin driven high: end the run.
    pub fn on_stop(&mut self, change: PinChange) {
        if change.value != 0 {
            self.stop = true;
        }
    }

    pub const fn is_stopped(&self) -> bool {
        self.stop
    }

    pub const fn pending_begin(&self) -> Option<u64> {
        self.pending_begin
    }

    pub fn samples(&self) -> &[u64] {
        &self.samples
    }
}

/// What a finished run measured.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub firmware_size: u32,
    /// Cycles between consecutive begin pulses, in order.
    pub samples: Vec<u64>,
    /// Simulated cycle when the loop exited.
    pub cycles: u64,
    pub advances: u64,
    pub wall_time: Duration,
}

impl RunOutcome {
    /// Simulation speed in simulated MHz.
    pub fn simulated_mhz(&self) -> f64 {
        let secs = self.wall_time.as_secs_f64();
        if secs > 0.0 {
            self.cycles as f64 / secs / 1_000_000.0
        } else {
            0.0
        }
    }
}

/// Owns an MCU with the begin/stop handlers attached.
pub struct Harness<M: Mcu> {
    mcu: M,
    state: Rc<RefCell<RunState>>,
    max_cycles: Option<u64>,
}

impl<M: Mcu> Harness<M> {
    /// Attach the begin handler, then the stop handler.
    ///
    /// Engines break same-cycle ties by subscription order, so a begin and a
    /// stop on the same cycle still record the final interval.
    pub fn new(mut mcu: M, begin_pin: PinId, stop_pin: PinId) -> Result<Self> {
        let state = Rc::new(RefCell::new(RunState::default()));

        let begin_state = Rc::clone(&state);
        let begin_events = metrics::pin_event_counter(begin_pin);
        mcu.subscribe(
            begin_pin,
            Box::new(move |change| {
                begin_events.increment(1);
                begin_state.borrow_mut().on_begin(change);
            }),
        )
        .map_err(Error::Engine)?;

        let stop_state = Rc::clone(&state);
        let stop_events = metrics::pin_event_counter(stop_pin);
        mcu.subscribe(
            stop_pin,
            Box::new(move |change| {
                stop_events.increment(1);
                stop_state.borrow_mut().on_stop(change);
            }),
        )
        .map_err(Error::Engine)?;

        debug!(begin = %begin_pin, stop = %stop_pin, "signal handlers attached");
        Ok(Self {
            mcu,
            state,
            max_cycles: None,
        })
    }

    /// Fail with [`Error::CycleLimit`] instead of running forever.
    #[must_use]
    pub const fn with_max_cycles(mut self, limit: Option<u64>) -> Self {
        self.max_cycles = limit;
        self
    }

    /// Advance until the stop pin is raised.
    ///
    /// With no cycle limit this never returns for firmware that does not
    /// signal stop.
    pub fn run(mut self) -> Result<RunOutcome> {
        let start = Instant::now();
        let mut advances = 0u64;

        while !self.state.borrow().is_stopped() {
            self.mcu.advance().map_err(Error::Engine)?;
            advances += 1;

            if let Some(limit) = self.max_cycles {
                let cycle = self.mcu.cycle();
                if cycle >= limit && !self.state.borrow().is_stopped() {
                    return Err(Error::CycleLimit { limit, cycle });
                }
            }
        }

        let wall_time = start.elapsed();
        let samples = std::mem::take(&mut self.state.borrow_mut().samples);
        let outcome = RunOutcome {
            firmware_size: self.mcu.firmware_size(),
            samples,
            cycles: self.mcu.cycle(),
            advances,
            wall_time,
        };
        debug!(
            cycles = outcome.cycles,
            advances,
            samples = outcome.samples.len(),
            "stop signal received"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use avrbench_sim::ScriptedMcu;

    use super::*;

    fn change(pin: PinId, value: u32, cycle: u64) -> PinChange {
        PinChange { pin, value, cycle }
    }

    #[test]
    fn test_first_begin_is_baseline_only() {
        let mut state = RunState::default();
        state.on_begin(change(PinId::BEGIN, 0, 50));
        assert_eq!(state.pending_begin(), Some(50));
        assert!(state.samples().is_empty());
    }

    #[test]
    fn test_begin_pulses_produce_consecutive_deltas() {
        let mut state = RunState::default();
        for cycle in [100, 250, 400, 1000] {
            state.on_begin(change(PinId::BEGIN, 0, cycle));
        }
        assert_eq!(state.samples(), &[150, 150, 600]);
        assert_eq!(state.pending_begin(), Some(1000));
    }

    #[test]
    fn test_rising_begin_edges_are_ignored() {
        let mut state = RunState::default();
        state.on_begin(change(PinId::BEGIN, 0, 10));
        state.on_begin(change(PinId::BEGIN, 1, 11));
        state.on_begin(change(PinId::BEGIN, 0, 30));
        assert_eq!(state.samples(), &[20]);
    }

    #[test]
    fn test_stop_needs_nonzero_value() {
        let mut state = RunState::default();
        state.on_stop(change(PinId::STOP, 0, 10));
        assert!(!state.is_stopped());
        state.on_stop(change(PinId::STOP, 1, 20));
        assert!(state.is_stopped());
        assert!(state.samples().is_empty());
    }

    #[test]
    fn test_run_stops_on_stop_pin() {
        let mcu = ScriptedMcu::new(4096)
            .with_quantum(64)
            .with_event(100, PinId::BEGIN, 0)
            .with_event(250, PinId::BEGIN, 0)
            .with_event(400, PinId::BEGIN, 0)
            .with_event(400, PinId::STOP, 1)
            .with_event(900, PinId::BEGIN, 0);
        let outcome = Harness::new(mcu, PinId::BEGIN, PinId::STOP)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(outcome.samples, vec![150, 150]);
        assert_eq!(outcome.firmware_size, 4096);
        assert_eq!(outcome.advances, 7);
    }

    #[test]
    fn test_low_stop_does_not_end_run() {
        let mcu = ScriptedMcu::new(0)
            .with_event(10, PinId::STOP, 0)
            .with_event(2500, PinId::STOP, 1);
        let outcome = Harness::new(mcu, PinId::BEGIN, PinId::STOP)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(outcome.advances, 3);
    }

    #[test]
    fn test_pin_events_counted_per_pin() {
        let recorder = metrics::CliRecorder::new();
        let handle = recorder.handle();
        let mcu = ScriptedMcu::new(0)
            .with_low_pulse(10, PinId::BEGIN)
            .with_low_pulse(50, PinId::BEGIN)
            .with_event(60, PinId::STOP, 1);

        let harness = ::metrics::with_local_recorder(&recorder, || {
            Harness::new(mcu, PinId::BEGIN, PinId::STOP).unwrap()
        });
        harness.run().unwrap();

        assert_eq!(
            handle.get_counter("avrbench_pin_events_total{pin=B0}"),
            Some(4)
        );
        assert_eq!(
            handle.get_counter("avrbench_pin_events_total{pin=B1}"),
            Some(1)
        );
    }

    #[test]
    fn test_cycle_limit() {
        let mcu = ScriptedMcu::new(0).with_event(10, PinId::BEGIN, 0);
        let err = Harness::new(mcu, PinId::BEGIN, PinId::STOP)
            .unwrap()
            .with_max_cycles(Some(5000))
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CycleLimit {
                limit: 5000,
                cycle: 5000
            }
        ));
    }

    #[test]
    fn test_engine_fault_propagates() {
        let mcu = ScriptedMcu::new(0).with_fault_at(1500);
        let err = Harness::new(mcu, PinId::BEGIN, PinId::STOP)
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Engine(avrbench_sim::SimError::Crashed { cycle: 1500 })
        ));
    }
}
