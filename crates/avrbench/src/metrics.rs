//! Run metrics through the `metrics` facade, plus an in-memory recorder
//! that prints a summary when the process exits.
//!
//! With no recorder installed every call here is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use avrbench_sim::PinId;
use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use parking_lot::RwLock;

use crate::RunConfig;
use crate::harness::RunOutcome;

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(
        "avrbench_simulated_cycles_total",
        Unit::Count,
        "Simulated MCU cycles until the stop signal"
    );
    describe_counter!(
        "avrbench_advances_total",
        Unit::Count,
        "Engine advance calls"
    );
    describe_counter!(
        "avrbench_pin_events_total",
        Unit::Count,
        "Pin change notifications delivered"
    );
    describe_counter!(
        "avrbench_samples_total",
        Unit::Count,
        "Timing samples recorded"
    );

    describe_gauge!(
        "avrbench_wall_time_seconds",
        Unit::Seconds,
        "Wall-clock time spent in the drive loop"
    );
    describe_gauge!(
        "avrbench_simulated_mhz",
        Unit::Count,
        "Simulated cycles per wall-clock microsecond"
    );

    describe_histogram!(
        "avrbench_sample_cycles",
        Unit::Count,
        "Cycles between consecutive begin pulses"
    );
}

/// Notification counter for `pin`. Register once per subscription and
/// increment from the handler.
pub fn pin_event_counter(pin: PinId) -> Counter {
    counter!("avrbench_pin_events_total", "pin" => pin.to_string())
}

/// Record totals for a finished run.
pub fn record_run(config: &RunConfig, outcome: &RunOutcome) {
    let labels = [
        ("mode", config.mode.clone()),
        ("benchmark", config.benchmark.clone()),
    ];

    counter!("avrbench_simulated_cycles_total", &labels).absolute(outcome.cycles);
    counter!("avrbench_advances_total", &labels).absolute(outcome.advances);
    counter!("avrbench_samples_total", &labels).absolute(outcome.samples.len() as u64);
    gauge!("avrbench_wall_time_seconds", &labels).set(outcome.wall_time.as_secs_f64());
    gauge!("avrbench_simulated_mhz", &labels).set(outcome.simulated_mhz());

    let samples = histogram!("avrbench_sample_cycles", &labels);
    for &sample in &outcome.samples {
        samples.record(sample as f64);
    }
}

// ============================================================================
// CLI recorder
// ============================================================================

/// Values keyed by rendered metric key, shared between handles.
type Storage<T> = Arc<RwLock<HashMap<String, T>>>;

struct CliCounter {
    key: String,
    storage: Storage<u64>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        *self.storage.write().entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.storage.write().insert(self.key.clone(), value);
    }
}

struct CliGauge {
    key: String,
    storage: Storage<f64>,
}

impl metrics::GaugeFn for CliGauge {
    fn increment(&self, value: f64) {
        *self.storage.write().entry(self.key.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self.storage.write().entry(self.key.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.storage.write().insert(self.key.clone(), value);
    }
}

struct CliHistogram {
    key: String,
    storage: Storage<Vec<f64>>,
}

impl metrics::HistogramFn for CliHistogram {
    fn record(&self, value: f64) {
        self.storage
            .write()
            .entry(self.key.clone())
            .or_default()
            .push(value);
    }
}

/// Recorder that keeps everything in memory for a terminal summary.
#[derive(Default)]
pub struct CliRecorder {
    counters: Storage<u64>,
    gauges: Storage<f64>,
    histograms: Storage<Vec<f64>>,
}

impl CliRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the global recorder. `None` if one is already installed.
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = self.handle();
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }

    pub(crate) fn handle(&self) -> CliRecorderHandle {
        CliRecorderHandle {
            counters: Arc::clone(&self.counters),
            gauges: Arc::clone(&self.gauges),
            histograms: Arc::clone(&self.histograms),
        }
    }
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            storage: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(CliGauge {
            key: key_to_string(key),
            storage: Arc::clone(&self.gauges),
        }))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(CliHistogram {
            key: key_to_string(key),
            storage: Arc::clone(&self.histograms),
        }))
    }
}

/// Read access to what a [`CliRecorder`] collected.
pub struct CliRecorderHandle {
    counters: Storage<u64>,
    gauges: Storage<f64>,
    histograms: Storage<Vec<f64>>,
}

impl CliRecorderHandle {
    pub fn get_counter(&self, key: &str) -> Option<u64> {
        self.counters.read().get(key).copied()
    }

    pub fn get_gauge(&self, key: &str) -> Option<f64> {
        self.gauges.read().get(key).copied()
    }

    pub fn get_histogram(&self, key: &str) -> Option<Vec<f64>> {
        self.histograms.read().get(key).cloned()
    }

    /// Render the summary as text.
    pub fn summary(&self) -> String {
        let counters = self.counters.read();
        let gauges = self.gauges.read();
        let histograms = self.histograms.read();

        if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
            return "No metrics collected.\n".to_string();
        }

        let mut out = String::from("\n## Metrics Summary\n\n");

        if !counters.is_empty() {
            out.push_str("### Counters\n");
            for (key, value) in sorted(&counters) {
                out.push_str(&format!("  {key}: {value}\n"));
            }
            out.push('\n');
        }

        if !gauges.is_empty() {
            out.push_str("### Gauges\n");
            for (key, value) in sorted(&gauges) {
                out.push_str(&format!("  {key}: {value:.6}\n"));
            }
            out.push('\n');
        }

        if !histograms.is_empty() {
            out.push_str("### Histograms\n");
            for (key, values) in sorted(&histograms) {
                if values.is_empty() {
                    continue;
                }
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let avg = values.iter().sum::<f64>() / values.len() as f64;
                out.push_str(&format!(
                    "  {key}: count={}, min={min:.0}, max={max:.0}, avg={avg:.2}\n",
                    values.len()
                ));
            }
            out.push('\n');
        }

        out
    }

    /// Print the summary to stdout.
    pub fn print_summary(&self) {
        print!("{}", self.summary());
    }
}

fn sorted<T>(map: &HashMap<String, T>) -> Vec<(&String, &T)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}
