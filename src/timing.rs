//! Timing-event capture for waveform visualization.
//!
//! [`TimingCapture`] diffs successive circuit snapshots for watched signals
//! and turns transitions into timestamped events. Events queue into a small
//! batch that flushes when full or after one frame's worth of time, then
//! land in a bounded history the host queries to draw timing charts.
//!
//! Capture state has a single owner; there are no background threads. The
//! flush timer is cooperative: entry points check the injected clock.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::circuit::{Circuit, Gate, GateKind};
use crate::time::TimeProvider;
use crate::types::{GateId, PinDirection, PinRef, Signal, TimeMs};

/// Where a timing event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    /// A transition detected between two evaluation snapshots.
    Evaluation,
    /// A clock edge reported through the dedicated clock path.
    Clock,
    /// The first observation of a watched signal.
    Initial,
}

/// One recorded instant at which a watched signal changed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingEvent {
    /// Monotonically increasing event id.
    pub id: u64,
    /// Milliseconds since the capture session origin.
    pub time: TimeMs,
    /// The watched gate.
    pub gate_id: GateId,
    /// The watched pin on that gate.
    pub pin: PinRef,
    /// The signal value after the transition.
    pub value: Signal,
    /// The value before the transition; `None` for initial observations.
    pub previous_value: Option<Signal>,
    /// How the event was detected.
    pub source: EventSource,
}

/// Approximate in-memory footprint of one event, for the stats estimate.
const APPROX_EVENT_BYTES: usize = 96;

/// Trace colors assigned round-robin as signals are watched.
const TRACE_PALETTE: [&str; 8] = [
    "#4fc3f7", "#aed581", "#ffb74d", "#f06292", "#9575cd", "#4db6ac", "#fff176", "#ff8a65",
];

/// Per-signal event series for one waveform row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingTrace {
    /// The watched gate.
    pub gate_id: GateId,
    /// The watched pin.
    pub pin: PinRef,
    /// Time-ordered events for this signal, capped at `max_events`.
    pub events: Vec<TimingEvent>,
    /// Whether the host should draw this trace.
    pub visible: bool,
    /// Assigned display color.
    pub color: String,
    /// Per-trace event cap; oldest events are dropped beyond it.
    pub max_events: usize,
}

/// Tuning knobs for the capture subsystem.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Bounded history size; overflowing trims to the retain fraction.
    #[serde(default = "default_max_history")]
    pub max_history_events: usize,
    /// How much of the history survives an overflow trim.
    #[serde(default = "default_retain_fraction")]
    pub history_retain_fraction: f64,
    /// Batch size that forces an immediate flush.
    #[serde(default = "default_batch_capacity")]
    pub batch_capacity: usize,
    /// Age at which an open batch flushes, in milliseconds (one frame).
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: TimeMs,
    /// Per-trace event cap.
    #[serde(default = "default_trace_capacity")]
    pub trace_capacity: usize,
}

fn default_max_history() -> usize {
    50_000
}

fn default_retain_fraction() -> f64 {
    0.7
}

fn default_batch_capacity() -> usize {
    100
}

fn default_flush_interval() -> TimeMs {
    16.0
}

fn default_trace_capacity() -> usize {
    5_000
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_history_events: default_max_history(),
            history_retain_fraction: default_retain_fraction(),
            batch_capacity: default_batch_capacity(),
            flush_interval_ms: default_flush_interval(),
            trace_capacity: default_trace_capacity(),
        }
    }
}

/// Summary counters for the capture session.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Events currently held in history.
    pub history_events: usize,
    /// Events captured since construction (including evicted ones).
    pub total_captured: u64,
    /// Events evicted by the history bound.
    pub total_evicted: u64,
    /// Events recorded over the trailing 1000 ms.
    pub events_per_second: f64,
    /// Approximate history memory footprint in bytes.
    pub memory_estimate_bytes: usize,
}

/// Callback invoked with each flushed batch.
pub type FlushCallback = Box<dyn FnMut(&[TimingEvent])>;

/// Captures watched-signal transitions into a bounded, queryable history.
///
/// Construct one per capture session and keep it owned by the host; it is
/// not a process-wide singleton.
pub struct TimingCapture {
    config: CaptureConfig,
    time: Rc<dyn TimeProvider>,
    enabled: bool,
    /// Watched signals by gate id.
    watchers: HashMap<GateId, PinRef>,
    /// Waveform rows, one per watched signal.
    traces: HashMap<GateId, TimingTrace>,
    /// Last value seen per watched signal, for the clock path.
    last_seen: HashMap<GateId, Signal>,
    /// Pending batch, flushed on capacity or age.
    buffer: Vec<TimingEvent>,
    /// Provider timestamp at which the current batch opened.
    batch_opened_at: Option<TimeMs>,
    /// Flushed events, time-ordered, bounded.
    history: Vec<TimingEvent>,
    /// Provider timestamp of the capture session origin.
    origin: Option<TimeMs>,
    next_event_id: u64,
    next_color: usize,
    total_captured: u64,
    total_evicted: u64,
    callback: Option<FlushCallback>,
}

impl TimingCapture {
    /// Creates a capture session with the given configuration and clock.
    pub fn new(config: CaptureConfig, time: Rc<dyn TimeProvider>) -> Self {
        Self {
            config,
            time,
            enabled: true,
            watchers: HashMap::new(),
            traces: HashMap::new(),
            last_seen: HashMap::new(),
            buffer: Vec::new(),
            batch_opened_at: None,
            history: Vec::new(),
            origin: None,
            next_event_id: 0,
            next_color: 0,
            total_captured: 0,
            total_evicted: 0,
            callback: None,
        }
    }

    /// Registers the flush callback, replacing any previous one.
    pub fn set_callback(&mut self, callback: FlushCallback) {
        self.callback = Some(callback);
    }

    /// Starts watching one signal of a gate.
    ///
    /// Only watched signals produce events, which keeps capture overhead
    /// bounded on large circuits. Watching assigns the signal a waveform
    /// trace and a palette color.
    pub fn watch_gate(&mut self, gate_id: impl Into<GateId>, pin: PinRef) {
        let gate_id = gate_id.into();
        self.watchers.insert(gate_id.clone(), pin);
        match self.traces.get_mut(&gate_id) {
            Some(trace) => {
                // Re-watching a different pin starts the trace over; its
                // recorded events belong to the previous signal.
                if trace.pin != pin {
                    trace.pin = pin;
                    trace.events.clear();
                    self.last_seen.remove(&gate_id);
                }
            }
            None => {
                let color = TRACE_PALETTE[self.next_color % TRACE_PALETTE.len()].to_string();
                self.next_color += 1;
                self.traces.insert(
                    gate_id.clone(),
                    TimingTrace {
                        gate_id,
                        pin,
                        events: Vec::new(),
                        visible: true,
                        color,
                        max_events: self.config.trace_capacity,
                    },
                );
            }
        }
    }

    /// Stops watching a gate and drops its trace.
    pub fn unwatch_gate(&mut self, gate_id: &str) {
        self.watchers.remove(gate_id);
        self.traces.remove(gate_id);
        self.last_seen.remove(gate_id);
    }

    /// Returns the trace for a watched gate.
    pub fn trace(&self, gate_id: &str) -> Option<&TimingTrace> {
        self.traces.get(gate_id)
    }

    /// Toggles a trace's visibility flag.
    pub fn set_trace_visible(&mut self, gate_id: &str, visible: bool) {
        if let Some(trace) = self.traces.get_mut(gate_id) {
            trace.visible = visible;
        }
    }

    /// Diffs a fresh evaluation snapshot against the previous one.
    ///
    /// Emits one event per watched signal that changed, or an
    /// initial-state event the first time a signal is observed without a
    /// previous snapshot.
    pub fn capture_from_evaluation(&mut self, current: &Circuit, previous: Option<&Circuit>) {
        if !self.enabled {
            return;
        }
        let now = self.relative_now();

        let watched: Vec<(GateId, PinRef)> = self
            .watchers
            .iter()
            .map(|(id, &pin)| (id.clone(), pin))
            .collect();

        for (gate_id, pin) in watched {
            let Some(value) = read_signal(current, &gate_id, pin) else {
                continue;
            };
            let previous_value =
                previous.and_then(|circuit| read_signal(circuit, &gate_id, pin));

            match previous_value {
                None => {
                    self.push_event(now, gate_id, pin, value, None, EventSource::Initial);
                }
                Some(prev) if prev != value => {
                    self.push_event(now, gate_id, pin, value, Some(prev), EventSource::Evaluation);
                }
                Some(_) => {}
            }
        }

        self.maybe_flush();
    }

    /// Records rising/falling edges for free-running clock gates.
    ///
    /// Clocks change value without any other circuit activity, so they get
    /// a dedicated path that compares against the last value this session
    /// observed rather than a snapshot pair.
    pub fn capture_clock_events(&mut self, clock_gates: &[&Gate]) {
        if !self.enabled {
            return;
        }
        let now = self.relative_now();

        for gate in clock_gates {
            if gate.kind != GateKind::Clock {
                continue;
            }
            let Some(&pin) = self.watchers.get(&gate.id) else {
                continue;
            };
            let value = gate.output();
            match self.last_seen.get(&gate.id).copied() {
                None => {
                    self.push_event(now, gate.id.clone(), pin, value, None, EventSource::Initial)
                }
                Some(prev) if prev != value => self.push_event(
                    now,
                    gate.id.clone(),
                    pin,
                    value,
                    Some(prev),
                    EventSource::Clock,
                ),
                Some(_) => {}
            }
        }

        self.maybe_flush();
    }

    /// Flushes the open batch if it has aged past the flush interval.
    ///
    /// Hosts driving a frame loop should call this once per frame so a
    /// trickle of events still reaches the history promptly.
    pub fn poll(&mut self) {
        self.maybe_flush();
    }

    /// Returns history events, time-ordered, optionally windowed.
    ///
    /// The returned vector is a defensive copy; mutating it cannot corrupt
    /// capture state.
    pub fn get_events(&self, start: Option<TimeMs>, end: Option<TimeMs>) -> Vec<TimingEvent> {
        self.history
            .iter()
            .filter(|e| {
                start.map_or(true, |s| e.time >= s) && end.map_or(true, |t| e.time <= t)
            })
            .cloned()
            .collect()
    }

    /// Clears history, entirely or only events before a cutoff.
    pub fn clear_events(&mut self, before: Option<TimeMs>) {
        match before {
            Some(cutoff) => {
                self.history.retain(|e| e.time >= cutoff);
                for trace in self.traces.values_mut() {
                    trace.events.retain(|e| e.time >= cutoff);
                }
            }
            None => {
                self.history.clear();
                for trace in self.traces.values_mut() {
                    trace.events.clear();
                }
            }
        }
    }

    /// Re-bases the session time origin at the current provider time.
    pub fn reset_time_origin(&mut self) {
        self.origin = Some(self.time.now_ms());
    }

    /// Summary counters for the session.
    pub fn stats(&self) -> CaptureStats {
        let now = self.origin.map(|o| self.time.now_ms() - o).unwrap_or(0.0);
        let window_start = now - 1000.0;
        let recent = self
            .history
            .iter()
            .filter(|e| e.time >= window_start)
            .count();

        CaptureStats {
            history_events: self.history.len(),
            total_captured: self.total_captured,
            total_evicted: self.total_evicted,
            events_per_second: recent as f64,
            memory_estimate_bytes: self.history.len() * APPROX_EVENT_BYTES,
        }
    }

    /// Exports capture counters as JSON.
    pub fn export_stats(&self) -> serde_json::Value {
        let stats = self.stats();
        serde_json::json!({
            "history_events": stats.history_events,
            "total_captured": stats.total_captured,
            "total_evicted": stats.total_evicted,
            "events_per_second": stats.events_per_second,
            "memory_estimate_bytes": stats.memory_estimate_bytes,
            "watched_signals": self.watchers.len(),
            "enabled": self.enabled,
        })
    }

    /// Whether capture is currently recording.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables capture. Disabling flushes the open batch so no
    /// buffered events are stranded.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled && self.enabled {
            self.flush();
        }
        self.enabled = enabled;
    }

    /// Terminal teardown: flushes, then clears watchers, traces, buffer
    /// and history. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        self.flush();
        self.enabled = false;
        self.watchers.clear();
        self.traces.clear();
        self.last_seen.clear();
        self.history.clear();
        self.buffer.clear();
        self.batch_opened_at = None;
        debug!("timing capture destroyed");
    }

    /// Milliseconds since the (lazily established) session origin.
    fn relative_now(&mut self) -> TimeMs {
        let now = self.time.now_ms();
        let origin = *self.origin.get_or_insert(now);
        now - origin
    }

    fn push_event(
        &mut self,
        time: TimeMs,
        gate_id: GateId,
        pin: PinRef,
        value: Signal,
        previous_value: Option<Signal>,
        source: EventSource,
    ) {
        let event = TimingEvent {
            id: self.next_event_id,
            time,
            gate_id: gate_id.clone(),
            pin,
            value,
            previous_value,
            source,
        };
        self.next_event_id += 1;
        self.total_captured += 1;
        self.last_seen.insert(gate_id.clone(), value);

        if let Some(trace) = self.traces.get_mut(&gate_id) {
            if trace.events.len() >= trace.max_events {
                trace.events.remove(0);
            }
            trace.events.push(event.clone());
        }

        if self.batch_opened_at.is_none() {
            self.batch_opened_at = Some(self.time.now_ms());
        }
        self.buffer.push(event);

        if self.buffer.len() >= self.config.batch_capacity {
            self.flush();
        }
    }

    fn maybe_flush(&mut self) {
        if let Some(opened) = self.batch_opened_at {
            if self.time.now_ms() - opened >= self.config.flush_interval_ms {
                self.flush();
            }
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            self.batch_opened_at = None;
            return;
        }

        let batch = std::mem::take(&mut self.buffer);
        self.batch_opened_at = None;

        if let Some(callback) = self.callback.as_mut() {
            callback(&batch);
        }

        self.history.extend(batch);

        if self.history.len() > self.config.max_history_events {
            let keep = (self.config.max_history_events as f64
                * self.config.history_retain_fraction) as usize;
            let evicted = self.history.len() - keep;
            self.history.drain(..evicted);
            self.total_evicted += evicted as u64;
            warn!(evicted, keep, "timing history overflow, oldest events dropped");
        }
    }
}

/// Reads one watched signal out of a snapshot.
fn read_signal(circuit: &Circuit, gate_id: &str, pin: PinRef) -> Option<Signal> {
    let gate = circuit.gate(gate_id)?;
    match pin.direction {
        PinDirection::Input => gate.inputs.get(pin.index).copied(),
        PinDirection::Output => gate.outputs.get(pin.index).copied(),
    }
}
