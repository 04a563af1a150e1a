//! Counting aggregator: event counts and rates over half-open time windows
//!
//! A window `[start, end)` counts the events accepted by an [`EventFilter`]
//! and derives `count / duration` as a rate. A filter matching nothing yields
//! a zero count. When the capture's last event falls short of `end` by more
//! than the truncation tolerance the ring buffer probably overflowed, and the
//! window is flagged so the caller can discard the run.

use crate::filter::EventFilter;
use crate::syscalls::syscall_label;
use crate::trace_event::{EventPayload, Timestamp, TraceEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("empty or inverted window [{start}, {end})")]
    EmptyWindow { start: Timestamp, end: Timestamp },

    #[error("no events to derive a window from")]
    NoEvents,
}

/// Aggregation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Allowed gap between the last event and the window end (ms)
    pub truncation_tolerance_ms: f64,

    /// Named filter expressions, e.g. `polls = "syscall=poll"`
    pub filters: BTreeMap<String, String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            truncation_tolerance_ms: 100.0,
            filters: BTreeMap::new(),
        }
    }
}

impl AggregationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.truncation_tolerance_ms.is_finite() && self.truncation_tolerance_ms >= 0.0) {
            return Err(format!(
                "truncation_tolerance_ms must be non-negative, got {}",
                self.truncation_tolerance_ms
            ));
        }
        for (name, expr) in &self.filters {
            EventFilter::from_expr(expr).map_err(|e| format!("filter '{}': {}", name, e))?;
        }
        Ok(())
    }

    pub fn tolerance_ns(&self) -> u64 {
        (self.truncation_tolerance_ms * 1e6).round() as u64
    }
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    start: Timestamp,
    end: Timestamp,
}

impl Window {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, AggregateError> {
        if end <= start {
            return Err(AggregateError::EmptyWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn from_secs(start: f64, end: f64) -> Result<Self, AggregateError> {
        Self::new(Timestamp::from_secs_f64(start), Timestamp::from_secs_f64(end))
    }

    /// Smallest window containing every event (last event included via +1ns)
    pub fn covering(events: &[TraceEvent]) -> Result<Self, AggregateError> {
        let start = events.iter().map(|e| e.timestamp).min();
        let end = events.iter().map(|e| e.timestamp).max();
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end.saturating_add_nanos(1)),
            _ => Err(AggregateError::NoEvents),
        }
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Timestamp {
        self.end
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn duration_ns(&self) -> u64 {
        self.end.as_nanos() - self.start.as_nanos()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ns() as f64 / 1e9
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Count and rate for one filter over one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowCount {
    pub window: Window,
    pub count: u64,
    pub duration_s: f64,
    pub rate_per_s: f64,
    /// Capture ends before the window does (ring buffer overflow)
    pub truncated: bool,
}

/// Count events accepted by `filter` inside `window`
///
/// `events` is the whole capture; its latest timestamp decides truncation,
/// so a capture kept despite a clock regression is judged by how far it
/// actually reaches.
pub fn count(
    events: &[TraceEvent],
    window: Window,
    filter: &EventFilter,
    tolerance_ns: u64,
) -> WindowCount {
    let count = events
        .iter()
        .filter(|e| window.contains(e.timestamp) && filter.matches(e))
        .count() as u64;

    let latest = events.iter().map(|e| e.timestamp).max();
    let truncated = match latest {
        Some(latest) => latest < window.end.saturating_sub_nanos(tolerance_ns),
        None => true,
    };
    if truncated {
        tracing::warn!(
            window = %window,
            last = %latest.unwrap_or_default(),
            filter = %filter,
            "capture ends before window; trace buffer may have overflowed"
        );
    }

    let duration_s = window.duration_secs();
    WindowCount {
        window,
        count,
        duration_s,
        rate_per_s: count as f64 / duration_s,
        truncated,
    }
}

/// `numerator / denominator * per`, or `None` for a zero denominator
///
/// `ratio(syscalls, input_events, 100.0)` is "syscalls per 100 input events".
pub fn ratio(numerator: u64, denominator: u64, per: f64) -> Option<f64> {
    (denominator != 0).then(|| numerator as f64 / denominator as f64 * per)
}

/// Label an event for per-item breakdowns
pub fn event_label(event: &TraceEvent) -> String {
    match &event.payload {
        EventPayload::SysEnter { syscall_nr } => syscall_label(*syscall_nr),
        EventPayload::IrqEntry { irq, name } => format!("irq {} ({})", irq, name),
        EventPayload::IrqExit { irq, .. } => format!("irq {} exit", irq),
        EventPayload::SchedWakeup { woken_comm, .. } => format!("wakeup {}", woken_comm),
        EventPayload::Input { ev_type, code, .. } => format!("input {}/{}", ev_type, code),
        EventPayload::Esm { tracepoint, .. } => tracepoint.clone(),
    }
}

/// Per-label counts of matching events, sorted by count (descending) then label
pub fn breakdown(events: &[TraceEvent], window: Window, filter: &EventFilter) -> Vec<(String, u64)> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for event in events
        .iter()
        .filter(|e| window.contains(e.timestamp) && filter.matches(e))
    {
        *counts.entry(event_label(event)).or_insert(0) += 1;
    }

    let mut sorted: Vec<(String, u64)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}
