//! Latency correlation between gesture triggers and consumer wakeups
//!
//! Each gesture is paired with the earliest `sched_wakeup` of a consumer
//! thread that lands strictly after its trigger and within the window `W`.
//! Gestures are visited in trigger order and every wakeup can be claimed by
//! at most one gesture, so a single forward sweep over the candidate wakeups
//! suffices: everything behind the cursor is either claimed or too early for
//! every remaining gesture.
//!
//! The same sweep pairs touch-controller interrupts with the first input
//! event that follows them ([`correlate_irq_to_input`]). For multi-event
//! gestures the whole capture is also summarised as one span, from the
//! first touch interrupt to the last input event ([`aggregate_span`]).

use crate::gesture::{GestureInterval, GestureKind};
use crate::trace_event::{EventPayload, Timestamp, TraceEvent};
use serde::{Deserialize, Serialize};

const NANOS_PER_MS: f64 = 1_000_000.0;

/// Longest plausible first-IRQ to last-input span
pub const MAX_AGGREGATE_SPAN_NS: u64 = 10_000_000_000;

/// Handler-name fragments of common touchscreen controllers
pub const TOUCH_IRQ_NAMES: [&str; 7] = [
    "fts",
    "touch",
    "sec_ts",
    "synaptics",
    "goodix",
    "atmel",
    "nt36",
];

/// Correlation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Threads whose wakeup marks input delivery
    pub consumer_threads: Vec<String>,

    /// Correlation window W (ms)
    pub window_ms: f64,

    /// Matches at or below this latency are suspect (ms)
    pub min_latency_ms: f64,

    /// Matches above this latency are suspect (ms); defaults to the window
    pub max_latency_ms: Option<f64>,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            consumer_threads: vec!["InputDispatcher".to_string(), "InputReader".to_string()],
            window_ms: 50.0,
            min_latency_ms: 0.0,
            max_latency_ms: None,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.consumer_threads.is_empty() {
            return Err("consumer_threads must name at least one thread".to_string());
        }
        if !(self.window_ms.is_finite() && self.window_ms > 0.0) {
            return Err(format!("window_ms must be positive, got {}", self.window_ms));
        }
        if !(self.min_latency_ms.is_finite() && self.min_latency_ms >= 0.0) {
            return Err(format!(
                "min_latency_ms must be non-negative, got {}",
                self.min_latency_ms
            ));
        }
        let max = self.effective_max_latency_ms();
        if !max.is_finite() || max <= self.min_latency_ms {
            return Err(format!(
                "max_latency_ms ({}) must exceed min_latency_ms ({})",
                max, self.min_latency_ms
            ));
        }
        Ok(())
    }

    pub fn effective_max_latency_ms(&self) -> f64 {
        self.max_latency_ms.unwrap_or(self.window_ms)
    }

    pub fn window_ns(&self) -> u64 {
        (self.window_ms * NANOS_PER_MS).round() as u64
    }

    fn is_consumer(&self, comm: &str) -> bool {
        self.consumer_threads.iter().any(|t| t == comm)
    }

    /// Whether a matched latency is plausible (`min < ms <= max`)
    pub fn in_range(&self, latency_ns: u64) -> bool {
        let ms = latency_ns as f64 / NANOS_PER_MS;
        ms > self.min_latency_ms && ms <= self.effective_max_latency_ms()
    }
}

/// One per-gesture latency measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySample {
    pub gesture_kind: GestureKind,
    /// Native trace resolution
    pub latency_ns: u64,
}

impl LatencySample {
    pub fn value_ms(&self) -> f64 {
        self.latency_ns as f64 / NANOS_PER_MS
    }
}

/// How one gesture fared in correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GestureOutcome {
    Matched { wakeup_index: usize, latency_ns: u64 },
    /// Matched, but the latency is outside the plausible range
    Suspect { wakeup_index: usize, latency_ns: u64 },
    Missed,
}

impl GestureOutcome {
    /// Event index of the claimed wakeup
    pub fn wakeup_index(&self) -> Option<usize> {
        match *self {
            GestureOutcome::Matched { wakeup_index, .. }
            | GestureOutcome::Suspect { wakeup_index, .. } => Some(wakeup_index),
            GestureOutcome::Missed => None,
        }
    }
}

/// A gesture with no qualifying wakeup inside the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CorrelationMiss {
    pub gesture_index: usize,
    pub kind: GestureKind,
    pub trigger: Timestamp,
}

/// A match rejected as implausible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuspectMatch {
    pub gesture_index: usize,
    pub kind: GestureKind,
    pub trigger: Timestamp,
    pub wakeup_index: usize,
    pub latency_ns: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorrelationReport {
    /// Accepted samples in gesture order
    pub samples: Vec<LatencySample>,
    /// One entry per input gesture, same order as the input
    pub outcomes: Vec<GestureOutcome>,
    pub misses: Vec<CorrelationMiss>,
    pub suspects: Vec<SuspectMatch>,
}

impl CorrelationReport {
    pub fn matched_wakeup(&self, gesture_index: usize) -> Option<usize> {
        self.outcomes.get(gesture_index)?.wakeup_index()
    }

    pub fn values_ms(&self, kind: GestureKind) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| s.gesture_kind == kind)
            .map(LatencySample::value_ms)
            .collect()
    }

    /// Fraction of gestures that produced an accepted sample
    pub fn match_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.samples.len() as f64 / self.outcomes.len() as f64
    }

    /// Append another capture's report, shifting indices past existing ones
    pub fn merge(&mut self, other: CorrelationReport) {
        let offset = self.outcomes.len();
        self.samples.extend(other.samples);
        self.outcomes.extend(other.outcomes);
        self.misses
            .extend(other.misses.into_iter().map(|m| CorrelationMiss {
                gesture_index: m.gesture_index + offset,
                ..m
            }));
        self.suspects
            .extend(other.suspects.into_iter().map(|s| SuspectMatch {
                gesture_index: s.gesture_index + offset,
                ..s
            }));
    }
}

/// Claim-once forward sweep
///
/// `triggers` are `(timestamp, id)` in any order; `candidates` are
/// `(timestamp, id)` in any order. Each trigger, earliest first (ties by
/// position), claims the earliest unclaimed candidate with
/// `trigger < ts <= trigger + window_ns`. Returns the claimed candidate id per
/// trigger position.
fn sweep(triggers: &[Timestamp], candidates: &[(Timestamp, usize)], window_ns: u64) -> Vec<Option<(usize, u64)>> {
    let mut trigger_order: Vec<usize> = (0..triggers.len()).collect();
    trigger_order.sort_by_key(|&i| (triggers[i], i));

    let mut candidates = candidates.to_vec();
    candidates.sort_by_key(|&(ts, id)| (ts, id));

    let mut claimed = vec![None; triggers.len()];
    let mut cursor = 0;

    for i in trigger_order {
        let start = triggers[i];
        while cursor < candidates.len() && candidates[cursor].0 <= start {
            cursor += 1;
        }
        let Some(&(ts, id)) = candidates.get(cursor) else {
            continue;
        };
        let Some(latency) = ts.nanos_since(start) else {
            continue;
        };
        if latency <= window_ns {
            claimed[i] = Some((id, latency));
            cursor += 1;
        }
    }

    claimed
}

/// Pair gestures with consumer wakeups
///
/// `events` is the full capture; only `sched_wakeup` records of configured
/// consumer threads are candidates. Misses and suspect matches are logged
/// individually and never produce a sample.
pub fn correlate(
    gestures: &[GestureInterval],
    events: &[TraceEvent],
    config: &CorrelationConfig,
) -> CorrelationReport {
    let candidates: Vec<(Timestamp, usize)> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.woken_comm().is_some_and(|c| config.is_consumer(c)))
        .map(|(i, e)| (e.timestamp, i))
        .collect();
    let triggers: Vec<Timestamp> = gestures.iter().map(|g| g.start_ts).collect();

    tracing::debug!(
        gestures = gestures.len(),
        wakeups = candidates.len(),
        window_ms = config.window_ms,
        "correlating gestures with consumer wakeups"
    );

    let mut report = CorrelationReport::default();
    for (gesture_index, (gesture, claim)) in gestures
        .iter()
        .zip(sweep(&triggers, &candidates, config.window_ns()))
        .enumerate()
    {
        let outcome = match claim {
            None => {
                tracing::info!(
                    gesture = gesture_index,
                    kind = %gesture.kind,
                    trigger = %gesture.start_ts,
                    "correlation miss: no consumer wakeup within window"
                );
                report.misses.push(CorrelationMiss {
                    gesture_index,
                    kind: gesture.kind,
                    trigger: gesture.start_ts,
                });
                GestureOutcome::Missed
            }
            Some((wakeup_index, latency_ns)) if !config.in_range(latency_ns) => {
                tracing::warn!(
                    gesture = gesture_index,
                    kind = %gesture.kind,
                    trigger = %gesture.start_ts,
                    latency_ms = latency_ns as f64 / NANOS_PER_MS,
                    "suspect latency outside plausible range, sample rejected"
                );
                report.suspects.push(SuspectMatch {
                    gesture_index,
                    kind: gesture.kind,
                    trigger: gesture.start_ts,
                    wakeup_index,
                    latency_ns,
                });
                GestureOutcome::Suspect {
                    wakeup_index,
                    latency_ns,
                }
            }
            Some((wakeup_index, latency_ns)) => {
                report.samples.push(LatencySample {
                    gesture_kind: gesture.kind,
                    latency_ns,
                });
                GestureOutcome::Matched {
                    wakeup_index,
                    latency_ns,
                }
            }
        };
        report.outcomes.push(outcome);
    }

    report
}

/// True if an interrupt handler name belongs to a touchscreen controller
pub fn is_touch_irq(name: &str) -> bool {
    let lower = name.to_lowercase();
    TOUCH_IRQ_NAMES.iter().any(|token| lower.contains(token))
}

/// Touch interrupt paired with the input event it produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IrqInputSample {
    pub irq: u32,
    pub irq_name: String,
    pub irq_ts: Timestamp,
    pub input_ts: Timestamp,
    pub latency_ns: u64,
}

impl IrqInputSample {
    pub fn value_ms(&self) -> f64 {
        self.latency_ns as f64 / NANOS_PER_MS
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IrqCorrelation {
    pub samples: Vec<IrqInputSample>,
    pub touch_irqs: usize,
    pub unmatched: usize,
    /// First touch IRQ to last input event; one capture only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_span_ns: Option<u64>,
}

impl IrqCorrelation {
    /// Fold another capture's result in; spans stay per capture
    pub fn merge(&mut self, other: IrqCorrelation) {
        self.samples.extend(other.samples);
        self.touch_irqs += other.touch_irqs;
        self.unmatched += other.unmatched;
        self.aggregate_span_ns = None;
    }
}

/// Time from the first touch interrupt to the last input event
///
/// `None` when either side is missing, or when the span is negative or
/// longer than [`MAX_AGGREGATE_SPAN_NS`].
pub fn aggregate_span(events: &[TraceEvent]) -> Option<u64> {
    let first_irq = events
        .iter()
        .filter(|e| matches!(&e.payload, EventPayload::IrqEntry { name, .. } if is_touch_irq(name)))
        .map(|e| e.timestamp)
        .min()?;
    let last_input = events
        .iter()
        .filter(|e| matches!(e.payload, EventPayload::Input { .. }))
        .map(|e| e.timestamp)
        .max()?;
    last_input
        .nanos_since(first_irq)
        .filter(|&span| span <= MAX_AGGREGATE_SPAN_NS)
}

/// Pair touch-controller interrupts with the first following input event
///
/// Only `irq_handler_entry` records whose handler name matches
/// [`TOUCH_IRQ_NAMES`] are triggers. Each input event is claimed at most once.
pub fn correlate_irq_to_input(events: &[TraceEvent], window_ms: f64) -> IrqCorrelation {
    let irqs: Vec<(usize, u32, &str)> = events
        .iter()
        .enumerate()
        .filter_map(|(i, e)| match &e.payload {
            EventPayload::IrqEntry { irq, name } if is_touch_irq(name) => {
                Some((i, *irq, name.as_str()))
            }
            _ => None,
        })
        .collect();
    let inputs: Vec<(Timestamp, usize)> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e.payload, EventPayload::Input { .. }))
        .map(|(i, e)| (e.timestamp, i))
        .collect();
    let triggers: Vec<Timestamp> = irqs.iter().map(|&(i, _, _)| events[i].timestamp).collect();
    let window_ns = (window_ms * NANOS_PER_MS).round() as u64;

    let mut result = IrqCorrelation {
        touch_irqs: irqs.len(),
        aggregate_span_ns: aggregate_span(events),
        ..IrqCorrelation::default()
    };
    for (&(index, irq, name), claim) in irqs.iter().zip(sweep(&triggers, &inputs, window_ns)) {
        match claim {
            Some((input_index, latency_ns)) => result.samples.push(IrqInputSample {
                irq,
                irq_name: name.to_string(),
                irq_ts: events[index].timestamp,
                input_ts: events[input_index].timestamp,
                latency_ns,
            }),
            None => {
                tracing::debug!(irq, name, ts = %events[index].timestamp, "touch IRQ without input event");
                result.unmatched += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture(start_us: u64, kind: GestureKind) -> GestureInterval {
        GestureInterval {
            kind,
            start_ts: Timestamp::from_micros(start_us),
            end_ts: Timestamp::from_micros(start_us + 100),
            event_count: 4,
            device: None,
            displacement_px: 0.0,
        }
    }

    fn wakeup(us: u64, comm: &str) -> TraceEvent {
        TraceEvent {
            timestamp: Timestamp::from_micros(us),
            thread_name: "<idle>".to_string(),
            pid: 0,
            cpu: Some(0),
            payload: EventPayload::SchedWakeup {
                woken_comm: comm.to_string(),
                woken_pid: 1301,
            },
        }
    }

    fn irq(us: u64, name: &str) -> TraceEvent {
        TraceEvent {
            timestamp: Timestamp::from_micros(us),
            thread_name: "irq".to_string(),
            pid: 0,
            cpu: Some(0),
            payload: EventPayload::IrqEntry {
                irq: 123,
                name: name.to_string(),
            },
        }
    }

    fn input(us: u64) -> TraceEvent {
        TraceEvent {
            timestamp: Timestamp::from_micros(us),
            thread_name: "InputReader".to_string(),
            pid: 1,
            cpu: Some(0),
            payload: EventPayload::Input {
                dev: None,
                ev_type: 3,
                code: 57,
                value: 1,
            },
        }
    }

    #[test]
    fn test_earliest_wakeup_wins() {
        let gestures = [gesture(1_000_000, GestureKind::Tap)];
        let events = [
            wakeup(1_002_000, "InputDispatcher"),
            wakeup(1_003_000, "InputReader"),
        ];
        let report = correlate(&gestures, &events, &CorrelationConfig::default());
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.samples[0].latency_ns, 2_000_000);
        assert_eq!(report.matched_wakeup(0), Some(0));
    }

    #[test]
    fn test_unrelated_threads_ignored() {
        let gestures = [gesture(1_000_000, GestureKind::Tap)];
        let events = [
            wakeup(1_000_500, "RenderThread"),
            wakeup(1_004_000, "InputDispatcher"),
        ];
        let report = correlate(&gestures, &events, &CorrelationConfig::default());
        assert_eq!(report.matched_wakeup(0), Some(1));
    }

    #[test]
    fn test_wakeup_at_trigger_is_not_a_match() {
        let gestures = [gesture(1_000_000, GestureKind::Tap)];
        let events = [wakeup(1_000_000, "InputDispatcher")];
        let report = correlate(&gestures, &events, &CorrelationConfig::default());
        assert!(report.samples.is_empty());
        assert_eq!(report.misses.len(), 1);
    }

    #[test]
    fn test_miss_outside_window_produces_no_sample() {
        let gestures = [gesture(1_000_000, GestureKind::Scroll)];
        let events = [wakeup(1_060_000, "InputDispatcher")];
        let report = correlate(&gestures, &events, &CorrelationConfig::default());
        assert!(report.samples.is_empty());
        assert_eq!(report.outcomes, vec![GestureOutcome::Missed]);
        assert_eq!(report.misses[0].kind, GestureKind::Scroll);
        assert_eq!(report.misses[0].trigger, Timestamp::from_micros(1_000_000));
    }

    #[test]
    fn test_window_edge_is_inclusive() {
        let gestures = [gesture(1_000_000, GestureKind::Tap)];
        let events = [wakeup(1_050_000, "InputDispatcher")];
        let report = correlate(&gestures, &events, &CorrelationConfig::default());
        assert_eq!(report.samples.len(), 1);
    }

    #[test]
    fn test_overlapping_windows_claim_once() {
        // Two rapid taps share one wakeup; the first tap gets it
        let gestures = [
            gesture(1_000_000, GestureKind::Tap),
            gesture(1_001_000, GestureKind::Tap),
        ];
        let events = [wakeup(1_002_000, "InputDispatcher")];
        let report = correlate(&gestures, &events, &CorrelationConfig::default());
        assert_eq!(report.matched_wakeup(0), Some(0));
        assert_eq!(report.matched_wakeup(1), None);
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.misses.len(), 1);
        assert_eq!(report.misses[0].gesture_index, 1);
    }

    #[test]
    fn test_second_gesture_takes_next_wakeup() {
        let gestures = [
            gesture(1_000_000, GestureKind::Tap),
            gesture(1_001_000, GestureKind::Tap),
        ];
        let events = [
            wakeup(1_002_000, "InputDispatcher"),
            wakeup(1_003_000, "InputDispatcher"),
        ];
        let report = correlate(&gestures, &events, &CorrelationConfig::default());
        assert_eq!(report.matched_wakeup(0), Some(0));
        assert_eq!(report.matched_wakeup(1), Some(1));
        assert_eq!(report.samples[1].latency_ns, 2_000_000);
    }

    #[test]
    fn test_suspect_consumes_wakeup_without_sample() {
        let config = CorrelationConfig {
            max_latency_ms: Some(10.0),
            ..CorrelationConfig::default()
        };
        let gestures = [gesture(1_000_000, GestureKind::Tap)];
        let events = [wakeup(1_030_000, "InputDispatcher")];
        let report = correlate(&gestures, &events, &config);
        assert!(report.samples.is_empty());
        assert!(report.misses.is_empty());
        assert_eq!(report.suspects.len(), 1);
        assert_eq!(report.matched_wakeup(0), Some(0));
    }

    #[test]
    fn test_sample_keeps_native_resolution() {
        let sample = LatencySample {
            gesture_kind: GestureKind::Tap,
            latency_ns: 4_000,
        };
        assert_eq!(sample.value_ms(), 0.004);
    }

    #[test]
    fn test_merge_offsets_indices() {
        let gestures = [gesture(1_000_000, GestureKind::Tap)];
        let mut first = correlate(&gestures, &[], &CorrelationConfig::default());
        let second = correlate(&gestures, &[], &CorrelationConfig::default());
        first.merge(second);
        assert_eq!(first.outcomes.len(), 2);
        assert_eq!(first.misses[1].gesture_index, 1);
        assert_eq!(first.match_rate(), 0.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(CorrelationConfig::default().validate().is_ok());
        let no_threads = CorrelationConfig {
            consumer_threads: vec![],
            ..CorrelationConfig::default()
        };
        assert!(no_threads.validate().is_err());
        let inverted = CorrelationConfig {
            min_latency_ms: 20.0,
            max_latency_ms: Some(10.0),
            ..CorrelationConfig::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_touch_irq_names() {
        assert!(is_touch_irq("fts_touch"));
        assert!(is_touch_irq("GOODIX_TS"));
        assert!(is_touch_irq("nt36xxx"));
        assert!(!is_touch_irq("arch_timer"));
    }

    #[test]
    fn test_irq_to_input() {
        let events = [
            irq(1_000_000, "fts_touch"),
            irq(1_000_100, "arch_timer"),
            input(1_000_800),
            input(1_000_900),
            irq(2_000_000, "fts_touch"),
        ];
        let result = correlate_irq_to_input(&events, 100.0);
        assert_eq!(result.touch_irqs, 2);
        assert_eq!(result.samples.len(), 1);
        assert_eq!(result.samples[0].latency_ns, 800_000);
        assert_eq!(result.unmatched, 1);
    }

    #[test]
    fn test_aggregate_span_first_irq_to_last_input() {
        let events = [
            irq(1_000_000, "fts_touch"),
            input(1_000_800),
            irq(1_016_000, "fts_touch"),
            input(1_016_700),
            input(1_250_000),
            irq(1_250_100, "arch_timer"),
        ];
        assert_eq!(aggregate_span(&events), Some(250_000_000));
        assert_eq!(
            correlate_irq_to_input(&events, 100.0).aggregate_span_ns,
            Some(250_000_000)
        );
    }

    #[test]
    fn test_aggregate_span_rejects_implausible() {
        // Input before any touch interrupt
        assert_eq!(aggregate_span(&[input(1_000_000), irq(1_000_500, "fts")]), None);
        assert_eq!(aggregate_span(&[input(1_000_000)]), None);
        assert_eq!(aggregate_span(&[irq(1_000_000, "fts")]), None);
        // Longer than ten seconds
        assert_eq!(aggregate_span(&[irq(1_000_000, "fts"), input(11_000_001)]), None);
        assert_eq!(
            aggregate_span(&[irq(1_000_000, "fts"), input(11_000_000)]),
            Some(MAX_AGGREGATE_SPAN_NS)
        );
    }

    #[test]
    fn test_irq_merge_keeps_totals_drops_span() {
        let events = [irq(1_000_000, "fts_touch"), input(1_000_300)];
        let mut combined = IrqCorrelation::default();
        combined.merge(correlate_irq_to_input(&events, 100.0));
        combined.merge(correlate_irq_to_input(&events, 100.0));
        assert_eq!(combined.touch_irqs, 2);
        assert_eq!(combined.samples.len(), 2);
        assert_eq!(combined.aggregate_span_ns, None);
    }
}
