//! JSON output format for latency, count and comparison runs
//!
//! Non-finite floats (an undefined p-value, an improvement against a zero
//! baseline) serialize as `null`.

use crate::aggregate::WindowCount;
use crate::compare::ComparisonReport;
use crate::correlate::{CorrelationMiss, CorrelationReport, IrqCorrelation, SuspectMatch};
use crate::gesture::{GestureInterval, GestureKind, Segmentation};
use crate::getevent::InputStats;
use crate::trace_event::{ClockRegression, TraceCapture};
use serde::Serialize;

/// Per-capture parse and segmentation summary
#[derive(Debug, Clone, Serialize)]
pub struct JsonCapture {
    pub path: String,
    pub lines: usize,
    pub events: usize,
    pub parse_errors: usize,
    pub skipped_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clock_regression: Option<ClockRegression>,
    /// Left out of the analysis (corrupted capture)
    pub excluded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gestures: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discarded_gestures: Option<usize>,
    /// First touch IRQ to last input event (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate_span_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_stats: Option<InputStats>,
}

impl JsonCapture {
    pub fn from_capture(path: &str, capture: &TraceCapture, excluded: bool) -> Self {
        Self {
            path: path.to_string(),
            lines: capture.lines_read(),
            events: capture.events().len(),
            parse_errors: capture.errors().len(),
            skipped_lines: capture.skipped_lines(),
            clock_regression: capture.clock_regression().copied(),
            excluded,
            gestures: None,
            discarded_gestures: None,
            aggregate_span_ms: None,
            input_stats: None,
        }
    }

    pub fn with_input_stats(mut self, stats: Option<InputStats>) -> Self {
        self.input_stats = stats;
        self
    }

    pub fn with_aggregate_span(mut self, span_ns: Option<u64>) -> Self {
        self.aggregate_span_ms = span_ns.map(|ns| ns as f64 / 1_000_000.0);
        self
    }

    pub fn with_segmentation(mut self, segmentation: &Segmentation) -> Self {
        self.gestures = Some(segmentation.gestures.len());
        self.discarded_gestures = Some(
            segmentation.discarded_incomplete
                + segmentation.discarded_dropped
                + segmentation.discarded_no_contact,
        );
        self
    }
}

/// Latency values of one scenario, in milliseconds at trace resolution
#[derive(Debug, Clone, Serialize)]
pub struct JsonScenario {
    pub scenario: String,
    pub n: usize,
    pub samples_ms: Vec<f64>,
}

/// Root of `latency` output
#[derive(Debug, Clone, Serialize)]
pub struct JsonLatencyOutput {
    pub version: String,
    pub format: String,
    pub captures: Vec<JsonCapture>,
    pub scenarios: Vec<JsonScenario>,
    pub misses: Vec<CorrelationMiss>,
    pub suspects: Vec<SuspectMatch>,
    pub match_rate: f64,
}

impl JsonLatencyOutput {
    pub fn new(captures: Vec<JsonCapture>, report: &CorrelationReport) -> Self {
        let scenarios = GestureKind::ALL
            .iter()
            .filter_map(|&kind| {
                let samples_ms: Vec<f64> = report
                    .samples
                    .iter()
                    .filter(|s| s.gesture_kind == kind)
                    .map(|s| s.value_ms())
                    .collect();
                (!samples_ms.is_empty()).then(|| JsonScenario {
                    scenario: kind.scenario().to_string(),
                    n: samples_ms.len(),
                    samples_ms,
                })
            })
            .collect();

        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "esmscope-latency-v1".to_string(),
            captures,
            scenarios,
            misses: report.misses.clone(),
            suspects: report.suspects.clone(),
            match_rate: report.match_rate(),
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Root of `irq-latency` output
#[derive(Debug, Clone, Serialize)]
pub struct JsonIrqOutput<'a> {
    pub version: String,
    pub format: String,
    pub captures: Vec<JsonCapture>,
    #[serde(flatten)]
    pub correlation: &'a IrqCorrelation,
}

impl<'a> JsonIrqOutput<'a> {
    pub fn new(captures: Vec<JsonCapture>, correlation: &'a IrqCorrelation) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "esmscope-irq-v1".to_string(),
            captures,
            correlation,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// One segmented gesture, tagged with its capture
#[derive(Debug, Clone, Serialize)]
pub struct JsonGesture {
    pub capture: String,
    pub index: usize,
    pub duration_ms: f64,
    #[serde(flatten)]
    pub gesture: GestureInterval,
}

/// Root of `gestures` output
#[derive(Debug, Clone, Serialize)]
pub struct JsonGestureOutput {
    pub version: String,
    pub format: String,
    pub captures: Vec<JsonCapture>,
    pub gestures: Vec<JsonGesture>,
}

impl JsonGestureOutput {
    pub fn new(captures: Vec<JsonCapture>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "esmscope-gestures-v1".to_string(),
            captures,
            gestures: Vec::new(),
        }
    }

    pub fn add_gestures(&mut self, capture: &str, gestures: &[GestureInterval]) {
        self.gestures
            .extend(gestures.iter().enumerate().map(|(index, g)| JsonGesture {
                capture: capture.to_string(),
                index,
                duration_ms: g.duration_ms(),
                gesture: g.clone(),
            }));
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Count for one named filter
#[derive(Debug, Clone, Serialize)]
pub struct JsonCount {
    pub metric: String,
    pub filter: String,
    #[serde(flatten)]
    pub count: WindowCount,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breakdown: Vec<JsonBreakdownEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonBreakdownEntry {
    pub label: String,
    pub count: u64,
}

/// Root of `count` output
#[derive(Debug, Clone, Serialize)]
pub struct JsonCountOutput {
    pub version: String,
    pub format: String,
    pub captures: Vec<JsonCapture>,
    pub counts: Vec<JsonCount>,
}

impl JsonCountOutput {
    pub fn new(captures: Vec<JsonCapture>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "esmscope-count-v1".to_string(),
            captures,
            counts: Vec::new(),
        }
    }

    pub fn add_count(
        &mut self,
        metric: &str,
        filter: &str,
        count: WindowCount,
        breakdown: Vec<(String, u64)>,
    ) {
        self.counts.push(JsonCount {
            metric: metric.to_string(),
            filter: filter.to_string(),
            count,
            breakdown: breakdown
                .into_iter()
                .map(|(label, count)| JsonBreakdownEntry { label, count })
                .collect(),
        });
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Root of `compare` output
#[derive(Debug, Clone, Serialize)]
pub struct JsonComparisonOutput<'a> {
    pub version: String,
    pub format: String,
    pub validated: usize,
    pub metrics: usize,
    #[serde(flatten)]
    pub report: &'a ComparisonReport,
}

impl<'a> JsonComparisonOutput<'a> {
    pub fn new(report: &'a ComparisonReport) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "esmscope-compare-v1".to_string(),
            validated: report.validated().count(),
            metrics: report.outcomes.len(),
            report,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Window;
    use crate::compare::{compare_all, ComparisonConfig};
    use crate::correlate::LatencySample;
    use crate::metric::{MetricCatalogue, SeriesSet};
    use crate::trace_event::Timestamp;

    #[test]
    fn test_capture_summary() {
        let capture = TraceCapture::from_text(
            "# tracer: nop\n\
             InputReader-1234 [002] d..2 100.000100: input_event: dev=fts type=3 code=53 value=500\n\
             InputReader-1234 [002] d..2 100.000050: input_event: dev=fts type=0 code=0 value=0\n",
        );
        let summary = JsonCapture::from_capture("run1.txt", &capture, true);
        assert_eq!(summary.lines, 3);
        assert_eq!(summary.events, 2);
        assert_eq!(summary.skipped_lines, 1);
        assert!(summary.clock_regression.is_some());
        assert!(summary.excluded);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["clock_regression"]["line"], 3);
        assert!(json.get("gestures").is_none());
    }

    #[test]
    fn test_latency_output_groups_by_scenario() {
        let report = CorrelationReport {
            samples: vec![
                LatencySample {
                    gesture_kind: GestureKind::Tap,
                    latency_ns: 2_345_678,
                },
                LatencySample {
                    gesture_kind: GestureKind::Tap,
                    latency_ns: 1_000_000,
                },
            ],
            ..CorrelationReport::default()
        };
        let output = JsonLatencyOutput::new(Vec::new(), &report);
        let json: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();

        assert_eq!(json["format"], "esmscope-latency-v1");
        let scenarios = json["scenarios"].as_array().unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0]["scenario"], "single_tap");
        assert_eq!(scenarios[0]["n"], 2);
        assert_eq!(scenarios[0]["samples_ms"][0], 2.345678);
    }

    #[test]
    fn test_count_output_flattens_window_count() {
        let window = Window::new(Timestamp::from_nanos(0), Timestamp::from_nanos(2_000_000_000)).unwrap();
        let mut output = JsonCountOutput::new(Vec::new());
        output.add_count(
            "polls",
            "syscall=poll",
            WindowCount {
                window,
                count: 10,
                duration_s: 2.0,
                rate_per_s: 5.0,
                truncated: false,
            },
            vec![("ppoll".to_string(), 10)],
        );
        let json: serde_json::Value = serde_json::from_str(&output.to_json().unwrap()).unwrap();
        let count = &json["counts"][0];
        assert_eq!(count["metric"], "polls");
        assert_eq!(count["count"], 10);
        assert_eq!(count["rate_per_s"], 5.0);
        assert_eq!(count["breakdown"][0]["label"], "ppoll");
    }

    #[test]
    fn test_comparison_output_nan_is_null() {
        let mut baseline = SeriesSet::new("baseline");
        let mut treatment = SeriesSet::new("esm");
        baseline.extend("single_tap", [10.0, 10.0, 10.0]);
        treatment.extend("single_tap", [10.0, 10.0, 10.0]);
        let report = compare_all(
            &baseline,
            &treatment,
            &MetricCatalogue::builtin(),
            &ComparisonConfig::default(),
        )
        .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&JsonComparisonOutput::new(&report).to_json().unwrap()).unwrap();
        assert_eq!(json["validated"], 0);
        assert_eq!(json["metrics"], 1);
        assert_eq!(json["baseline_label"], "baseline");
        let outcome = &json["outcomes"][0];
        assert_eq!(outcome["status"], "computed");
        assert!(outcome["cohens_d"].is_null());
        assert_eq!(outcome["validated"], false);
    }
}
