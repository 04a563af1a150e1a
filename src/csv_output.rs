//! CSV output for latency samples, window counts and comparisons
//!
//! Latency rows use the `scenario,sample,latency_ms` layout the comparison
//! step reads back. Values keep nanosecond resolution (six decimals of a
//! millisecond) so the comparator sees the samples the correlator produced.

use crate::aggregate::WindowCount;
use crate::compare::{ComparisonReport, MetricOutcome, SeriesStats};
use crate::correlate::CorrelationReport;
use crate::gesture::GestureInterval;
use std::collections::HashMap;

/// Escape CSV field (handle commas, quotes, newlines)
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One latency CSV row
#[derive(Debug, Clone, PartialEq)]
pub struct CsvLatencyRow {
    pub scenario: String,
    /// 1-based index within the scenario
    pub sample: usize,
    pub latency_ms: f64,
}

/// Latency sample formatter (`scenario,sample,latency_ms`)
#[derive(Debug, Default)]
pub struct CsvLatencyOutput {
    rows: Vec<CsvLatencyRow>,
    next_sample: HashMap<String, usize>,
}

impl CsvLatencyOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one value; samples are numbered per scenario
    pub fn add_value(&mut self, scenario: &str, latency_ms: f64) {
        let counter = self.next_sample.entry(scenario.to_string()).or_insert(0);
        *counter += 1;
        self.rows.push(CsvLatencyRow {
            scenario: scenario.to_string(),
            sample: *counter,
            latency_ms,
        });
    }

    /// Add every accepted sample of a correlation report
    pub fn add_report(&mut self, report: &CorrelationReport) {
        for sample in &report.samples {
            self.add_value(sample.gesture_kind.scenario(), sample.value_ms());
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn header() -> &'static str {
        "scenario,sample,latency_ms"
    }

    fn format_row(row: &CsvLatencyRow) -> String {
        format!(
            "{},{},{:.6}",
            escape_field(&row.scenario),
            row.sample,
            row.latency_ms
        )
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(Self::header());
        output.push('\n');
        for row in &self.rows {
            output.push_str(&Self::format_row(row));
            output.push('\n');
        }
        output
    }
}

/// Window count formatter
#[derive(Debug, Default)]
pub struct CsvCountOutput {
    rows: Vec<(String, WindowCount)>,
}

impl CsvCountOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_count(&mut self, metric: &str, count: WindowCount) {
        self.rows.push((metric.to_string(), count));
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::from("metric,window_start,window_end,count,rate_per_s,truncated\n");
        for (metric, count) in &self.rows {
            output.push_str(&format!(
                "{},{},{},{},{:.4},{}\n",
                escape_field(metric),
                count.window.start(),
                count.window.end(),
                count.count,
                count.rate_per_s,
                count.truncated
            ));
        }
        output
    }
}

/// Segmented gesture formatter
#[derive(Debug, Default)]
pub struct CsvGestureOutput {
    rows: Vec<(String, usize, GestureInterval)>,
}

impl CsvGestureOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_gestures(&mut self, capture: &str, gestures: &[GestureInterval]) {
        for (index, gesture) in gestures.iter().enumerate() {
            self.rows.push((capture.to_string(), index, gesture.clone()));
        }
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::from(
            "capture,index,kind,start_ts,end_ts,duration_ms,event_count,device,displacement_px\n",
        );
        for (capture, index, g) in &self.rows {
            output.push_str(&format!(
                "{},{},{},{},{},{:.3},{},{},{:.1}\n",
                escape_field(capture),
                index,
                g.kind,
                g.start_ts,
                g.end_ts,
                g.duration_ms(),
                g.event_count,
                escape_field(g.device.as_deref().unwrap_or("")),
                g.displacement_px
            ));
        }
        output
    }
}

/// Comparison formatter: one row per metric
#[derive(Debug)]
pub struct CsvComparisonOutput<'a> {
    report: &'a ComparisonReport,
}

impl<'a> CsvComparisonOutput<'a> {
    pub fn new(report: &'a ComparisonReport) -> Self {
        Self { report }
    }

    fn header() -> String {
        let mut headers: Vec<String> = ["metric", "label", "status", "direction"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        for side in ["baseline", "treatment"] {
            for field in ["n", "mean", "std_dev", "ci_lower", "ci_upper", "median"] {
                headers.push(format!("{}_{}", side, field));
            }
        }
        headers.extend(
            [
                "improvement_pct",
                "t_statistic",
                "df",
                "p_value",
                "cohens_d",
                "effect_size",
                "validated",
                "reason",
            ]
            .map(String::from),
        );
        headers.join(",")
    }

    fn stats_fields(stats: &SeriesStats) -> [String; 6] {
        [
            stats.n.to_string(),
            format!("{:.4}", stats.mean),
            format!("{:.4}", stats.std_dev),
            format!("{:.4}", stats.ci_lower),
            format!("{:.4}", stats.ci_upper),
            format!("{:.4}", stats.median),
        ]
    }

    fn format_outcome(outcome: &MetricOutcome) -> String {
        let mut fields = vec![
            escape_field(outcome.metric()),
            escape_field(outcome.label()),
        ];
        match outcome {
            MetricOutcome::Computed(r) => {
                fields.push("computed".to_string());
                fields.push(escape_field(&r.direction.to_string()));
                fields.extend(Self::stats_fields(&r.baseline));
                fields.extend(Self::stats_fields(&r.treatment));
                fields.extend([
                    format!("{:.2}", r.improvement_pct),
                    format!("{:.4}", r.t_statistic),
                    format!("{:.2}", r.df),
                    format!("{:.6}", r.p_value),
                    format!("{:.4}", r.cohens_d),
                    r.effect_size.to_string(),
                    r.validated.to_string(),
                    String::new(),
                ]);
            }
            MetricOutcome::NotComputable { reason, .. } => {
                fields.push("not_computable".to_string());
                // direction, 12 stats, 6 test columns, validated
                fields.extend(std::iter::repeat(String::new()).take(20));
                fields.push(escape_field(reason));
            }
        }
        fields.join(",")
    }

    pub fn to_csv(&self) -> String {
        let mut output = Self::header();
        output.push('\n');
        for outcome in &self.report.outcomes {
            output.push_str(&Self::format_outcome(outcome));
            output.push('\n');
        }
        output
    }
}
