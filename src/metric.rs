//! Metric series, improvement direction and the metric catalogue
//!
//! A [`SeriesSet`] holds every metric series of one build variant. It is
//! normally loaded from the CSV files the capture tooling writes, in either of
//! two layouts:
//!
//! - long: a `scenario` (or `metric`) column names the series, a value column
//!   (`value`, `latency_ms`, `rate_per_s`, or `--value-column`) holds the
//!   sample, e.g. `scenario,sample,latency_ms`;
//! - wide: every numeric column is its own series, e.g.
//!   `run,system_server_cpu,total_cpu`.
//!
//! Empty cells are skipped, never read as zero.

use crate::correlate::CorrelationReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

const NAME_COLUMNS: [&str; 2] = ["scenario", "metric"];
const VALUE_COLUMNS: [&str; 3] = ["value", "latency_ms", "rate_per_s"];
const INDEX_COLUMNS: [&str; 9] = [
    "sample",
    "run",
    "iteration",
    "index",
    "timestamp",
    "time",
    "window_start",
    "window_end",
    "truncated",
];

/// Which way a metric improves; configured per metric, never inferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

impl Direction {
    /// Percent change in the improving direction
    ///
    /// Positive means the treatment is better. NaN when the baseline mean is 0.
    pub fn improvement_pct(&self, baseline_mean: f64, treatment_mean: f64) -> f64 {
        if baseline_mean == 0.0 {
            return f64::NAN;
        }
        let delta = match self {
            Direction::LowerIsBetter => baseline_mean - treatment_mean,
            Direction::HigherIsBetter => treatment_mean - baseline_mean,
        };
        delta / baseline_mean.abs() * 100.0
    }

    pub fn is_improvement(&self, baseline_mean: f64, treatment_mean: f64) -> bool {
        match self {
            Direction::LowerIsBetter => treatment_mean < baseline_mean,
            Direction::HigherIsBetter => treatment_mean > baseline_mean,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LowerIsBetter => write!(f, "lower is better"),
            Direction::HigherIsBetter => write!(f, "higher is better"),
        }
    }
}

/// A named metric with its improvement direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    pub direction: Direction,
    /// Human-readable name for reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            direction,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Known metrics, in report order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricCatalogue {
    metrics: Vec<MetricDefinition>,
}

impl MetricCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metrics collected by the A/B harness; all improve by decreasing
    pub fn builtin() -> Self {
        use Direction::LowerIsBetter;
        let metrics = vec![
            MetricDefinition::new("single_tap", LowerIsBetter)
                .with_label("Latency - Single Tap (ms)"),
            MetricDefinition::new("scroll", LowerIsBetter).with_label("Latency - Scroll (ms)"),
            MetricDefinition::new("fast_swipe", LowerIsBetter)
                .with_label("Latency - Fast Swipe (ms)"),
            MetricDefinition::new("system_server_cpu", LowerIsBetter)
                .with_label("CPU - system_server (%)"),
            MetricDefinition::new("total_cpu", LowerIsBetter).with_label("CPU - Total (%)"),
            MetricDefinition::new("syscalls_per_100_events", LowerIsBetter)
                .with_label("Syscalls (per 100 events)"),
            MetricDefinition::new("wakeups_per_sec", LowerIsBetter)
                .with_label("Wakeups per second"),
        ];
        Self { metrics }
    }

    /// Add a metric, replacing any existing definition with the same name
    pub fn insert(&mut self, definition: MetricDefinition) {
        match self.metrics.iter_mut().find(|m| m.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.metrics.push(definition),
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn direction(&self, name: &str) -> Option<Direction> {
        self.get(name).map(|m| m.direction)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter()
    }

    /// Position of a metric in report order (unknown metrics sort last)
    pub fn rank(&self, name: &str) -> usize {
        self.metrics
            .iter()
            .position(|m| m.name == name)
            .unwrap_or(self.metrics.len())
    }
}

/// Samples of one metric for one build variant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub metric: String,
    pub variant: String,
    pub values: Vec<f64>,
}

impl MetricSeries {
    pub fn new(metric: impl Into<String>, variant: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            metric: metric.into(),
            variant: variant.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("CSV input has no header row")]
    MissingHeader,

    #[error("CSV header has no value column (tried {tried})")]
    MissingValueColumn { tried: String },

    #[error("line {line}: column '{column}' is not a finite number: '{text}'")]
    InvalidValue {
        line: usize,
        column: String,
        text: String,
    },
}

/// All metric series of one build variant
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesSet {
    pub variant: String,
    series: BTreeMap<String, Vec<f64>>,
}

impl SeriesSet {
    pub fn new(variant: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            series: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, metric: &str, value: f64) {
        self.series.entry(metric.to_string()).or_default().push(value);
    }

    pub fn extend(&mut self, metric: &str, values: impl IntoIterator<Item = f64>) {
        self.series
            .entry(metric.to_string())
            .or_default()
            .extend(values);
    }

    /// Accepted latency samples keyed by scenario name
    pub fn from_correlation(variant: impl Into<String>, report: &CorrelationReport) -> Self {
        let mut set = Self::new(variant);
        for sample in &report.samples {
            set.push(sample.gesture_kind.scenario(), sample.value_ms());
        }
        set
    }

    pub fn get(&self, metric: &str) -> Option<MetricSeries> {
        self.series
            .get(metric)
            .map(|values| MetricSeries::new(metric, self.variant.as_str(), values.clone()))
    }

    pub fn values(&self, metric: &str) -> &[f64] {
        self.series.get(metric).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn metric_names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Load series from CSV text (long or wide layout)
    pub fn from_csv_str(
        variant: impl Into<String>,
        text: &str,
        value_column: Option<&str>,
    ) -> Result<Self, SeriesError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

        let (_, header_line) = lines.next().ok_or(SeriesError::MissingHeader)?;
        let header: Vec<String> = split_csv_line(header_line)
            .into_iter()
            .map(|h| h.to_lowercase())
            .collect();

        let name_col = header
            .iter()
            .position(|h| NAME_COLUMNS.contains(&h.as_str()));
        let value_cols: Vec<usize> = match (name_col, value_column) {
            (_, Some(wanted)) => {
                let wanted = wanted.to_lowercase();
                vec![header.iter().position(|h| *h == wanted).ok_or_else(|| {
                    SeriesError::MissingValueColumn { tried: wanted.clone() }
                })?]
            }
            (Some(_), None) => {
                let col = VALUE_COLUMNS
                    .iter()
                    .find_map(|v| header.iter().position(|h| h == v))
                    .ok_or_else(|| SeriesError::MissingValueColumn {
                        tried: VALUE_COLUMNS.join(", "),
                    })?;
                vec![col]
            }
            (None, None) => header
                .iter()
                .enumerate()
                .filter(|(_, h)| !INDEX_COLUMNS.contains(&h.as_str()))
                .map(|(i, _)| i)
                .collect(),
        };

        let mut set = Self::new(variant);
        for (line_no, line) in lines {
            let fields = split_csv_line(line);
            for &col in &value_cols {
                let Some(cell) = fields.get(col).map(|f| f.trim()).filter(|f| !f.is_empty())
                else {
                    continue;
                };
                let value = cell
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| SeriesError::InvalidValue {
                        line: line_no,
                        column: header[col].clone(),
                        text: cell.to_string(),
                    })?;
                let metric = match name_col {
                    Some(n) => match fields.get(n).map(|f| f.trim()) {
                        Some(name) if !name.is_empty() => name.to_string(),
                        _ => continue,
                    },
                    None => header[col].clone(),
                };
                set.push(&metric, value);
            }
        }

        tracing::debug!(
            variant = %set.variant,
            metrics = set.len(),
            "loaded metric series from CSV"
        );
        Ok(set)
    }

    /// Merge another set of the same variant into this one
    pub fn merge(&mut self, other: SeriesSet) {
        for (metric, values) in other.series {
            self.extend(&metric, values);
        }
    }
}

/// Split one CSV line, honouring double-quoted fields
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
