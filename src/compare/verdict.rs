// Validation verdict per metric and across a run
//
// A claimed improvement is validated only when all three hold:
// - p < significance_level (Welch's t-test)
// - |d| >= min_effect_size (Cohen's d)
// - the treatment mean moved in the metric's improving direction
//
// NaN in any input to the rule makes it false.

use super::config::ComparisonConfig;
use super::statistics::{cohens_d, describe, welch_t_test, EffectSize, SeriesStats};
use super::ComparisonError;
use crate::metric::{Direction, MetricCatalogue, MetricDefinition, SeriesSet};
use serde::Serialize;
use std::collections::BTreeSet;

/// Statistical comparison of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub metric: String,
    pub label: String,
    pub direction: Direction,
    pub baseline: SeriesStats,
    pub treatment: SeriesStats,
    /// Positive means the treatment is better
    pub improvement_pct: f64,
    pub improved: bool,
    pub t_statistic: f64,
    pub df: f64,
    pub p_value: f64,
    pub cohens_d: f64,
    pub effect_size: EffectSize,
    pub significant: bool,
    pub validated: bool,
    /// Baseline CV above the noise threshold
    pub baseline_noisy: bool,
    /// Treatment CV above the noise threshold
    pub treatment_noisy: bool,
}

/// Outcome for one metric name
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetricOutcome {
    Computed(ComparisonResult),
    NotComputable {
        metric: String,
        label: String,
        reason: String,
    },
}

impl MetricOutcome {
    pub fn metric(&self) -> &str {
        match self {
            MetricOutcome::Computed(result) => &result.metric,
            MetricOutcome::NotComputable { metric, .. } => metric,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            MetricOutcome::Computed(result) => &result.label,
            MetricOutcome::NotComputable { label, .. } => label,
        }
    }

    pub fn result(&self) -> Option<&ComparisonResult> {
        match self {
            MetricOutcome::Computed(result) => Some(result),
            MetricOutcome::NotComputable { .. } => None,
        }
    }

    pub fn is_validated(&self) -> bool {
        self.result().is_some_and(|r| r.validated)
    }
}

/// Compare one metric's baseline and treatment samples
///
/// # Example
/// ```
/// use esmscope::compare::{compare, ComparisonConfig};
/// use esmscope::metric::{Direction, MetricDefinition};
///
/// let metric = MetricDefinition::new("single_tap", Direction::LowerIsBetter);
/// let baseline = [2.1, 2.3, 2.5, 2.2, 2.4];
/// let treatment = [1.7, 1.9, 1.8, 1.6, 2.0];
///
/// let result = compare(&metric, &baseline, &treatment, &ComparisonConfig::default()).unwrap();
/// assert!(result.validated);
/// ```
pub fn compare(
    metric: &MetricDefinition,
    baseline: &[f64],
    treatment: &[f64],
    config: &ComparisonConfig,
) -> Result<ComparisonResult, ComparisonError> {
    let insufficient = || ComparisonError::InsufficientSample {
        baseline_n: baseline.len(),
        treatment_n: treatment.len(),
    };
    let baseline_stats = describe(baseline, config.confidence_level).ok_or_else(insufficient)?;
    let treatment_stats = describe(treatment, config.confidence_level).ok_or_else(insufficient)?;

    let direction = metric.direction;
    let improvement_pct = direction.improvement_pct(baseline_stats.mean, treatment_stats.mean);
    let improved = direction.is_improvement(baseline_stats.mean, treatment_stats.mean);

    let welch = welch_t_test(&baseline_stats, &treatment_stats);
    let d = cohens_d(&baseline_stats, &treatment_stats);

    let significant = welch.p_value < config.significance_level;
    let meaningful = d.abs() >= config.min_effect_size;
    let validated = significant && meaningful && improved;

    if welch.p_value.is_nan() {
        tracing::warn!(metric = %metric.name, "degenerate variance: t-test undefined");
    }

    Ok(ComparisonResult {
        metric: metric.name.clone(),
        label: metric.display_label().to_string(),
        direction,
        baseline_noisy: baseline_stats.cv > config.noise_threshold,
        treatment_noisy: treatment_stats.cv > config.noise_threshold,
        baseline: baseline_stats,
        treatment: treatment_stats,
        improvement_pct,
        improved,
        t_statistic: welch.t_statistic,
        df: welch.df,
        p_value: welch.p_value,
        cohens_d: d,
        effect_size: EffectSize::from_d(d),
        significant,
        validated,
    })
}

/// Comparison of every metric in a run
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub baseline_label: String,
    pub treatment_label: String,
    pub outcomes: Vec<MetricOutcome>,
    pub config: ComparisonConfig,
}

impl ComparisonReport {
    pub fn validated(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.outcomes
            .iter()
            .filter_map(MetricOutcome::result)
            .filter(|r| r.validated)
    }

    pub fn not_validated(&self) -> impl Iterator<Item = &ComparisonResult> {
        self.outcomes
            .iter()
            .filter_map(MetricOutcome::result)
            .filter(|r| !r.validated)
    }

    pub fn not_computable(&self) -> impl Iterator<Item = &MetricOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, MetricOutcome::NotComputable { .. }))
    }

    /// Generate human-readable report
    pub fn to_report_string(&self) -> String {
        let mut report = String::new();
        let validated: Vec<&str> = self.validated().map(|r| r.label.as_str()).collect();

        if validated.is_empty() {
            report.push_str("❌ NO IMPROVEMENT VALIDATED\n\n");
        } else {
            report.push_str(&format!(
                "✅ IMPROVEMENT VALIDATED ({} of {} metrics)\n\n",
                validated.len(),
                self.outcomes.len()
            ));
            report.push_str(&format!("Validated: {}\n", validated.join(", ")));
        }
        report.push_str(&format!(
            "{} vs {}: alpha={} ({}% confidence), min |d|={}\n",
            self.baseline_label,
            self.treatment_label,
            self.config.significance_level,
            (1.0 - self.config.significance_level) * 100.0,
            self.config.min_effect_size
        ));

        let results: Vec<&ComparisonResult> =
            self.outcomes.iter().filter_map(MetricOutcome::result).collect();
        if !results.is_empty() {
            report.push_str("\n📊 Statistical Tests:\n");
            for r in &results {
                let mark = if r.validated { "✅" } else { "❌" };
                report.push_str(&format!(
                    "  {} {} ({}): {:.2} -> {:.2} ({:+.1}%), p={:.4}, d={:.2} ({})\n",
                    mark,
                    r.label,
                    r.direction,
                    r.baseline.mean,
                    r.treatment.mean,
                    r.improvement_pct,
                    r.p_value,
                    r.cohens_d,
                    r.effect_size
                ));
            }
        }

        let noisy: Vec<&str> = results
            .iter()
            .filter(|r| r.baseline_noisy || r.treatment_noisy)
            .map(|r| r.label.as_str())
            .collect();
        if !noisy.is_empty() {
            report.push_str(&format!("\n🔇 Noisy series ({}):\n", noisy.len()));
            for label in noisy {
                report.push_str(&format!("  - {}\n", label));
            }
        }

        let skipped: Vec<&MetricOutcome> = self.not_computable().collect();
        if !skipped.is_empty() {
            report.push_str(&format!("\n⚠️  NOT COMPUTABLE ({}):\n", skipped.len()));
            for outcome in skipped {
                if let MetricOutcome::NotComputable { label, reason, .. } = outcome {
                    report.push_str(&format!("  - {}: {}\n", label, reason));
                }
            }
        }

        report
    }
}

/// Compare every metric present in either set
///
/// Metrics are reported in catalogue order, then by name. A metric with no
/// configured direction or too few samples is `NotComputable`; it never
/// aborts the rest of the run.
pub fn compare_all(
    baseline: &SeriesSet,
    treatment: &SeriesSet,
    catalogue: &MetricCatalogue,
    config: &ComparisonConfig,
) -> Result<ComparisonReport, ComparisonError> {
    config.validate().map_err(ComparisonError::InvalidConfig)?;

    let names: BTreeSet<&str> = baseline
        .metric_names()
        .chain(treatment.metric_names())
        .collect();
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_by_key(|name| (catalogue.rank(name), *name));

    let mut outcomes = Vec::with_capacity(names.len());
    for name in names {
        let outcome = match catalogue.get(name) {
            None => {
                let err = ComparisonError::MissingDirection(name.to_string());
                tracing::warn!(metric = name, "{}", err);
                MetricOutcome::NotComputable {
                    metric: name.to_string(),
                    label: name.to_string(),
                    reason: err.to_string(),
                }
            }
            Some(definition) => {
                match compare(definition, baseline.values(name), treatment.values(name), config) {
                    Ok(result) => {
                        tracing::info!(
                            metric = name,
                            p = result.p_value,
                            d = result.cohens_d,
                            validated = result.validated,
                            "compared metric"
                        );
                        MetricOutcome::Computed(result)
                    }
                    Err(err) => {
                        tracing::warn!(metric = name, "{}", err);
                        MetricOutcome::NotComputable {
                            metric: name.to_string(),
                            label: definition.display_label().to_string(),
                            reason: err.to_string(),
                        }
                    }
                }
            }
        };
        outcomes.push(outcome);
    }

    Ok(ComparisonReport {
        baseline_label: baseline.variant.clone(),
        treatment_label: treatment.variant.clone(),
        outcomes,
        config: config.clone(),
    })
}
