// Descriptive statistics, Welch's t-test and Cohen's d
//
// Means, variances and test statistics are computed in f64 over the raw
// samples. The median comes from aprender's DescriptiveStats (R-7 quantile)
// over a trueno Vector; it is reported, never tested on.
//
// Degenerate inputs do not panic:
// - zero standard error: t, df and p are NaN
// - zero pooled standard deviation: d is NaN, bucket Undefined

use super::distribution::{student_t_quantile, student_t_two_sided_p};
use super::noise_filter::coefficient_of_variation;
use anyhow::Result;
use aprender::stats::DescriptiveStats;
use serde::Serialize;
use std::fmt;
use trueno::Vector;

/// Descriptive statistics of one series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStats {
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation (n-1 denominator)
    pub std_dev: f64,
    /// Confidence interval of the mean, t-distribution with n-1 df
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Coefficient of variation
    pub cv: f64,
}

impl SeriesStats {
    pub fn variance(&self) -> f64 {
        self.std_dev * self.std_dev
    }

    /// Half-width of the confidence interval
    pub fn margin(&self) -> f64 {
        (self.ci_upper - self.ci_lower) / 2.0
    }
}

/// Describe a series; `None` with fewer than 2 samples (variance undefined)
pub fn describe(values: &[f64], confidence_level: f64) -> Option<SeriesStats> {
    let n = values.len();
    if n < 2 {
        return None;
    }

    let nf = n as f64;
    let mean = values.iter().sum::<f64>() / nf;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (nf - 1.0);
    let std_dev = variance.sqrt();

    let t_crit = student_t_quantile(0.5 + confidence_level / 2.0, nf - 1.0);
    let margin = t_crit * std_dev / nf.sqrt();

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let median = median(values).unwrap_or_else(|e| {
        tracing::debug!("median unavailable: {}", e);
        f64::NAN
    });

    Some(SeriesStats {
        n,
        mean,
        std_dev,
        ci_lower: mean - margin,
        ci_upper: mean + margin,
        min,
        max,
        median,
        cv: coefficient_of_variation(values),
    })
}

/// Median using aprender's DescriptiveStats
pub fn median(values: &[f64]) -> Result<f64> {
    let samples: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    let vector = Vector::from_slice(&samples);
    let stats = DescriptiveStats::new(&vector);
    stats
        .quantile(0.5)
        .map(f64::from)
        .map_err(|e| anyhow::anyhow!("Failed to compute median: {}", e))
}

/// Welch's unequal-variance t-test
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WelchTest {
    /// `(mean_baseline - mean_treatment) / se`
    pub t_statistic: f64,
    /// Welch–Satterthwaite degrees of freedom
    pub df: f64,
    /// Two-sided p-value
    pub p_value: f64,
}

pub fn welch_t_test(baseline: &SeriesStats, treatment: &SeriesStats) -> WelchTest {
    let vb = baseline.variance() / baseline.n as f64;
    let vt = treatment.variance() / treatment.n as f64;
    let se2 = vb + vt;

    if !(se2 > 0.0) {
        return WelchTest {
            t_statistic: f64::NAN,
            df: f64::NAN,
            p_value: f64::NAN,
        };
    }

    let t_statistic = (baseline.mean - treatment.mean) / se2.sqrt();
    let df = se2 * se2
        / (vb * vb / (baseline.n as f64 - 1.0) + vt * vt / (treatment.n as f64 - 1.0));

    WelchTest {
        t_statistic,
        df,
        p_value: student_t_two_sided_p(t_statistic, df),
    }
}

/// Cohen's d with the pooled standard deviation
///
/// Positive when the baseline mean is larger.
pub fn cohens_d(baseline: &SeriesStats, treatment: &SeriesStats) -> f64 {
    let nb = baseline.n as f64;
    let nt = treatment.n as f64;
    let pooled_var =
        ((nb - 1.0) * baseline.variance() + (nt - 1.0) * treatment.variance()) / (nb + nt - 2.0);
    let pooled_sd = pooled_var.sqrt();

    if !(pooled_sd > 0.0) {
        return f64::NAN;
    }
    (baseline.mean - treatment.mean) / pooled_sd
}

/// Qualitative bucket for |d|
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSize {
    Negligible,
    Small,
    Medium,
    Large,
    /// d is NaN (zero pooled variance)
    Undefined,
}

impl EffectSize {
    pub fn from_d(d: f64) -> Self {
        let magnitude = d.abs();
        if magnitude.is_nan() {
            EffectSize::Undefined
        } else if magnitude < 0.2 {
            EffectSize::Negligible
        } else if magnitude < 0.5 {
            EffectSize::Small
        } else if magnitude < 0.8 {
            EffectSize::Medium
        } else {
            EffectSize::Large
        }
    }
}

impl fmt::Display for EffectSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EffectSize::Negligible => "negligible",
            EffectSize::Small => "small",
            EffectSize::Medium => "medium",
            EffectSize::Large => "large",
            EffectSize::Undefined => "undefined",
        };
        f.write_str(s)
    }
}
