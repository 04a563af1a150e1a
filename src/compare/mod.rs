// Statistical comparison of baseline and treatment builds
//
// For each metric: descriptive statistics with t-based confidence intervals,
// Welch's unequal-variance t-test, Cohen's d, and a validation verdict that
// requires significance, a meaningful effect and the configured improvement
// direction together.
//
// Implementation:
// - f64 Student-t CDF/quantile (incomplete beta, Lanczos ln Γ) for p-values
//   and confidence intervals
// - aprender's DescriptiveStats for the median
// - trueno Vector for the coefficient of variation behind the noise flag

mod config;
mod distribution;
mod noise_filter;
mod statistics;
mod verdict;

pub use config::ComparisonConfig;
pub use distribution::{
    ln_gamma, regularized_incomplete_beta, student_t_cdf, student_t_quantile,
    student_t_two_sided_p,
};
pub use noise_filter::{coefficient_of_variation, is_noisy};
pub use statistics::{cohens_d, describe, median, welch_t_test, EffectSize, SeriesStats, WelchTest};
pub use verdict::{compare, compare_all, ComparisonReport, ComparisonResult, MetricOutcome};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComparisonError {
    #[error("insufficient data: need at least 2 samples per series (baseline n={baseline_n}, treatment n={treatment_n})")]
    InsufficientSample {
        baseline_n: usize,
        treatment_n: usize,
    },

    #[error("no improvement direction configured for metric '{0}'")]
    MissingDirection(String),

    #[error("invalid comparison config: {0}")]
    InvalidConfig(String),
}
