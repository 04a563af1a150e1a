// Configuration for the statistical comparator
//
// Validation needs all of: significance, a meaningful effect size, and an
// improvement in the metric's configured direction.

use serde::{Deserialize, Serialize};

/// Thresholds for validating a claimed improvement
///
/// # Example
/// ```
/// use esmscope::compare::ComparisonConfig;
///
/// let config = ComparisonConfig::default();
/// assert_eq!(config.significance_level, 0.05);
/// assert_eq!(config.min_effect_size, 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Significance level (alpha) for Welch's t-test
    ///
    /// A metric is significant when p < alpha.
    pub significance_level: f64,

    /// Minimum |Cohen's d| for an effect to count as meaningful
    ///
    /// Default 0.5, the lower edge of a "medium" effect.
    pub min_effect_size: f64,

    /// Confidence level of the per-series mean intervals
    pub confidence_level: f64,

    /// Coefficient of variation above which a series is flagged noisy
    ///
    /// Noisy series are still compared; the flag is a data-quality warning.
    /// - CV = 0.06: `[2.1, 2.3, 2.5, 2.2, 2.4]` (stable)
    /// - CV = 0.9: `[1, 9, 2, 12, 1]` (noisy)
    pub noise_threshold: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            significance_level: 0.05,
            min_effect_size: 0.5,
            confidence_level: 0.95,
            noise_threshold: 0.5,
        }
    }
}

impl ComparisonConfig {
    /// Fewer false claims, more missed improvements
    pub fn strict() -> Self {
        Self {
            significance_level: 0.01,
            min_effect_size: 0.8,
            confidence_level: 0.99,
            noise_threshold: 0.3,
        }
    }

    /// Flags smaller effects as validated
    pub fn permissive() -> Self {
        Self {
            significance_level: 0.10,
            min_effect_size: 0.2,
            confidence_level: 0.90,
            noise_threshold: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(format!(
                "significance_level must be in (0, 1), got {}",
                self.significance_level
            ));
        }

        if !(self.min_effect_size.is_finite() && self.min_effect_size >= 0.0) {
            return Err(format!(
                "min_effect_size must be non-negative, got {}",
                self.min_effect_size
            ));
        }

        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            ));
        }

        if !(self.noise_threshold >= 0.0) {
            return Err(format!(
                "noise_threshold must be non-negative, got {}",
                self.noise_threshold
            ));
        }

        Ok(())
    }
}
