// Noise flagging by coefficient of variation
//
// A series whose spread is large relative to its mean (a busy device, a
// thermal throttle mid-run) can still yield a significant t-test, but the
// result deserves a second look. Series above the CV threshold are flagged,
// never dropped.

use trueno::Vector;

/// Coefficient of variation (population std dev / |mean|)
///
/// Returns 0.0 for empty input or a mean near zero.
///
/// # Example
/// ```
/// use esmscope::compare::coefficient_of_variation;
///
/// assert!(coefficient_of_variation(&[2.1, 2.3, 2.5, 2.2, 2.4]) < 0.1);
/// assert!(coefficient_of_variation(&[1.0, 9.0, 2.0, 12.0, 1.0]) > 0.5);
/// ```
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let samples: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    let vec = Vector::from_slice(&samples);

    // trueno returns Result for mean and stddev
    let Ok(mean) = vec.mean() else {
        return 0.0;
    };
    let Ok(std) = vec.stddev() else {
        return 0.0;
    };

    if mean.abs() < 1e-6 {
        return 0.0;
    }

    f64::from(std / mean.abs())
}

/// Check if a series is noisy under the CV threshold
pub fn is_noisy(values: &[f64], threshold: f64) -> bool {
    coefficient_of_variation(values) > threshold
}
