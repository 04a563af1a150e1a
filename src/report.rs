//! Markdown report for a baseline/treatment comparison
//!
//! Layout: summary table, per-metric details, conclusions. Metrics that
//! could not be compared appear in the table with their reason and are
//! listed separately under the conclusions.

use crate::compare::{ComparisonReport, ComparisonResult, MetricOutcome, SeriesStats};
use std::fmt::Write;

/// Format a float, printing `n/a` for NaN
fn num(value: f64, precision: usize) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:.*}", precision, value)
    }
}

fn signed_pct(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{:+.1}%", value)
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

fn write_stats(out: &mut String, heading: &str, stats: &SeriesStats, confidence_pct: f64) {
    let _ = writeln!(out, "**{}**", heading);
    let _ = writeln!(out, "- Mean: {}", num(stats.mean, 2));
    let _ = writeln!(out, "- Std Dev: {}", num(stats.std_dev, 2));
    let _ = writeln!(out, "- Median: {}", num(stats.median, 2));
    let _ = writeln!(
        out,
        "- {}% CI: [{}, {}]",
        confidence_pct,
        num(stats.ci_lower, 2),
        num(stats.ci_upper, 2)
    );
    let _ = writeln!(out, "- Range: [{}, {}]", num(stats.min, 2), num(stats.max, 2));
    let _ = writeln!(out, "- n: {}", stats.n);
    out.push('\n');
}

fn write_summary_row(out: &mut String, outcome: &MetricOutcome) {
    match outcome {
        MetricOutcome::Computed(r) => {
            let sig = if r.significant { "*" } else { "" };
            let _ = writeln!(
                out,
                "| {} | {} (n={}) | {} (n={}) | {} | {}{} | {} (d={}) |",
                r.label,
                num(r.baseline.mean, 2),
                r.baseline.n,
                num(r.treatment.mean, 2),
                r.treatment.n,
                signed_pct(r.improvement_pct),
                num(r.p_value, 4),
                sig,
                r.effect_size,
                num(r.cohens_d, 2)
            );
        }
        MetricOutcome::NotComputable { label, reason, .. } => {
            let _ = writeln!(out, "| {} | Not computable: {} | | | | |", label, reason);
        }
    }
}

fn write_details(out: &mut String, report: &ComparisonReport, r: &ComparisonResult) {
    let confidence_pct = report.config.confidence_level * 100.0;
    let _ = writeln!(out, "### {}\n", r.label);
    write_stats(
        out,
        &format!("Baseline ({})", report.baseline_label),
        &r.baseline,
        confidence_pct,
    );
    write_stats(
        out,
        &format!("Treatment ({})", report.treatment_label),
        &r.treatment,
        confidence_pct,
    );
    if r.baseline_noisy || r.treatment_noisy {
        let _ = writeln!(
            out,
            "> Noisy series: coefficient of variation above {}\n",
            report.config.noise_threshold
        );
    }

    out.push_str("**Statistical Analysis**\n");
    let _ = writeln!(out, "- Direction: {}", r.direction);
    let _ = writeln!(out, "- Improvement: {}", signed_pct(r.improvement_pct));
    let _ = writeln!(out, "- t-statistic: {}", num(r.t_statistic, 3));
    let _ = writeln!(out, "- Degrees of freedom: {}", num(r.df, 1));
    let _ = writeln!(out, "- p-value: {}", num(r.p_value, 4));
    let _ = writeln!(out, "- Cohen's d: {} ({})", num(r.cohens_d, 3), r.effect_size);
    let _ = writeln!(
        out,
        "- Significant (p<{}): {}",
        report.config.significance_level,
        yes_no(r.significant)
    );
    let _ = writeln!(out, "- Validated: {}", yes_no(r.validated));
    out.push('\n');
}

/// Render the full markdown report
pub fn render_markdown(report: &ComparisonReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Input Latency A/B Results\n");
    let _ = writeln!(
        out,
        "Baseline: `{}` / Treatment: `{}`\n",
        report.baseline_label, report.treatment_label
    );

    out.push_str("## Summary\n\n");
    let _ = writeln!(
        out,
        "| Metric | Baseline | {} | Improvement | p-value | Effect Size |",
        report.treatment_label
    );
    out.push_str("|--------|----------|-----|-------------|---------|-------------|\n");
    for outcome in &report.outcomes {
        write_summary_row(&mut out, outcome);
    }
    let _ = writeln!(
        out,
        "\n*p < {} (statistically significant)\n",
        report.config.significance_level
    );

    out.push_str("## Detailed Results\n\n");
    for result in report.outcomes.iter().filter_map(MetricOutcome::result) {
        write_details(&mut out, report, result);
    }

    out.push_str("## Conclusions\n\n");
    let validated: Vec<&ComparisonResult> = report.validated().collect();
    let not_validated: Vec<&ComparisonResult> = report.not_validated().collect();
    let not_computable: Vec<&MetricOutcome> = report.not_computable().collect();

    if validated.is_empty() {
        out.push_str("No claimed improvement was validated.\n\n");
    } else {
        out.push_str("**Validated claims** (significant, meaningful effect, improving direction):\n");
        for r in &validated {
            let _ = writeln!(out, "- {} ({})", r.label, signed_pct(r.improvement_pct));
        }
        out.push('\n');
    }

    if !not_validated.is_empty() {
        out.push_str("**Unvalidated claims** (not significant, negligible effect, or regression):\n");
        for r in &not_validated {
            let _ = writeln!(out, "- {}", r.label);
        }
        out.push('\n');
    }

    if !not_computable.is_empty() {
        out.push_str("**Not computable**:\n");
        for outcome in not_computable {
            if let MetricOutcome::NotComputable { label, reason, .. } = outcome {
                let _ = writeln!(out, "- {}: {}", label, reason);
            }
        }
        out.push('\n');
    }

    out
}
