// Baseline/treatment comparison from the CSV files a capture run leaves
// behind, through to the rendered report

use esmscope::compare::{compare_all, ComparisonConfig, EffectSize, MetricOutcome};
use esmscope::config::RunConfig;
use esmscope::csv_output::{CsvComparisonOutput, CsvLatencyOutput};
use esmscope::json_output::JsonComparisonOutput;
use esmscope::metric::{MetricCatalogue, SeriesSet};
use esmscope::report::render_markdown;

const BASELINE_TAPS: [f64; 5] = [2.1, 2.3, 2.5, 2.2, 2.4];
const TREATMENT_TAPS: [f64; 5] = [1.7, 1.9, 1.8, 1.6, 2.0];

fn latency_csv(values: &[f64]) -> String {
    let mut output = CsvLatencyOutput::new();
    for &v in values {
        output.add_value("single_tap", v);
    }
    output.to_csv()
}

fn load(variant: &str, csv: &str) -> SeriesSet {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(format!("{}.csv", variant));
    std::fs::write(&path, csv).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    SeriesSet::from_csv_str(variant, &text, None).unwrap()
}

#[test]
fn test_latency_csv_round_trip_validates_improvement() {
    let baseline = load("epoll", &latency_csv(&BASELINE_TAPS));
    let treatment = load("esm", &latency_csv(&TREATMENT_TAPS));
    let report = compare_all(
        &baseline,
        &treatment,
        &MetricCatalogue::builtin(),
        &ComparisonConfig::default(),
    )
    .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    let result = report.outcomes[0].result().unwrap();
    assert_eq!(result.metric, "single_tap");
    assert!((result.t_statistic - 5.0).abs() < 1e-9);
    assert!((result.df - 8.0).abs() < 1e-9);
    assert!((result.p_value - 0.001_052_83).abs() < 1e-6);
    assert!((result.cohens_d - 10.0_f64.sqrt()).abs() < 1e-9);
    assert_eq!(result.effect_size, EffectSize::Large);
    assert!((result.improvement_pct - 21.739_130_434_782_6).abs() < 1e-9);
    assert!(result.validated);
}

#[test]
fn test_markdown_report_end_to_end() {
    let baseline = load("epoll", &latency_csv(&BASELINE_TAPS));
    let treatment = load("ESM", &latency_csv(&TREATMENT_TAPS));
    let report = compare_all(
        &baseline,
        &treatment,
        &MetricCatalogue::builtin(),
        &ComparisonConfig::default(),
    )
    .unwrap();
    let markdown = render_markdown(&report);

    assert!(markdown.starts_with("# Input Latency A/B Results\n"));
    assert!(markdown.contains("| Metric | Baseline | ESM | Improvement | p-value | Effect Size |"));
    assert!(markdown.contains(
        "| Latency - Single Tap (ms) | 2.30 (n=5) | 1.80 (n=5) | +21.7% | 0.0011* | large (d=3.16) |"
    ));
    assert!(markdown.contains("- Degrees of freedom: 8.0"));
    assert!(markdown.contains("**Validated claims**"));
    assert!(markdown.contains("- Latency - Single Tap (ms) (+21.7%)"));
}

#[test]
fn test_regression_is_never_validated() {
    // Treatment is slower: significant and large, but the wrong way
    let baseline = load("epoll", &latency_csv(&TREATMENT_TAPS));
    let treatment = load("esm", &latency_csv(&BASELINE_TAPS));
    let report = compare_all(
        &baseline,
        &treatment,
        &MetricCatalogue::builtin(),
        &ComparisonConfig::default(),
    )
    .unwrap();

    let result = report.outcomes[0].result().unwrap();
    assert!(result.significant);
    assert_eq!(result.effect_size, EffectSize::Large);
    assert!(!result.improved);
    assert!(!result.validated);
    assert!(result.improvement_pct < 0.0);
    assert_eq!(report.validated().count(), 0);
    assert!(render_markdown(&report).contains("No claimed improvement was validated."));
}

#[test]
fn test_wide_cpu_csv_with_missing_cells() {
    let baseline = load(
        "epoll",
        "run,system_server_cpu,total_cpu\n\
         1,12.0,40.0\n\
         2,12.5,41.0\n\
         3,11.8,39.5\n\
         4,12.2,40.5\n",
    );
    let treatment = load(
        "esm",
        "run,system_server_cpu,total_cpu\n\
         1,12.1,38.0\n\
         2,12.4,\n\
         3,11.9,\n\
         4,12.3,\n",
    );
    assert_eq!(treatment.values("total_cpu"), &[38.0]);

    let report = compare_all(
        &baseline,
        &treatment,
        &MetricCatalogue::builtin(),
        &ComparisonConfig::default(),
    )
    .unwrap();
    let names: Vec<&str> = report.outcomes.iter().map(MetricOutcome::metric).collect();
    assert_eq!(names, vec!["system_server_cpu", "total_cpu"]);

    let cpu = report.outcomes[0].result().unwrap();
    assert_eq!(cpu.baseline.n, 4);
    assert!(!cpu.significant);
    assert!(!cpu.validated);

    match &report.outcomes[1] {
        MetricOutcome::NotComputable { label, reason, .. } => {
            assert_eq!(label, "CPU - Total (%)");
            assert!(reason.contains("insufficient data"));
            assert!(reason.contains("treatment n=1"));
        }
        other => panic!("expected not computable, got {:?}", other),
    }

    let csv = CsvComparisonOutput::new(&report).to_csv();
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.lines().nth(2).unwrap().starts_with("total_cpu,CPU - Total (%),not_computable,"));
}

#[test]
fn test_configured_higher_is_better_metric() {
    let config = RunConfig::from_toml_str(
        r#"
[[metric]]
name = "frames_per_sec"
direction = "higher_is_better"
label = "Frames per second"
"#,
    )
    .unwrap();

    let baseline = load(
        "epoll",
        "metric,value\nframes_per_sec,50\nframes_per_sec,52\nframes_per_sec,51\nframes_per_sec,49\nframes_per_sec,53\n",
    );
    let treatment = load(
        "esm",
        "metric,value\nframes_per_sec,58\nframes_per_sec,60\nframes_per_sec,59\nframes_per_sec,57\nframes_per_sec,61\n",
    );
    let report = compare_all(&baseline, &treatment, &config.catalogue(), &config.comparison).unwrap();
    let result = report.outcomes[0].result().unwrap();
    assert_eq!(result.label, "Frames per second");
    assert!((result.t_statistic + 8.0).abs() < 1e-9);
    assert!(result.cohens_d < 0.0);
    assert!(result.improved);
    assert!(result.validated);

    // Without the configured direction the metric is reported, not guessed
    let unconfigured = compare_all(
        &baseline,
        &treatment,
        &MetricCatalogue::builtin(),
        &ComparisonConfig::default(),
    )
    .unwrap();
    assert!(matches!(
        &unconfigured.outcomes[0],
        MetricOutcome::NotComputable { reason, .. } if reason.contains("no improvement direction")
    ));
}

#[test]
fn test_json_report_counts_validated_metrics() {
    let mut baseline = load("epoll", &latency_csv(&BASELINE_TAPS));
    let mut treatment = load("esm", &latency_csv(&TREATMENT_TAPS));
    baseline.extend("scroll", [5.0, 5.2, 4.9, 5.1]);
    treatment.extend("scroll", [5.1, 5.0, 5.2, 4.9]);
    let report = compare_all(
        &baseline,
        &treatment,
        &MetricCatalogue::builtin(),
        &ComparisonConfig::default(),
    )
    .unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&JsonComparisonOutput::new(&report).to_json().unwrap()).unwrap();
    assert_eq!(json["format"], "esmscope-compare-v1");
    assert_eq!(json["metrics"], 2);
    assert_eq!(json["validated"], 1);
    assert_eq!(json["outcomes"][0]["metric"], "single_tap");
    assert_eq!(json["outcomes"][1]["metric"], "scroll");
    assert_eq!(json["outcomes"][1]["validated"], false);
}
