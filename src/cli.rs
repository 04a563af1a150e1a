//! CLI argument parsing for esmscope

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Output format for analysis results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
    /// Markdown report (compare only)
    Markdown,
}

#[derive(Parser, Debug)]
#[command(name = "esmscope")]
#[command(version)]
#[command(
    about = "Input latency and A/B analysis of Android kernel trace captures",
    long_about = None
)]
pub struct Cli {
    /// Enable debug tracing output to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Run configuration file (TOML)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Gesture-to-consumer-wakeup latency samples
    Latency(LatencyArgs),
    /// Touch IRQ to first input event latency
    IrqLatency(IrqLatencyArgs),
    /// Event counts and rates over a time window
    Count(CountArgs),
    /// List the gestures segmented from each capture
    Gestures(GesturesArgs),
    /// Statistically compare baseline and treatment series
    Compare(CompareArgs),
}

/// Trace captures to read
#[derive(Args, Debug, Clone)]
pub struct CaptureArgs {
    /// Trace capture files (ftrace text)
    #[arg(required = true, value_name = "TRACE")]
    pub traces: Vec<PathBuf>,

    /// Inputs are `getevent -t` text instead of ftrace
    #[arg(long)]
    pub getevent: bool,

    /// Analyze captures whose timestamps go backwards instead of skipping them
    #[arg(long)]
    pub allow_clock_regression: bool,
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write to FILE instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LatencyArgs {
    #[command(flatten)]
    pub capture: CaptureArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Correlation window in milliseconds
    #[arg(long = "window-ms", value_name = "MS")]
    pub window_ms: Option<f64>,

    /// Consumer thread name (repeatable; replaces the configured list)
    #[arg(long = "consumer", value_name = "NAME")]
    pub consumers: Vec<String>,

    /// Latencies at or below this are suspect
    #[arg(long = "min-latency-ms", value_name = "MS")]
    pub min_latency_ms: Option<f64>,

    /// Latencies above this are suspect
    #[arg(long = "max-latency-ms", value_name = "MS")]
    pub max_latency_ms: Option<f64>,

    /// Attribute samples to the scenario named in the capture's filename
    #[arg(long)]
    pub scenario_from_filename: bool,
}

#[derive(Args, Debug)]
pub struct IrqLatencyArgs {
    #[command(flatten)]
    pub capture: CaptureArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Correlation window in milliseconds
    #[arg(long = "window-ms", value_name = "MS")]
    pub window_ms: Option<f64>,
}

#[derive(Args, Debug)]
pub struct CountArgs {
    /// Trace capture file
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,

    /// Filter expression (e.g. -e syscall=poll or -e "wakeup=InputReader;irq=fts_touch")
    #[arg(short = 'e', long = "filter", value_name = "EXPR")]
    pub filters: Vec<String>,

    /// Window start in trace seconds (default: first event)
    #[arg(long, value_name = "SECS")]
    pub start: Option<f64>,

    /// Window end in trace seconds (default: just past the last event)
    #[arg(long, value_name = "SECS")]
    pub end: Option<f64>,

    /// Per-syscall/IRQ/thread breakdown of each count
    #[arg(long)]
    pub breakdown: bool,

    /// Input is `getevent -t` text instead of ftrace
    #[arg(long)]
    pub getevent: bool,

    /// Count a capture whose timestamps go backwards
    #[arg(long)]
    pub allow_clock_regression: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct GesturesArgs {
    #[command(flatten)]
    pub capture: CaptureArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Baseline CSV (repeatable; series are concatenated)
    #[arg(long, required = true, value_name = "CSV")]
    pub baseline: Vec<PathBuf>,

    /// Treatment CSV (repeatable; series are concatenated)
    #[arg(long, required = true, value_name = "CSV")]
    pub treatment: Vec<PathBuf>,

    /// Column holding the values in long-layout CSVs
    #[arg(long, value_name = "NAME")]
    pub value_column: Option<String>,

    #[arg(long, default_value = "baseline")]
    pub baseline_label: String,

    #[arg(long, default_value = "treatment")]
    pub treatment_label: String,

    /// Significance level (overrides config)
    #[arg(long, value_name = "ALPHA")]
    pub alpha: Option<f64>,

    /// Minimum |Cohen's d| for a meaningful effect (overrides config)
    #[arg(long, value_name = "D")]
    pub min_effect: Option<f64>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_latency_defaults() {
        let cli = Cli::parse_from(["esmscope", "latency", "tap.txt"]);
        let Command::Latency(args) = cli.command else {
            panic!("expected latency subcommand");
        };
        assert_eq!(args.capture.traces, vec![PathBuf::from("tap.txt")]);
        assert_eq!(args.output.format, OutputFormat::Text);
        assert!(args.output.output.is_none());
        assert!(args.window_ms.is_none());
        assert!(args.consumers.is_empty());
        assert!(!args.capture.allow_clock_regression);
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_latency_overrides() {
        let cli = Cli::parse_from([
            "esmscope",
            "--debug",
            "latency",
            "a.txt",
            "b.txt",
            "--format",
            "csv",
            "--window-ms",
            "20",
            "--consumer",
            "InputDispatcher",
            "--consumer",
            "InputReader",
            "--allow-clock-regression",
        ]);
        assert!(cli.debug);
        let Command::Latency(args) = cli.command else {
            panic!("expected latency subcommand");
        };
        assert_eq!(args.capture.traces.len(), 2);
        assert_eq!(args.output.format, OutputFormat::Csv);
        assert_eq!(args.window_ms, Some(20.0));
        assert_eq!(args.consumers, vec!["InputDispatcher", "InputReader"]);
        assert!(args.capture.allow_clock_regression);
    }

    #[test]
    fn test_cli_latency_requires_trace() {
        assert!(Cli::try_parse_from(["esmscope", "latency"]).is_err());
    }

    #[test]
    fn test_cli_count_filters() {
        let cli = Cli::parse_from([
            "esmscope",
            "count",
            "run.txt",
            "-e",
            "syscall=poll",
            "--filter",
            "wakeup=InputReader",
            "--start",
            "10.5",
        ]);
        let Command::Count(args) = cli.command else {
            panic!("expected count subcommand");
        };
        assert_eq!(args.filters, vec!["syscall=poll", "wakeup=InputReader"]);
        assert_eq!(args.start, Some(10.5));
        assert!(args.end.is_none());
    }

    #[test]
    fn test_cli_compare() {
        let cli = Cli::parse_from([
            "esmscope",
            "compare",
            "--baseline",
            "base.csv",
            "--treatment",
            "esm.csv",
            "--format",
            "markdown",
            "--config",
            "run.toml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("run.toml")));
        let Command::Compare(args) = cli.command else {
            panic!("expected compare subcommand");
        };
        assert_eq!(args.baseline_label, "baseline");
        assert_eq!(args.treatment_label, "treatment");
        assert_eq!(args.output.format, OutputFormat::Markdown);
    }

    #[test]
    fn test_cli_compare_requires_both_sides() {
        assert!(Cli::try_parse_from(["esmscope", "compare", "--baseline", "b.csv"]).is_err());
    }

    #[test]
    fn test_cli_irq_latency_subcommand_name() {
        let cli = Cli::parse_from(["esmscope", "irq-latency", "run.txt", "--window-ms", "5"]);
        assert!(matches!(cli.command, Command::IrqLatency(ref a) if a.window_ms == Some(5.0)));
    }
}
