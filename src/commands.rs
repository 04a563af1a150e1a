//! Subcommand execution
//!
//! Each subcommand loads its inputs, runs the analysis and renders the
//! requested output format to a string; `run` writes it to stdout or the
//! `--output` file.

use crate::aggregate::{self, Window};
use crate::cli::{
    CaptureArgs, Cli, Command, CompareArgs, CountArgs, GesturesArgs, IrqLatencyArgs, LatencyArgs,
    OutputArgs, OutputFormat,
};
use crate::compare::{compare_all, describe};
use crate::config::RunConfig;
use crate::correlate::{correlate, correlate_irq_to_input, CorrelationReport, IrqCorrelation};
use crate::csv_output::{CsvComparisonOutput, CsvCountOutput, CsvGestureOutput, CsvLatencyOutput};
use crate::filter::EventFilter;
use crate::gesture::{segment, GestureKind, Segmentation};
use crate::getevent::{self, InputStats};
use crate::json_output::{
    JsonCapture, JsonComparisonOutput, JsonCountOutput, JsonGestureOutput, JsonIrqOutput,
    JsonLatencyOutput,
};
use crate::metric::SeriesSet;
use crate::report::render_markdown;
use crate::trace_event::{Timestamp, TraceCapture};
use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// A parsed capture and whether it takes part in the analysis
struct LoadedCapture {
    label: String,
    capture: TraceCapture,
    excluded: bool,
}

impl LoadedCapture {
    fn summary(&self) -> JsonCapture {
        JsonCapture::from_capture(&self.label, &self.capture, self.excluded)
    }
}

fn load_capture(path: &Path, getevent_text: bool) -> Result<TraceCapture> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open trace capture {}", path.display()))?;
    let reader = BufReader::new(file);
    let capture = if getevent_text {
        TraceCapture::parse_with(reader, getevent::parse_line)
    } else {
        TraceCapture::parse(reader)
    }
    .with_context(|| format!("Failed to read trace capture {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        lines = capture.lines_read(),
        events = capture.events().len(),
        errors = capture.errors().len(),
        "parsed trace capture"
    );
    Ok(capture)
}

fn load_captures(args: &CaptureArgs) -> Result<Vec<LoadedCapture>> {
    let mut loaded = Vec::with_capacity(args.traces.len());
    for path in &args.traces {
        let capture = load_capture(path, args.getevent)?;
        let excluded = capture.is_corrupted() && !args.allow_clock_regression;
        if excluded {
            tracing::warn!(
                path = %path.display(),
                "skipping capture with clock regression (use --allow-clock-regression to keep it)"
            );
        }
        loaded.push(LoadedCapture {
            label: path.display().to_string(),
            capture,
            excluded,
        });
    }
    Ok(loaded)
}

fn reject_markdown(format: OutputFormat, command: &str) -> Result<()> {
    if format == OutputFormat::Markdown {
        bail!("markdown output is only available for compare, not {}", command);
    }
    Ok(())
}

fn write_capture_lines(out: &mut String, summaries: &[JsonCapture]) {
    for s in summaries {
        let _ = write!(
            out,
            "  {}: {} events, {} parse errors",
            s.path, s.events, s.parse_errors
        );
        if let Some(gestures) = s.gestures {
            let _ = write!(out, ", {} gestures", gestures);
        }
        if let Some(span) = s.aggregate_span_ms {
            let _ = write!(out, ", aggregate span {:.2} ms", span);
        }
        if let Some(regression) = &s.clock_regression {
            let _ = write!(
                out,
                ", clock regression at line {} ({} -> {})",
                regression.line, regression.previous, regression.observed
            );
        }
        if s.excluded {
            out.push_str(" [EXCLUDED]");
        }
        out.push('\n');
    }
}

fn write_input_stats(out: &mut String, summaries: &[JsonCapture]) {
    for s in summaries {
        let Some(stats) = &s.input_stats else {
            continue;
        };
        let _ = writeln!(
            out,
            "\n{}: {} input events over {:.2} ms ({} .. {})",
            s.path, stats.count, stats.duration_ms, stats.first_ts, stats.last_ts
        );
        let _ = writeln!(
            out,
            "  inter-event avg {:.3} ms, min {:.3} ms, max {:.3} ms",
            stats.avg_inter_event_ms, stats.min_inter_event_ms, stats.max_inter_event_ms
        );
        for (type_code, n) in &stats.event_types {
            let _ = writeln!(out, "    {:<10} {}", type_code, n);
        }
    }
}

fn write_values_line(out: &mut String, name: &str, values: &[f64]) {
    match describe(values, 0.95) {
        Some(stats) => {
            let _ = writeln!(
                out,
                "  {:<14} n={:<5} mean={:.2}  median={:.2}  sd={:.2}  min={:.2}  max={:.2}",
                name, stats.n, stats.mean, stats.median, stats.std_dev, stats.min, stats.max
            );
        }
        None => {
            let _ = writeln!(out, "  {:<14} n={:<5} {:?}", name, values.len(), values);
        }
    }
}

/// `latency`: gesture-to-wakeup samples for every capture
pub fn run_latency(args: &LatencyArgs, config: &RunConfig) -> Result<String> {
    let format = args.output.format;
    reject_markdown(format, "latency")?;

    let mut correlation = config.correlation.clone();
    if let Some(window_ms) = args.window_ms {
        correlation.window_ms = window_ms;
    }
    if !args.consumers.is_empty() {
        correlation.consumer_threads = args.consumers.clone();
    }
    if let Some(min) = args.min_latency_ms {
        correlation.min_latency_ms = min;
    }
    if args.max_latency_ms.is_some() {
        correlation.max_latency_ms = args.max_latency_ms;
    }
    if let Err(message) = correlation.validate() {
        bail!("Invalid correlation settings: {}", message);
    }

    let mut report = CorrelationReport::default();
    let mut summaries = Vec::new();
    for loaded in load_captures(&args.capture)? {
        let mut summary = loaded.summary();
        if !loaded.excluded {
            let events = loaded.capture.events();
            let segmentation = segment(events, &config.segmentation);
            summary = summary.with_segmentation(&segmentation);

            let mut capture_report = correlate(&segmentation.gestures, events, &correlation);
            if args.scenario_from_filename {
                let file_name = Path::new(&loaded.label)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                if let Some(kind) = GestureKind::from_filename(&file_name) {
                    for sample in &mut capture_report.samples {
                        sample.gesture_kind = kind;
                    }
                }
            }
            report.merge(capture_report);
        }
        summaries.push(summary);
    }

    match format {
        OutputFormat::Csv => {
            let mut csv = CsvLatencyOutput::new();
            csv.add_report(&report);
            Ok(csv.to_csv())
        }
        OutputFormat::Json => JsonLatencyOutput::new(summaries, &report).to_json(),
        _ => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "📱 Input latency: {} of {} gestures matched ({:.1}%)",
                report.samples.len(),
                report.outcomes.len(),
                report.match_rate() * 100.0
            );
            write_capture_lines(&mut out, &summaries);
            out.push_str("\nLatency (ms):\n");
            for kind in GestureKind::ALL {
                let values = report.values_ms(kind);
                if !values.is_empty() {
                    write_values_line(&mut out, kind.scenario(), &values);
                }
            }
            let _ = writeln!(
                out,
                "\nMisses: {}  Suspect matches: {}",
                report.misses.len(),
                report.suspects.len()
            );
            Ok(out)
        }
    }
}

/// `irq-latency`: touch interrupt to first input event
pub fn run_irq_latency(args: &IrqLatencyArgs, config: &RunConfig) -> Result<String> {
    let format = args.output.format;
    reject_markdown(format, "irq-latency")?;

    let window_ms = args.window_ms.unwrap_or(config.correlation.window_ms);
    if !(window_ms.is_finite() && window_ms > 0.0) {
        bail!("Invalid correlation window: {} ms", window_ms);
    }

    let mut combined = IrqCorrelation::default();
    let mut summaries = Vec::new();
    for loaded in load_captures(&args.capture)? {
        let mut summary = loaded.summary();
        if !loaded.excluded {
            let result = correlate_irq_to_input(loaded.capture.events(), window_ms);
            if result.aggregate_span_ns.is_none() {
                tracing::info!(capture = %loaded.label, "no plausible touch IRQ to input span");
            }
            summary = summary.with_aggregate_span(result.aggregate_span_ns);
            combined.merge(result);
        }
        summaries.push(summary);
    }

    match format {
        OutputFormat::Csv => {
            let mut csv = CsvLatencyOutput::new();
            for sample in &combined.samples {
                csv.add_value("irq_to_input", sample.value_ms());
            }
            Ok(csv.to_csv())
        }
        OutputFormat::Json => JsonIrqOutput::new(summaries, &combined).to_json(),
        _ => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "⚡ Touch IRQ to input: {} of {} interrupts matched",
                combined.samples.len(),
                combined.touch_irqs
            );
            write_capture_lines(&mut out, &summaries);
            let values: Vec<f64> = combined.samples.iter().map(|s| s.value_ms()).collect();
            if !values.is_empty() {
                out.push_str("\nLatency (ms):\n");
                write_values_line(&mut out, "irq_to_input", &values);
            }
            Ok(out)
        }
    }
}

/// Resolve the counting window from the CLI bounds and the capture extent
fn resolve_window(capture: &TraceCapture, start: Option<f64>, end: Option<f64>) -> Result<Window> {
    if let (Some(start), Some(end)) = (start, end) {
        return Ok(Window::from_secs(start, end)?);
    }
    let covering = Window::covering(capture.events())
        .context("Cannot derive a window from an empty capture; pass --start and --end")?;
    let start = start.map(Timestamp::from_secs_f64).unwrap_or(covering.start());
    let end = end.map(Timestamp::from_secs_f64).unwrap_or(covering.end());
    Ok(Window::new(start, end)?)
}

/// `count`: filtered event counts over one window
pub fn run_count(args: &CountArgs, config: &RunConfig) -> Result<String> {
    let format = args.output.format;
    reject_markdown(format, "count")?;

    let mut filters: Vec<(String, EventFilter)> = Vec::new();
    for (name, expr) in &config.aggregation.filters {
        let filter = EventFilter::from_expr(expr)
            .with_context(|| format!("Invalid filter '{}' in config", name))?;
        filters.push((name.clone(), filter));
    }
    for expr in &args.filters {
        let filter =
            EventFilter::from_expr(expr).with_context(|| format!("Invalid filter '{}'", expr))?;
        filters.push((expr.clone(), filter));
    }
    if filters.is_empty() {
        bail!("No filters given: pass -e EXPR or configure [aggregation.filters]");
    }

    let capture = load_capture(&args.trace, args.getevent)?;
    let label = args.trace.display().to_string();
    if capture.is_corrupted() && !args.allow_clock_regression {
        bail!(
            "{} has a clock regression; pass --allow-clock-regression to count it anyway",
            label
        );
    }

    let window = resolve_window(&capture, args.start, args.end)?;
    let tolerance_ns = config.aggregation.tolerance_ns();
    let events = capture.events();
    let counts: Vec<(String, &EventFilter, aggregate::WindowCount)> = filters
        .iter()
        .map(|(name, filter)| {
            (
                name.clone(),
                filter,
                aggregate::count(events, window, filter, tolerance_ns),
            )
        })
        .collect();

    match format {
        OutputFormat::Csv => {
            let mut csv = CsvCountOutput::new();
            for (name, _, count) in &counts {
                csv.add_count(name, *count);
            }
            Ok(csv.to_csv())
        }
        OutputFormat::Json => {
            let summary = JsonCapture::from_capture(&label, &capture, false);
            let mut json = JsonCountOutput::new(vec![summary]);
            for (name, filter, count) in &counts {
                let breakdown = if args.breakdown {
                    aggregate::breakdown(events, window, filter)
                } else {
                    Vec::new()
                };
                json.add_count(name, filter.expr(), *count, breakdown);
            }
            json.to_json()
        }
        _ => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "📊 {} window {} ({:.3} s)",
                label,
                window,
                window.duration_secs()
            );
            for (name, filter, count) in &counts {
                let _ = write!(
                    out,
                    "  {}: {} events, {:.2}/s",
                    name, count.count, count.rate_per_s
                );
                if name != filter.expr() {
                    let _ = write!(out, " [{}]", filter);
                }
                if count.truncated {
                    out.push_str(" ⚠️  truncated capture");
                }
                out.push('\n');
                if args.breakdown {
                    for (item, n) in aggregate::breakdown(events, window, filter) {
                        let _ = writeln!(out, "    {:<24} {}", item, n);
                    }
                }
            }
            Ok(out)
        }
    }
}

/// `gestures`: segmentation only
pub fn run_gestures(args: &GesturesArgs, config: &RunConfig) -> Result<String> {
    let format = args.output.format;
    reject_markdown(format, "gestures")?;

    let mut summaries = Vec::new();
    let mut segmented: Vec<(String, Segmentation)> = Vec::new();
    for loaded in load_captures(&args.capture)? {
        let mut summary = loaded.summary();
        if !loaded.excluded {
            let segmentation = segment(loaded.capture.events(), &config.segmentation);
            summary = summary.with_segmentation(&segmentation);
            if args.capture.getevent {
                summary = summary.with_input_stats(InputStats::from_events(loaded.capture.events()));
            }
            segmented.push((loaded.label, segmentation));
        }
        summaries.push(summary);
    }

    match format {
        OutputFormat::Csv => {
            let mut csv = CsvGestureOutput::new();
            for (label, segmentation) in &segmented {
                csv.add_gestures(label, &segmentation.gestures);
            }
            Ok(csv.to_csv())
        }
        OutputFormat::Json => {
            let mut json = JsonGestureOutput::new(summaries);
            for (label, segmentation) in &segmented {
                json.add_gestures(label, &segmentation.gestures);
            }
            json.to_json()
        }
        _ => {
            let mut out = String::new();
            write_capture_lines(&mut out, &summaries);
            write_input_stats(&mut out, &summaries);
            for (label, segmentation) in &segmented {
                let _ = writeln!(
                    out,
                    "\n{}: {} taps, {} scrolls, {} swipes (discarded: {} incomplete, {} dropped, {} without contact)",
                    label,
                    segmentation.count_kind(GestureKind::Tap),
                    segmentation.count_kind(GestureKind::Scroll),
                    segmentation.count_kind(GestureKind::Swipe),
                    segmentation.discarded_incomplete,
                    segmentation.discarded_dropped,
                    segmentation.discarded_no_contact
                );
                for (i, g) in segmentation.gestures.iter().enumerate() {
                    let _ = writeln!(
                        out,
                        "  #{:<4} {:<10} {} +{:.1} ms  {} events  {:.1} px",
                        i,
                        g.kind.scenario(),
                        g.start_ts,
                        g.duration_ms(),
                        g.event_count,
                        g.displacement_px
                    );
                }
            }
            Ok(out)
        }
    }
}

fn load_series(paths: &[PathBuf], label: &str, value_column: Option<&str>) -> Result<SeriesSet> {
    let mut set = SeriesSet::new(label);
    for path in paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let loaded = SeriesSet::from_csv_str(label, &text, value_column)
            .with_context(|| format!("Failed to load metric series from {}", path.display()))?;
        set.merge(loaded);
    }
    Ok(set)
}

/// `compare`: baseline vs treatment verdicts
pub fn run_compare(args: &CompareArgs, config: &RunConfig) -> Result<String> {
    let mut comparison = config.comparison.clone();
    if let Some(alpha) = args.alpha {
        comparison.significance_level = alpha;
    }
    if let Some(min_effect) = args.min_effect {
        comparison.min_effect_size = min_effect;
    }

    let value_column = args.value_column.as_deref();
    let baseline = load_series(&args.baseline, &args.baseline_label, value_column)?;
    let treatment = load_series(&args.treatment, &args.treatment_label, value_column)?;
    if baseline.is_empty() && treatment.is_empty() {
        bail!("No metric series found in the baseline or treatment CSVs");
    }

    let report = compare_all(&baseline, &treatment, &config.catalogue(), &comparison)?;

    match args.output.format {
        OutputFormat::Text => Ok(report.to_report_string()),
        OutputFormat::Json => JsonComparisonOutput::new(&report).to_json(),
        OutputFormat::Csv => Ok(CsvComparisonOutput::new(&report).to_csv()),
        OutputFormat::Markdown => Ok(render_markdown(&report)),
    }
}

fn output_args(command: &Command) -> &OutputArgs {
    match command {
        Command::Latency(args) => &args.output,
        Command::IrqLatency(args) => &args.output,
        Command::Count(args) => &args.output,
        Command::Gestures(args) => &args.output,
        Command::Compare(args) => &args.output,
    }
}

/// Execute a parsed command line
pub fn run(cli: &Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RunConfig::default(),
    };

    let rendered = match &cli.command {
        Command::Latency(args) => run_latency(args, &config)?,
        Command::IrqLatency(args) => run_irq_latency(args, &config)?,
        Command::Count(args) => run_count(args, &config)?,
        Command::Gestures(args) => run_gestures(args, &config)?,
        Command::Compare(args) => run_compare(args, &config)?,
    };

    match &output_args(&cli.command).output {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", rendered),
    }
    Ok(())
}
