//! Property-based tests for the analysis pipeline
//!
//! Designed to stay fast enough for a pre-commit gate. Covered:
//! 1. Timestamp and trace line parsing
//! 2. Parsers never panic on arbitrary text
//! 3. Gesture segmentation of concatenated sessions
//! 4. Correlation bookkeeping and claim-once wakeups
//! 5. Window counting
//! 6. Comparator symmetry

use esmscope::aggregate::{count, Window};
use esmscope::compare::{compare, ComparisonConfig};
use esmscope::correlate::{correlate, CorrelationConfig};
use esmscope::filter::EventFilter;
use esmscope::gesture::{segment, GestureInterval, GestureKind, SegmenterConfig};
use esmscope::input_codes::{ABS_MT_TRACKING_ID, BTN_TOUCH, EV_ABS, EV_KEY, EV_SYN};
use esmscope::metric::{Direction, MetricDefinition};
use esmscope::trace_event::{EventPayload, Timestamp, TraceEvent};
use proptest::prelude::*;
use std::collections::HashSet;

fn input(us: u64, ev_type: u16, code: u16, value: i32) -> TraceEvent {
    TraceEvent {
        timestamp: Timestamp::from_micros(us),
        thread_name: "InputReader".to_string(),
        pid: 1234,
        cpu: Some(2),
        payload: EventPayload::Input {
            dev: Some("fts".to_string()),
            ev_type,
            code,
            value,
        },
    }
}

fn wakeup(us: u64) -> TraceEvent {
    TraceEvent {
        timestamp: Timestamp::from_micros(us),
        thread_name: "<idle>".to_string(),
        pid: 0,
        cpu: Some(0),
        payload: EventPayload::SchedWakeup {
            woken_comm: "InputDispatcher".to_string(),
            woken_pid: 1301,
        },
    }
}

fn tap(start_us: u64, hold_us: u64) -> Vec<TraceEvent> {
    vec![
        input(start_us, EV_ABS, ABS_MT_TRACKING_ID, 1),
        input(start_us, EV_KEY, BTN_TOUCH, 1),
        input(start_us, EV_SYN, 0, 0),
        input(start_us + hold_us, EV_ABS, ABS_MT_TRACKING_ID, -1),
        input(start_us + hold_us, EV_KEY, BTN_TOUCH, 0),
        input(start_us + hold_us, EV_SYN, 0, 0),
    ]
}

fn gesture(start_us: u64) -> GestureInterval {
    GestureInterval {
        kind: GestureKind::Tap,
        start_ts: Timestamp::from_micros(start_us),
        end_ts: Timestamp::from_micros(start_us + 1_000),
        event_count: 6,
        device: None,
        displacement_px: 0.0,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_timestamp_display_parses_back(nanos in 0u64..10_000_000_000_000_000) {
        let ts = Timestamp::from_nanos(nanos);
        let parsed = Timestamp::parse(&ts.to_string()).unwrap();
        prop_assert_eq!(parsed, ts);
    }

    #[test]
    fn prop_input_line_fields_recovered(
        micros in 0u64..100_000_000_000,
        pid in 1u32..65_535,
        cpu in 0u32..16,
        ev_type in 0u16..5,
        code in 0u16..0x300,
        value in any::<i32>(),
    ) {
        let line = format!(
            "   InputReader-{} [{:03}] d..2. {}.{:06}: input_event: dev=fts type={} code={} value={}  \r",
            pid,
            cpu,
            micros / 1_000_000,
            micros % 1_000_000,
            ev_type,
            code,
            value
        );
        let event = esmscope::trace_event::parse_line(&line).unwrap().unwrap();
        prop_assert_eq!(event.timestamp, Timestamp::from_micros(micros));
        prop_assert_eq!(event.pid, pid);
        prop_assert_eq!(event.cpu, Some(cpu));
        prop_assert_eq!(event.thread_name.as_str(), "InputReader");
        prop_assert_eq!(
            event.payload,
            EventPayload::Input {
                dev: Some("fts".to_string()),
                ev_type,
                code,
                value,
            }
        );
    }

    #[test]
    fn prop_trace_line_parser_never_panics(line in "\\PC{0,120}") {
        let _ = esmscope::trace_event::parse_line(&line);
        let _ = esmscope::getevent::parse_line(&line);
    }

    #[test]
    fn prop_filter_parser_never_panics(expr in "[a-z_=,;0-9 ]{0,40}") {
        if let Ok(filter) = EventFilter::from_expr(&expr) {
            prop_assert!(!filter.expr().is_empty());
        }
    }

    #[test]
    fn prop_syscall_label_never_empty(nr in -10i64..1000) {
        let label = esmscope::syscalls::syscall_label(nr);
        prop_assert!(!label.is_empty());
        prop_assert!(label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_concatenated_taps_segment_independently(
        holds in prop::collection::vec(1_000u64..150_000, 1..30),
    ) {
        let mut events = Vec::new();
        let mut start = 1_000_000;
        for &hold in &holds {
            events.extend(tap(start, hold));
            start += hold + 50_000;
        }
        let segmentation = segment(&events, &SegmenterConfig::default());

        prop_assert_eq!(segmentation.gestures.len(), holds.len());
        prop_assert_eq!(segmentation.discarded_incomplete, 0);
        for (g, &hold) in segmentation.gestures.iter().zip(&holds) {
            prop_assert_eq!(g.kind, GestureKind::Tap);
            prop_assert_eq!(g.end_ts.nanos_since(g.start_ts), Some(hold * 1_000));
        }
    }

    #[test]
    fn prop_correlation_accounts_for_every_gesture(
        offsets in prop::collection::vec(prop::option::of(0u64..80_000), 1..60),
        extra in prop::collection::vec(0u64..12_000_000, 0..20),
        max_latency_ms in prop::option::of(5.0f64..50.0),
    ) {
        // Gestures every 200 ms, each with an optional wakeup after it
        let gestures: Vec<GestureInterval> =
            (0..offsets.len() as u64).map(|i| gesture(1_000_000 + i * 200_000)).collect();
        let mut events: Vec<TraceEvent> = offsets
            .iter()
            .enumerate()
            .filter_map(|(i, off)| off.map(|o| wakeup(1_000_000 + i as u64 * 200_000 + o)))
            .collect();
        events.extend(extra.iter().map(|&us| wakeup(us)));
        events.sort_by_key(|e| e.timestamp);

        let config = CorrelationConfig {
            max_latency_ms,
            ..CorrelationConfig::default()
        };
        let report = correlate(&gestures, &events, &config);

        prop_assert_eq!(report.outcomes.len(), gestures.len());
        prop_assert_eq!(
            report.samples.len() + report.misses.len() + report.suspects.len(),
            gestures.len()
        );

        // No wakeup is claimed twice
        let claimed: Vec<usize> =
            report.outcomes.iter().filter_map(|o| o.wakeup_index()).collect();
        let unique: HashSet<usize> = claimed.iter().copied().collect();
        prop_assert_eq!(unique.len(), claimed.len());

        // Every claim lies inside the window, strictly after its trigger
        let window_ns = config.window_ns();
        for (i, outcome) in report.outcomes.iter().enumerate() {
            if let Some(w) = outcome.wakeup_index() {
                let latency = events[w].timestamp.nanos_since(gestures[i].start_ts).unwrap();
                prop_assert!(latency > 0 && latency <= window_ns);
            }
        }
        for sample in &report.samples {
            prop_assert!(config.in_range(sample.latency_ns));
        }
    }

    #[test]
    fn prop_split_windows_add_up(
        stamps in prop::collection::vec(0u64..2_000_000, 1..200),
        split in 1u64..1_999_999,
    ) {
        let mut events: Vec<TraceEvent> = stamps.iter().map(|&us| wakeup(us)).collect();
        events.sort_by_key(|e| e.timestamp);
        let filter = EventFilter::from_expr("wakeup=InputDispatcher").unwrap();
        let at = |us: u64| Timestamp::from_micros(us);

        let whole = count(&events, Window::new(at(0), at(2_000_000)).unwrap(), &filter, 0);
        let left = count(&events, Window::new(at(0), at(split)).unwrap(), &filter, 0);
        let right = count(&events, Window::new(at(split), at(2_000_000)).unwrap(), &filter, 0);

        prop_assert_eq!(whole.count, stamps.len() as u64);
        prop_assert_eq!(left.count + right.count, whole.count);
    }

    #[test]
    fn prop_swapping_variants_mirrors_the_test(
        a in prop::collection::vec(1.0f64..100.0, 2..20),
        b in prop::collection::vec(1.0f64..100.0, 2..20),
    ) {
        let metric = MetricDefinition::new("single_tap", Direction::LowerIsBetter);
        let config = ComparisonConfig::default();
        let forward = compare(&metric, &a, &b, &config).unwrap();
        let backward = compare(&metric, &b, &a, &config).unwrap();

        prop_assume!(forward.p_value.is_finite());
        prop_assert!((forward.t_statistic + backward.t_statistic).abs() < 1e-9);
        prop_assert!((forward.df - backward.df).abs() < 1e-6);
        prop_assert!((forward.p_value - backward.p_value).abs() < 1e-9);
        prop_assert!((forward.cohens_d + backward.cohens_d).abs() < 1e-9);
        // Improvement flips sign; both are zero only for equal means
        prop_assert_eq!(
            forward.improvement_pct > 0.0,
            backward.improvement_pct < 0.0
        );
        prop_assert_eq!(
            forward.improvement_pct == 0.0,
            backward.improvement_pct == 0.0
        );
        prop_assert!(!(forward.improved && backward.improved));
        prop_assert!((0.0..=1.0).contains(&forward.p_value));
        prop_assert!(!(forward.validated && backward.validated));
    }
}
