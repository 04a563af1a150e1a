//! Parser for Android `getevent -t` / `getevent -lt` output
//!
//! ```text
//! [    1234.567890] /dev/input/event2: 0003 0039 00000001
//! [    1234.567890] /dev/input/event2: EV_KEY       BTN_TOUCH            DOWN
//! ```
//!
//! Type, code and value are hexadecimal (value is a 32-bit two's complement
//! word) unless `-l` replaced them with symbolic labels. Events come out as
//! `input_event` records so the gesture segmenter can consume either source.
//! getevent stamps events with the evdev clock, which is not necessarily the
//! trace-buffer clock: do not correlate these against ftrace wakeups unless
//! both captures used the same clock.
//!
//! [`InputStats`] summarises the input events of a capture: duration, a
//! `type:code` histogram and the inter-event timing.

use crate::input_codes;
use crate::trace_event::{EventPayload, ParseError, Timestamp, TraceEvent};
use serde::Serialize;
use std::collections::BTreeMap;

const TRACEPOINT: &str = "getevent";
const NANOS_PER_MS: f64 = 1_000_000.0;

/// Parse one getevent line; non-event lines (`add device`, `name:`) yield `None`
///
/// In `-l` mode, events whose type, code or value label is not in the
/// [`input_codes`] tables (`KEY_*` keys, vendor axes) are skipped as well.
pub fn parse_line(line: &str) -> Result<Option<TraceEvent>, ParseError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('[') else {
        return Ok(None);
    };
    let Some((ts_text, rest)) = rest.split_once(']') else {
        return Ok(None);
    };
    let Some((device, fields)) = rest.trim().split_once(": ") else {
        return Ok(None);
    };
    if !device.starts_with("/dev/input/") {
        return Ok(None);
    }

    let timestamp = Timestamp::parse(ts_text.trim())?;
    let mut tokens = fields.split_whitespace();
    let ev_type = tokens.next().ok_or(ParseError::MissingField {
        tracepoint: TRACEPOINT,
        field: "type",
    })?;
    let code = tokens.next().ok_or(ParseError::MissingField {
        tracepoint: TRACEPOINT,
        field: "code",
    })?;
    let value = tokens.next().ok_or(ParseError::MissingField {
        tracepoint: TRACEPOINT,
        field: "value",
    })?;

    let resolved = (
        resolve(ev_type, input_codes::type_from_label, |t| hex_u16("type", t))?,
        resolve(code, input_codes::code_from_label, |t| hex_u16("code", t))?,
        resolve(value, input_codes::value_from_label, hex_i32)?,
    );
    let (Some(ev_type), Some(code), Some(value)) = resolved else {
        tracing::trace!(line, "skipping getevent line with unknown label");
        return Ok(None);
    };

    Ok(Some(TraceEvent {
        timestamp,
        thread_name: TRACEPOINT.to_string(),
        pid: 0,
        cpu: None,
        payload: EventPayload::Input {
            dev: Some(device.to_string()),
            ev_type,
            code,
            value,
        },
    }))
}

/// Label lookup, then hex; `Ok(None)` for a symbolic label outside the table
fn resolve<T>(
    token: &str,
    label: impl Fn(&str) -> Option<T>,
    hex: impl Fn(&str) -> Result<T, ParseError>,
) -> Result<Option<T>, ParseError> {
    if let Some(value) = label(token) {
        return Ok(Some(value));
    }
    if input_codes::is_label(token) {
        return Ok(None);
    }
    hex(token).map(Some)
}

fn hex_u16(field: &'static str, text: &str) -> Result<u16, ParseError> {
    u16::from_str_radix(text, 16).map_err(|_| ParseError::InvalidField {
        tracepoint: TRACEPOINT,
        field,
        text: text.to_string(),
    })
}

fn hex_i32(text: &str) -> Result<i32, ParseError> {
    u32::from_str_radix(text, 16)
        .map(|v| v as i32)
        .map_err(|_| ParseError::InvalidField {
            tracepoint: TRACEPOINT,
            field: "value",
            text: text.to_string(),
        })
}

/// Timing and composition of the input events in a capture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputStats {
    pub count: usize,
    pub first_ts: Timestamp,
    pub last_ts: Timestamp,
    pub duration_ms: f64,
    /// Events per `TTTT:CCCC` (hex type and code, as getevent prints them)
    pub event_types: BTreeMap<String, usize>,
    pub avg_inter_event_ms: f64,
    pub min_inter_event_ms: f64,
    pub max_inter_event_ms: f64,
}

impl InputStats {
    /// `None` when the capture holds no input events
    ///
    /// Inter-event gaps are taken over the sorted timestamps; with a single
    /// event they are all zero.
    pub fn from_events(events: &[TraceEvent]) -> Option<Self> {
        let mut timestamps = Vec::new();
        let mut event_types: BTreeMap<String, usize> = BTreeMap::new();
        for event in events {
            if let EventPayload::Input { ev_type, code, .. } = &event.payload {
                timestamps.push(event.timestamp);
                *event_types
                    .entry(format!("{:04x}:{:04x}", ev_type, code))
                    .or_insert(0) += 1;
            }
        }
        timestamps.sort_unstable();
        let first_ts = *timestamps.first()?;
        let last_ts = *timestamps.last()?;

        let gaps: Vec<u64> = timestamps
            .windows(2)
            .map(|pair| pair[1].as_nanos() - pair[0].as_nanos())
            .collect();
        let (avg, min, max) = match (gaps.iter().min(), gaps.iter().max()) {
            (Some(&min), Some(&max)) => (
                gaps.iter().sum::<u64>() as f64 / gaps.len() as f64 / NANOS_PER_MS,
                min as f64 / NANOS_PER_MS,
                max as f64 / NANOS_PER_MS,
            ),
            _ => (0.0, 0.0, 0.0),
        };

        Some(Self {
            count: timestamps.len(),
            first_ts,
            last_ts,
            duration_ms: (last_ts.as_nanos() - first_ts.as_nanos()) as f64 / NANOS_PER_MS,
            event_types,
            avg_inter_event_ms: avg,
            min_inter_event_ms: min,
            max_inter_event_ms: max,
        })
    }
}
