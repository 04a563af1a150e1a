//! Kernel trace-buffer line parser
//!
//! Turns the text form of the ftrace ring buffer (`/sys/kernel/tracing/trace`)
//! into typed events. One line yields at most one event:
//!
//! ```text
//!   InputReader-1234  [002] d..2  1234.567890: input_event: dev=fts type=3 code=53 value=500
//!   <idle>-0          [000] dNh4  1234.567912: sched_wakeup: comm=InputDispatcher pid=1301 prio=112 target_cpu=000
//!   kworker/u16:2-88  [001] d.h1  1234.567801: irq_handler_entry: irq=123 name=fts_touch
//!   system_server-901 [003] ....  1234.568001: sys_enter: NR 22 (5, 7ffd, 10, ffffffff, 0, 0)
//! ```
//!
//! Lines that do not carry a recognised tracepoint (headers, comments,
//! unrelated tracepoints) are skipped without error. Tracepoints whose name
//! contains `esm` belong to the event-stream delivery path; they are kept as
//! [`EventPayload::Esm`] with their name and raw arguments. A recognised tracepoint
//! whose required field fails to parse is a [`ParseError`] for that line only.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::BufRead;
use std::sync::OnceLock;
use thiserror::Error;

const NANOS_PER_SEC: u64 = 1_000_000_000;
const MAX_FRACTION_DIGITS: usize = 9;

/// Trace-buffer timestamp in nanoseconds (clock domain of the capture)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros * 1_000)
    }

    /// Convert from float seconds, rounding to the nearest nanosecond
    ///
    /// Negative and non-finite inputs clamp to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self(0);
        }
        Self((secs * NANOS_PER_SEC as f64).round() as u64)
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Float seconds view, as printed by the trace buffer
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub const fn saturating_add_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_add(nanos))
    }

    pub const fn saturating_sub_nanos(self, nanos: u64) -> Self {
        Self(self.0.saturating_sub(nanos))
    }

    /// Nanoseconds elapsed since `earlier`, or `None` if `earlier` is later
    pub fn nanos_since(self, earlier: Timestamp) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }

    /// Parse fixed-point seconds (`1234.567890`) with 1 to 9 fractional digits
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let invalid = |reason: &'static str| ParseError::Timestamp {
            text: text.to_string(),
            reason,
        };

        let (secs, frac) = text.split_once('.').ok_or_else(|| invalid("missing '.'"))?;
        if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("seconds are not decimal digits"));
        }
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("fraction is not decimal digits"));
        }
        if frac.len() > MAX_FRACTION_DIGITS {
            return Err(invalid("more than 9 fractional digits"));
        }

        let secs = u64::from_str_radix(secs, 10).map_err(|_| invalid("seconds overflow"))?;
        let frac_value = u64::from_str_radix(frac, 10).map_err(|_| invalid("fraction overflow"))?;
        let scale = 10u64.pow((MAX_FRACTION_DIGITS - frac.len()) as u32);

        secs.checked_mul(NANOS_PER_SEC)
            .and_then(|n| n.checked_add(frac_value * scale))
            .map(Self)
            .ok_or_else(|| invalid("timestamp overflow"))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / NANOS_PER_SEC;
        let nanos = self.0 % NANOS_PER_SEC;
        if nanos % 1_000 == 0 {
            write!(f, "{}.{:06}", secs, nanos / 1_000)
        } else {
            write!(f, "{}.{:09}", secs, nanos)
        }
    }
}

/// Tracepoints the analyzer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracepointKind {
    InputEvent,
    SchedWakeup,
    IrqEntry,
    IrqExit,
    SysEnter,
    /// Any `esm*` tracepoint
    Esm,
}

impl TracepointKind {
    pub const ALL: [TracepointKind; 6] = [
        TracepointKind::InputEvent,
        TracepointKind::SchedWakeup,
        TracepointKind::IrqEntry,
        TracepointKind::IrqExit,
        TracepointKind::SysEnter,
        TracepointKind::Esm,
    ];

    /// Map the tracepoint token printed in the trace buffer
    pub fn from_tracepoint(token: &str) -> Option<Self> {
        match token {
            "input_event" => Some(Self::InputEvent),
            "sched_wakeup" => Some(Self::SchedWakeup),
            "irq_handler_entry" => Some(Self::IrqEntry),
            "irq_handler_exit" => Some(Self::IrqExit),
            "sys_enter" => Some(Self::SysEnter),
            _ if token.to_ascii_lowercase().contains("esm") => Some(Self::Esm),
            _ => None,
        }
    }

    /// Short name used in filters and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputEvent => "input_event",
            Self::SchedWakeup => "sched_wakeup",
            Self::IrqEntry => "irq_entry",
            Self::IrqExit => "irq_exit",
            Self::SysEnter => "sys_enter",
            Self::Esm => "esm",
        }
    }

    /// Token as it appears in trace text
    pub fn tracepoint(&self) -> &'static str {
        match self {
            Self::InputEvent => "input_event",
            Self::SchedWakeup => "sched_wakeup",
            Self::IrqEntry => "irq_handler_entry",
            Self::IrqExit => "irq_handler_exit",
            Self::SysEnter => "sys_enter",
            Self::Esm => "esm",
        }
    }

    /// Accepts both the short name and the trace token
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == name || k.tracepoint() == name)
    }
}

impl fmt::Display for TracepointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific attributes of a trace event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Input {
        dev: Option<String>,
        ev_type: u16,
        code: u16,
        value: i32,
    },
    SchedWakeup {
        woken_comm: String,
        woken_pid: u32,
    },
    IrqEntry {
        irq: u32,
        name: String,
    },
    IrqExit {
        irq: u32,
        handled: bool,
    },
    SysEnter {
        syscall_nr: i64,
    },
    Esm {
        tracepoint: String,
        args: String,
    },
}

/// One parsed trace line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub timestamp: Timestamp,
    pub thread_name: String,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    pub payload: EventPayload,
}

impl TraceEvent {
    pub fn kind(&self) -> TracepointKind {
        match self.payload {
            EventPayload::Input { .. } => TracepointKind::InputEvent,
            EventPayload::SchedWakeup { .. } => TracepointKind::SchedWakeup,
            EventPayload::IrqEntry { .. } => TracepointKind::IrqEntry,
            EventPayload::IrqExit { .. } => TracepointKind::IrqExit,
            EventPayload::SysEnter { .. } => TracepointKind::SysEnter,
            EventPayload::Esm { .. } => TracepointKind::Esm,
        }
    }

    /// Tracepoint token as printed in the buffer
    pub fn tracepoint(&self) -> &str {
        match &self.payload {
            EventPayload::Esm { tracepoint, .. } => tracepoint,
            _ => self.kind().tracepoint(),
        }
    }

    /// Name of the thread made runnable, for `sched_wakeup` events
    pub fn woken_comm(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::SchedWakeup { woken_comm, .. } => Some(woken_comm),
            _ => None,
        }
    }
}

/// Failure to parse a line that carries a recognised tracepoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid timestamp '{text}': {reason}")]
    Timestamp { text: String, reason: &'static str },

    #[error("invalid pid '{0}'")]
    Pid(String),

    #[error("{tracepoint}: missing field '{field}'")]
    MissingField {
        tracepoint: &'static str,
        field: &'static str,
    },

    #[error("{tracepoint}: invalid {field} '{text}'")]
    InvalidField {
        tracepoint: &'static str,
        field: &'static str,
        text: String,
    },
}

/// A [`ParseError`] tagged with its 1-based line number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {error}")]
pub struct LineError {
    pub line: usize,
    pub error: ParseError,
}

/// Timestamps went backwards: the buffer wrapped or the capture is corrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClockRegression {
    /// Line (1-based) of the first event earlier than its predecessor
    pub line: usize,
    pub previous: Timestamp,
    pub observed: Timestamp,
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(
            r"^\s*(?P<task>.+?)-(?P<pid>\d+)\s+(?:\(\s*[^)]*\)\s+)?\[(?P<cpu>\d+)\]\s+(?:\S+\s+)?(?P<ts>\d+\.\d+):\s+(?P<event>[A-Za-z_]\w*):\s*(?P<body>.*)$",
        )
        .expect("static trace header regex is valid")
    })
}

/// Parse one line of trace text
///
/// Returns `Ok(None)` for lines that carry no recognised tracepoint.
pub fn parse_line(line: &str) -> Result<Option<TraceEvent>, ParseError> {
    let line = line.trim_end();
    if line.is_empty() || line.trim_start().starts_with('#') {
        return Ok(None);
    }

    let Some(caps) = header_regex().captures(line) else {
        return Ok(None);
    };
    let Some(kind) = TracepointKind::from_tracepoint(&caps["event"]) else {
        return Ok(None);
    };

    let timestamp = Timestamp::parse(&caps["ts"])?;
    let pid = caps["pid"]
        .parse::<u32>()
        .map_err(|_| ParseError::Pid(caps["pid"].to_string()))?;
    let cpu = caps["cpu"].parse::<u32>().ok();
    let payload = parse_body(kind, &caps["event"], caps["body"].trim())?;

    Ok(Some(TraceEvent {
        timestamp,
        thread_name: caps["task"].trim().to_string(),
        pid,
        cpu,
        payload,
    }))
}

fn parse_body(kind: TracepointKind, token: &str, body: &str) -> Result<EventPayload, ParseError> {
    let tp = kind.tracepoint();
    match kind {
        TracepointKind::InputEvent => Ok(EventPayload::Input {
            dev: field(body, "dev").map(str::to_string),
            ev_type: decimal(tp, "type", required(tp, body, "type")?)?,
            code: decimal(tp, "code", required(tp, body, "code")?)?,
            value: event_value(tp, required(tp, body, "value")?)?,
        }),
        TracepointKind::SchedWakeup => {
            let woken_comm = wakeup_comm(body).ok_or(ParseError::MissingField {
                tracepoint: tp,
                field: "comm",
            })?;
            Ok(EventPayload::SchedWakeup {
                woken_comm: woken_comm.to_string(),
                woken_pid: decimal(tp, "pid", required(tp, body, "pid")?)?,
            })
        }
        TracepointKind::IrqEntry => Ok(EventPayload::IrqEntry {
            irq: decimal(tp, "irq", required(tp, body, "irq")?)?,
            name: required(tp, body, "name")?.to_string(),
        }),
        TracepointKind::IrqExit => Ok(EventPayload::IrqExit {
            irq: decimal(tp, "irq", required(tp, body, "irq")?)?,
            handled: field(body, "ret") == Some("handled"),
        }),
        TracepointKind::SysEnter => {
            let nr = body
                .strip_prefix("NR")
                .map(|rest| {
                    rest.trim_start()
                        .split(|c: char| c.is_whitespace() || c == '(')
                        .next()
                        .unwrap_or("")
                })
                .ok_or(ParseError::MissingField {
                    tracepoint: tp,
                    field: "NR",
                })?;
            Ok(EventPayload::SysEnter {
                syscall_nr: decimal(tp, "NR", nr)?,
            })
        }
        TracepointKind::Esm => Ok(EventPayload::Esm {
            tracepoint: token.to_string(),
            args: body.to_string(),
        }),
    }
}

/// Value of a whitespace-delimited `key=value` token
fn field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split_whitespace().find_map(|token| {
        token
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

fn required<'a>(
    tracepoint: &'static str,
    body: &'a str,
    key: &'static str,
) -> Result<&'a str, ParseError> {
    field(body, key).ok_or(ParseError::MissingField {
        tracepoint,
        field: key,
    })
}

fn decimal<T: std::str::FromStr>(
    tracepoint: &'static str,
    field: &'static str,
    text: &str,
) -> Result<T, ParseError> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidField {
            tracepoint,
            field,
            text: text.to_string(),
        });
    }
    text.parse().map_err(|_| ParseError::InvalidField {
        tracepoint,
        field,
        text: text.to_string(),
    })
}

/// Input values are signed 32-bit; some kernels print them as unsigned
fn event_value(tracepoint: &'static str, text: &str) -> Result<i32, ParseError> {
    let wide: i64 = decimal(tracepoint, "value", text)?;
    if let Ok(v) = i32::try_from(wide) {
        return Ok(v);
    }
    u32::try_from(wide)
        .map(|v| v as i32)
        .map_err(|_| ParseError::InvalidField {
            tracepoint,
            field: "value",
            text: text.to_string(),
        })
}

/// `comm=` runs up to the ` pid=` marker, since thread names may contain spaces
fn wakeup_comm(body: &str) -> Option<&str> {
    let rest = body.strip_prefix("comm=").or_else(|| {
        body.find(" comm=")
            .map(|idx| &body[idx + " comm=".len()..])
    })?;
    let end = rest.find(" pid=").unwrap_or(rest.len());
    let comm = rest[..end].trim();
    (!comm.is_empty()).then_some(comm)
}

/// All events from one trace capture, in buffer order
#[derive(Debug, Clone, Default)]
pub struct TraceCapture {
    events: Vec<TraceEvent>,
    errors: Vec<LineError>,
    lines_read: usize,
    skipped_lines: usize,
    clock_regression: Option<ClockRegression>,
    regression_count: usize,
    last_timestamp: Option<Timestamp>,
}

impl TraceCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse ftrace text from a reader
    ///
    /// Invalid UTF-8 is replaced rather than aborting the capture.
    pub fn parse<R: BufRead>(reader: R) -> std::io::Result<Self> {
        Self::parse_with(reader, parse_line)
    }

    /// Parse with a custom line parser (e.g. `getevent` output)
    pub fn parse_with<R, F>(mut reader: R, parser: F) -> std::io::Result<Self>
    where
        R: BufRead,
        F: Fn(&str) -> Result<Option<TraceEvent>, ParseError>,
    {
        let mut capture = Self::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            capture.push_line_with(&line, &parser);
        }
        Ok(capture)
    }

    /// Parse ftrace text already in memory
    pub fn from_text(text: &str) -> Self {
        let mut capture = Self::new();
        for line in text.lines() {
            capture.push_line(line);
        }
        capture
    }

    /// Build a capture from already-parsed events (still checked for ordering)
    pub fn from_events(events: impl IntoIterator<Item = TraceEvent>) -> Self {
        let mut capture = Self::new();
        for event in events {
            capture.lines_read += 1;
            capture.accept(event);
        }
        capture
    }

    /// Feed one ftrace line
    pub fn push_line(&mut self, line: &str) {
        self.push_line_with(line, &parse_line);
    }

    fn push_line_with<F>(&mut self, line: &str, parser: &F)
    where
        F: Fn(&str) -> Result<Option<TraceEvent>, ParseError>,
    {
        self.lines_read += 1;
        match parser(line) {
            Ok(Some(event)) => self.accept(event),
            Ok(None) => self.skipped_lines += 1,
            Err(error) => {
                tracing::warn!(line = self.lines_read, %error, "skipping unparseable trace line");
                self.errors.push(LineError {
                    line: self.lines_read,
                    error,
                });
            }
        }
    }

    fn accept(&mut self, event: TraceEvent) {
        if let Some(previous) = self.last_timestamp {
            if event.timestamp < previous {
                self.regression_count += 1;
                if self.clock_regression.is_none() {
                    tracing::warn!(
                        line = self.lines_read,
                        previous = %previous,
                        observed = %event.timestamp,
                        "trace timestamps went backwards; capture wrapped or corrupted"
                    );
                    self.clock_regression = Some(ClockRegression {
                        line: self.lines_read,
                        previous,
                        observed: event.timestamp,
                    });
                }
            }
        }
        self.last_timestamp = Some(event.timestamp);
        self.events.push(event);
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    pub fn errors(&self) -> &[LineError] {
        &self.errors
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    /// First timestamp decrease, if any
    pub fn clock_regression(&self) -> Option<&ClockRegression> {
        self.clock_regression.as_ref()
    }

    pub fn regression_count(&self) -> usize {
        self.regression_count
    }

    /// True when the chronological-buffer invariant was violated
    pub fn is_corrupted(&self) -> bool {
        self.clock_regression.is_some()
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.events.first().map(|e| e.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.events.last().map(|e| e.timestamp)
    }

    pub fn count_kind(&self, kind: TracepointKind) -> usize {
        self.events.iter().filter(|e| e.kind() == kind).count()
    }
}
