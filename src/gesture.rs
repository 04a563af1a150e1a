//! Gesture segmentation of the input-event sub-stream
//!
//! Input events arrive in frames terminated by `SYN_REPORT`. Frames accumulate
//! in a per-device buffer while a contact is down; the `SYN_REPORT` that ends
//! the frame in which the last contact lifted closes the buffer into one
//! [`GestureInterval`]. The trigger instant is the first raw event of the
//! buffer, not the closing `SYN_REPORT`, so the device's own batching delay
//! stays out of latency measurements.
//!
//! A trailing buffer with no closing `SYN_REPORT` is discarded, as is a buffer
//! interrupted by `SYN_DROPPED` (the kernel lost events; state is unknown
//! until the next `SYN_REPORT`).

use crate::input_codes::{
    is_syn_report, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_SLOT, ABS_MT_TRACKING_ID,
    ABS_X, ABS_Y, BTN_TOUCH, EV_ABS, EV_KEY, EV_SYN, SYN_DROPPED,
};
use crate::trace_event::{EventPayload, Timestamp, TraceEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Physical interaction classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureKind {
    Tap,
    Scroll,
    Swipe,
}

impl GestureKind {
    pub const ALL: [GestureKind; 3] = [GestureKind::Tap, GestureKind::Scroll, GestureKind::Swipe];

    /// Scenario name used in `scenario,sample,value` CSV rows
    pub fn scenario(&self) -> &'static str {
        match self {
            GestureKind::Tap => "single_tap",
            GestureKind::Scroll => "scroll",
            GestureKind::Swipe => "fast_swipe",
        }
    }

    pub fn from_scenario(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.scenario() == name)
    }

    /// Infer the scenario a capture file was recorded for from its name
    pub fn from_filename(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.contains("tap") {
            Some(GestureKind::Tap)
        } else if lower.contains("scroll") {
            Some(GestureKind::Scroll)
        } else if lower.contains("swipe") {
            Some(GestureKind::Swipe)
        } else {
            None
        }
    }
}

impl fmt::Display for GestureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scenario())
    }
}

/// Configuration for gesture kind inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Maximum displacement (px) for a touch to still count as a tap
    pub tap_slop_px: f64,

    /// Average velocity (px/s) at or above which a moving gesture is a swipe
    ///
    /// Scripted scrolls travel ~1000 px in 500 ms (2000 px/s) and fast swipes
    /// ~1600 px in 200 ms (8000 px/s); the default sits between them.
    pub swipe_velocity_px_per_s: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            tap_slop_px: 24.0,
            swipe_velocity_px_per_s: 4000.0,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.tap_slop_px.is_finite() && self.tap_slop_px >= 0.0) {
            return Err(format!(
                "tap_slop_px must be a non-negative number, got {}",
                self.tap_slop_px
            ));
        }
        if !(self.swipe_velocity_px_per_s.is_finite() && self.swipe_velocity_px_per_s > 0.0) {
            return Err(format!(
                "swipe_velocity_px_per_s must be positive, got {}",
                self.swipe_velocity_px_per_s
            ));
        }
        Ok(())
    }
}

/// One physical interaction, closed by its boundary `SYN_REPORT`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureInterval {
    pub kind: GestureKind,
    /// First raw event of the buffer (the latency trigger)
    pub start_ts: Timestamp,
    /// Closing `SYN_REPORT`
    pub end_ts: Timestamp,
    pub event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Straight-line distance from first to last position (px)
    pub displacement_px: f64,
}

impl GestureInterval {
    pub fn duration_ms(&self) -> f64 {
        self.end_ts.nanos_since(self.start_ts).unwrap_or(0) as f64 / 1e6
    }
}

/// Legacy single-touch `ABS_X`/`ABS_Y` pointer, tracked apart from MT slots
const LEGACY_POINTER: i32 = i32::MIN;

/// Position history of one contact slot
#[derive(Debug, Default)]
struct SlotTrack {
    x: Option<i32>,
    y: Option<i32>,
    origin: Option<(i32, i32)>,
    max_displacement: f64,
    last_displacement: f64,
}

impl SlotTrack {
    fn update(&mut self) {
        let (Some(x), Some(y)) = (self.x, self.y) else {
            return;
        };
        match self.origin {
            None => self.origin = Some((x, y)),
            Some((x0, y0)) => {
                let d = f64::from(x - x0).hypot(f64::from(y - y0));
                self.last_displacement = d;
                self.max_displacement = self.max_displacement.max(d);
            }
        }
    }

    /// New contact in this slot: positions restart, travel so far is kept
    fn restart(&mut self) {
        self.x = None;
        self.y = None;
        self.origin = None;
    }
}

#[derive(Debug, Default)]
struct GestureBuffer {
    first_ts: Option<Timestamp>,
    event_count: usize,
    /// Discarding events until the next SYN_REPORT after SYN_DROPPED
    resyncing: bool,
    touch_down_seen: bool,
    btn_touch_active: bool,
    current_slot: i32,
    active_slots: BTreeSet<i32>,
    tracks: BTreeMap<i32, SlotTrack>,
}

impl GestureBuffer {
    fn contact_active(&self) -> bool {
        self.btn_touch_active || !self.active_slots.is_empty()
    }

    fn apply(&mut self, ev_type: u16, code: u16, value: i32) {
        match (ev_type, code) {
            (EV_KEY, BTN_TOUCH) => {
                self.btn_touch_active = value != 0;
                if value != 0 {
                    self.touch_down_seen = true;
                }
            }
            (EV_ABS, ABS_MT_SLOT) => self.current_slot = value,
            (EV_ABS, ABS_MT_TRACKING_ID) => {
                if value >= 0 {
                    self.active_slots.insert(self.current_slot);
                    self.touch_down_seen = true;
                    self.tracks.entry(self.current_slot).or_default().restart();
                } else {
                    self.active_slots.remove(&self.current_slot);
                }
            }
            (EV_ABS, ABS_MT_POSITION_X) => self.move_slot(self.current_slot, Some(value), None),
            (EV_ABS, ABS_MT_POSITION_Y) => self.move_slot(self.current_slot, None, Some(value)),
            (EV_ABS, ABS_X) => self.move_slot(LEGACY_POINTER, Some(value), None),
            (EV_ABS, ABS_Y) => self.move_slot(LEGACY_POINTER, None, Some(value)),
            _ => {}
        }
    }

    fn move_slot(&mut self, slot: i32, x: Option<i32>, y: Option<i32>) {
        let track = self.tracks.entry(slot).or_default();
        if x.is_some() {
            track.x = x;
        }
        if y.is_some() {
            track.y = y;
        }
        track.update();
    }

    /// Largest travel of any single contact
    fn max_displacement(&self) -> f64 {
        self.tracks
            .values()
            .map(|t| t.max_displacement)
            .fold(0.0, f64::max)
    }

    /// Final distance from origin of the contact that travelled furthest
    fn last_displacement(&self) -> f64 {
        self.tracks
            .values()
            .map(|t| t.last_displacement)
            .fold(0.0, f64::max)
    }

    fn classify(&self, start: Timestamp, end: Timestamp, config: &SegmenterConfig) -> GestureKind {
        if self.max_displacement() <= config.tap_slop_px {
            return GestureKind::Tap;
        }
        let secs = end.nanos_since(start).unwrap_or(0) as f64 / 1e9;
        if secs <= 0.0 {
            return GestureKind::Swipe;
        }
        if self.last_displacement() / secs >= config.swipe_velocity_px_per_s {
            GestureKind::Swipe
        } else {
            GestureKind::Scroll
        }
    }
}

/// Result of segmenting one capture
#[derive(Debug, Clone, Default)]
pub struct Segmentation {
    /// Closed gestures ordered by trigger timestamp
    pub gestures: Vec<GestureInterval>,
    /// Buffers still open at end of stream
    pub discarded_incomplete: usize,
    /// Buffers invalidated by SYN_DROPPED
    pub discarded_dropped: usize,
    /// Closed buffers with no touch contact (keys, sensors)
    pub discarded_no_contact: usize,
}

impl Segmentation {
    pub fn count_kind(&self, kind: GestureKind) -> usize {
        self.gestures.iter().filter(|g| g.kind == kind).count()
    }
}

/// Incremental segmenter; feed events in buffer order, then [`finish`](Self::finish)
#[derive(Debug)]
pub struct GestureSegmenter {
    config: SegmenterConfig,
    buffers: HashMap<Option<String>, GestureBuffer>,
    result: Segmentation,
}

impl GestureSegmenter {
    pub fn new(config: SegmenterConfig) -> Self {
        Self {
            config,
            buffers: HashMap::new(),
            result: Segmentation::default(),
        }
    }

    /// Feed one event; non-input events are ignored
    pub fn push(&mut self, event: &TraceEvent) {
        let EventPayload::Input {
            dev,
            ev_type,
            code,
            value,
        } = &event.payload
        else {
            return;
        };
        let (ev_type, code, value) = (*ev_type, *code, *value);
        let buffer = self.buffers.entry(dev.clone()).or_default();

        if ev_type == EV_SYN && code == SYN_DROPPED {
            if buffer.event_count > 0 {
                self.result.discarded_dropped += 1;
            }
            tracing::warn!(
                ts = %event.timestamp,
                device = dev.as_deref().unwrap_or("-"),
                "SYN_DROPPED: discarding gesture buffer"
            );
            *buffer = GestureBuffer {
                resyncing: true,
                ..GestureBuffer::default()
            };
            return;
        }

        if buffer.resyncing {
            if is_syn_report(ev_type, code, value) {
                *buffer = GestureBuffer::default();
            }
            return;
        }

        buffer.first_ts.get_or_insert(event.timestamp);
        buffer.event_count += 1;

        if !is_syn_report(ev_type, code, value) {
            buffer.apply(ev_type, code, value);
            return;
        }

        if buffer.contact_active() {
            return;
        }

        let closed = std::mem::take(buffer);
        let Some(start_ts) = closed.first_ts else {
            return;
        };
        if !closed.touch_down_seen {
            tracing::trace!(ts = %event.timestamp, "frame without touch contact, not a gesture");
            self.result.discarded_no_contact += 1;
            return;
        }

        let kind = closed.classify(start_ts, event.timestamp, &self.config);
        self.result.gestures.push(GestureInterval {
            kind,
            start_ts,
            end_ts: event.timestamp,
            event_count: closed.event_count,
            device: dev.clone(),
            displacement_px: closed.last_displacement(),
        });
    }

    pub fn finish(mut self) -> Segmentation {
        for (device, buffer) in &self.buffers {
            if buffer.event_count > 0 {
                tracing::debug!(
                    device = device.as_deref().unwrap_or("-"),
                    events = buffer.event_count,
                    "discarding incomplete gesture at end of stream"
                );
                self.result.discarded_incomplete += 1;
            }
        }
        self.result
            .gestures
            .sort_by_key(|g| (g.start_ts, g.end_ts));
        self.result
    }
}

/// Segment an ordered event stream into gestures
pub fn segment<'a, I>(events: I, config: &SegmenterConfig) -> Segmentation
where
    I: IntoIterator<Item = &'a TraceEvent>,
{
    let mut segmenter = GestureSegmenter::new(config.clone());
    for event in events {
        segmenter.push(event);
    }
    segmenter.finish()
}
