// Annotation strokes
//
// StrokeTracker turns pointer events into stroke commands on the latest
// captured frame. StrokeRenderer replays those commands onto rasters; the
// capture loop uses it for the live overlay and the playback path uses the same
// renderer over a saved timeline, so both draw identically.

use serde::{Deserialize, Serialize};

use crate::timeline::{Point, StrokeMark, StrokeState, TimelineStore};
use crate::video::overlay::{draw_line, draw_polyline, StrokeStyle};
use crate::video::Raster;

/// Default trailing window (in frames) during which the last stroke is redrawn.
/// The last stroke always sits on the newest frame, so any window of 1 or more
/// never suppresses the redraw; only 0 does.
pub const DEFAULT_STALE_STROKE_WINDOW: u64 = 5;

/// Pointer input delivered by the preview surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up(Point),
}

/// How an in-progress stroke is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokePolicy {
    /// Connect only the two most recent points
    #[default]
    Short,
    /// Redraw every point of the stroke each time
    Long,
}

impl StrokePolicy {
    pub fn from_long(long_annotations: bool) -> Self {
        if long_annotations {
            Self::Long
        } else {
            Self::Short
        }
    }
}

/// Replays Start/Move/End commands onto rasters
#[derive(Debug, Clone)]
pub struct StrokeRenderer {
    policy: StrokePolicy,
    style: StrokeStyle,
    /// Points of the open stroke (long policy)
    chunk: Vec<Point>,
    /// Last point of the open stroke (short policy)
    anchor: Option<Point>,
}

impl StrokeRenderer {
    pub fn new(policy: StrokePolicy, style: StrokeStyle) -> Self {
        Self {
            policy,
            style,
            chunk: Vec::new(),
            anchor: None,
        }
    }

    pub fn policy(&self) -> StrokePolicy {
        self.policy
    }

    /// True between a Start and its End
    pub fn is_open(&self) -> bool {
        self.anchor.is_some()
    }

    /// Forget any open stroke
    pub fn reset(&mut self) {
        self.chunk.clear();
        self.anchor = None;
    }

    /// Apply one command, drawing onto `raster`. Move and End without an open
    /// Start draw nothing.
    pub fn apply(&mut self, raster: &mut Raster, mark: StrokeMark) {
        let point = mark.point;
        match mark.state {
            StrokeState::Start => {
                self.chunk.clear();
                self.chunk.push(point);
                self.anchor = Some(point);
            }
            StrokeState::Move => {
                let Some(anchor) = self.anchor else {
                    return;
                };
                match self.policy {
                    StrokePolicy::Long => {
                        self.chunk.push(point);
                        draw_polyline(raster, &self.chunk, self.style);
                    }
                    StrokePolicy::Short => {
                        draw_line(raster, anchor, point, self.style);
                    }
                }
                self.anchor = Some(point);
            }
            StrokeState::End => {
                let Some(anchor) = self.anchor else {
                    return;
                };
                match self.policy {
                    StrokePolicy::Long => {
                        self.chunk.push(point);
                        draw_polyline(raster, &self.chunk, self.style);
                    }
                    StrokePolicy::Short => {
                        draw_line(raster, anchor, point, self.style);
                    }
                }
                self.reset();
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackerState {
    Idle,
    Drawing,
}

/// Pointer state machine of a capture session
pub struct StrokeTracker {
    state: TrackerState,
    renderer: StrokeRenderer,
    stale_window: u64,
}

impl StrokeTracker {
    pub fn new(policy: StrokePolicy, style: StrokeStyle, stale_window: u64) -> Self {
        Self {
            state: TrackerState::Idle,
            renderer: StrokeRenderer::new(policy, style),
            stale_window,
        }
    }

    pub fn is_drawing(&self) -> bool {
        self.state == TrackerState::Drawing
    }

    /// Record a pointer event against the latest captured frame.
    ///
    /// Returns the command recorded, or None when the event does not apply in
    /// the current state (move/up while idle, down while drawing).
    pub fn handle(&mut self, event: PointerEvent, timeline: &TimelineStore) -> Option<StrokeState> {
        let (state, point) = match (self.state, event) {
            (TrackerState::Idle, PointerEvent::Down(p)) => {
                self.state = TrackerState::Drawing;
                log::debug!("Started drawing annotation at ({}, {})", p.x, p.y);
                (StrokeState::Start, p)
            }
            (TrackerState::Drawing, PointerEvent::Move(p)) => (StrokeState::Move, p),
            (TrackerState::Drawing, PointerEvent::Up(p)) => {
                self.state = TrackerState::Idle;
                log::debug!("Ended drawing annotation at ({}, {})", p.x, p.y);
                (StrokeState::End, p)
            }
            _ => return None,
        };

        timeline.mark_latest(state, point);
        Some(state)
    }

    /// Draw the live overlay for the most recent stroke command, unless it
    /// is older than the staleness window.
    pub fn overlay(&mut self, raster: &mut Raster, timeline: &TimelineStore) {
        let Some((index, mark)) = timeline.last_stroke() else {
            return;
        };
        let frame_count = timeline.frame_count() as u64;
        if index.abs_diff(frame_count) > self.stale_window {
            return;
        }
        self.renderer.apply(raster, mark);
    }

    /// Back to Idle with no open stroke
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
        self.renderer.reset();
    }
}
