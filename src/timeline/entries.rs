// Timeline entry types
//
// Frames, audio chunks and annotation entries as they are held in memory, plus
// the persisted JSON shape of an annotation entry:
//   { "idx": 3, "org_idx": 4, "time_str": "0:00:01", "anno": ["move", [10, 20]], "timestamp": 0.12 }
// where "anno" is [] when the frame carries no stroke.

use std::time::Instant;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::video::Raster;

/// Shared capture clock.
///
/// Created once at session setup; copies are handed to the capture loop and
/// moved into the audio callback so both streams timestamp against the same
/// origin.
#[derive(Debug, Clone, Copy)]
pub struct Epoch(Instant);

impl Epoch {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Seconds since the epoch was created
    pub fn elapsed_secs(&self) -> f64 {
        self.0.elapsed().as_secs_f64()
    }
}

/// Pointer position in raster coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrokeState {
    Start,
    Move,
    End,
}

/// The persisted command/point pair of a frame. Serialized as `[state, [x, y]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(StrokeState, Point)", into = "(StrokeState, Point)")]
pub struct StrokeMark {
    pub state: StrokeState,
    pub point: Point,
}

impl StrokeMark {
    pub const fn new(state: StrokeState, point: Point) -> Self {
        Self { state, point }
    }
}

impl From<(StrokeState, Point)> for StrokeMark {
    fn from((state, point): (StrokeState, Point)) -> Self {
        Self { state, point }
    }
}

impl From<StrokeMark> for (StrokeState, Point) {
    fn from(mark: StrokeMark) -> Self {
        (mark.state, mark.point)
    }
}

/// One capture tick. Its position in the store is its logical index.
#[derive(Debug, Clone)]
pub struct FrameEntry {
    /// Seconds since the session epoch
    pub capture_timestamp: f64,
    /// Progress counter of the capture loop when this frame was taken
    pub frame_index: u64,
    /// Frame as decoded, before any overlay
    pub pixels: Raster,
}

/// Interleaved PCM delivered by one audio callback
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Seconds since the session epoch
    pub capture_timestamp: f64,
    pub samples: Vec<f32>,
}

/// Per-frame annotation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationEntry {
    #[serde(rename = "idx")]
    pub frame_index: u64,
    /// Decoder position when the frame was captured
    #[serde(rename = "org_idx")]
    pub source_frame_index: u64,
    #[serde(rename = "time_str")]
    pub time_label: String,
    #[serde(rename = "anno", with = "anno_format", default)]
    pub stroke: Option<StrokeMark>,
    #[serde(rename = "timestamp")]
    pub capture_timestamp: f64,
}

/// Everything of an annotation entry except its stroke
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationPatch {
    pub frame_index: u64,
    pub source_frame_index: u64,
    pub time_label: String,
    pub capture_timestamp: f64,
}

impl AnnotationEntry {
    pub fn from_patch(patch: AnnotationPatch) -> Self {
        Self {
            frame_index: patch.frame_index,
            source_frame_index: patch.source_frame_index,
            time_label: patch.time_label,
            stroke: None,
            capture_timestamp: patch.capture_timestamp,
        }
    }

    /// Overwrite the descriptive fields, keeping the stroke
    pub fn apply(&mut self, patch: AnnotationPatch) {
        self.frame_index = patch.frame_index;
        self.source_frame_index = patch.source_frame_index;
        self.time_label = patch.time_label;
        self.capture_timestamp = patch.capture_timestamp;
    }
}

mod anno_format {
    use super::*;
    use serde::ser::SerializeSeq;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAnno {
        Mark(StrokeMark),
        Empty([(); 0]),
        Null(()),
    }

    pub fn serialize<S: Serializer>(
        stroke: &Option<StrokeMark>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match stroke {
            Some(mark) => mark.serialize(serializer),
            None => serializer.serialize_seq(Some(0))?.end(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<StrokeMark>, D::Error> {
        Ok(match RawAnno::deserialize(deserializer)? {
            RawAnno::Mark(mark) => Some(mark),
            RawAnno::Empty(_) | RawAnno::Null(()) => None,
        })
    }
}
