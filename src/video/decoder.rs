// Video decoder trait
//
// This defines the interface the capture loop and the playback path use to pull
// sequential raw frames from a video source.

use super::{Raster, Result};

/// A decoded frame and its presentation time
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub raster: Raster,
    /// Presentation timestamp in milliseconds
    pub pts_ms: f64,
}

/// Trait for frame-sequential video decoders
///
/// Implementations are stateful: `read_next_frame` advances a cursor that
/// `seek` repositions. `position` mirrors the decoder's own frame counter,
/// i.e. the index of the next frame to be read.
pub trait Decoder: Send {
    /// Decode the next frame, or `Ok(None)` at end of stream
    fn read_next_frame(&mut self) -> Result<Option<DecodedFrame>>;

    /// Move the cursor so the next read returns `frame_index`
    fn seek(&mut self, frame_index: u64) -> Result<()>;

    /// Index of the next frame to be read
    fn position(&self) -> u64;

    /// Total number of frames reported by the source (may be approximate)
    fn frame_count(&self) -> u64;

    /// Nominal frame rate
    fn fps(&self) -> f64;

    /// Frame dimensions as (width, height)
    fn frame_size(&self) -> (u32, u32);
}
