// Encoding and muxing
//
// The save path writes three artifacts through these seams:
// 1. captured frames → H.264 in Matroska (VideoEncoder)
// 2. reconciled PCM → WAV (AudioFileWriter)
// 3. video + audio → final Matroska file (Muxer)
//
// The GStreamer implementations live in the submodules. Each call builds a
// pipeline, runs it to end of stream and tears it down again.

pub mod audio;
pub mod encoder;
pub mod mux;

pub use audio::GstWavWriter;
pub use encoder::GstVideoEncoder;
pub use mux::GstMuxer;

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;

use crate::video::Raster;

/// Error type for encoder operations
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("GStreamer error: {0}")]
    Gst(String),

    #[error("Encoder not available: {0}")]
    NotAvailable(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Frame {index} is {actual_width}x{actual_height}, expected {width}x{height}")]
    FrameSize {
        index: usize,
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Nothing to encode")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EncodeError>;

/// Geometry and rate of an encoded video stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl VideoSpec {
    /// Frame rate as a GStreamer fraction (millihertz precision)
    pub fn framerate(&self) -> gst::Fraction {
        let fps = if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            30.0
        };
        gst::Fraction::new((fps * 1000.0).round() as i32, 1000)
    }

    /// Duration of one frame in nanoseconds
    pub fn frame_duration_ns(&self) -> u64 {
        let rate = self.framerate();
        rate.denom() as u64 * 1_000_000_000 / rate.numer().max(1) as u64
    }
}

/// Writes ordered RGB frames into a video file
pub trait VideoEncoder {
    fn encode(&mut self, path: &Path, spec: VideoSpec, frames: &[&Raster]) -> Result<()>;
}

/// Writes interleaved f32 samples into an audio file
pub trait AudioFileWriter {
    fn write(&mut self, path: &Path, sample_rate: u32, channels: u16, samples: &[f32]) -> Result<()>;
}

/// Merges a video-only file and an audio-only file into `output`
pub trait Muxer {
    fn mux(&mut self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

/// Block until the pipeline posts EOS or an error, then stop it
pub(crate) fn run_to_eos(pipeline: &gst::Pipeline, timeout_secs: u64, what: &str) -> Result<()> {
    let bus = pipeline
        .bus()
        .ok_or_else(|| EncodeError::Pipeline(format!("No pipeline bus for {}", what)))?;

    let mut outcome = Err(EncodeError::Pipeline(format!(
        "{} did not finish within {}s",
        what, timeout_secs
    )));
    for msg in bus.iter_timed(gst::ClockTime::from_seconds(timeout_secs)) {
        match msg.view() {
            gst::MessageView::Eos(..) => {
                outcome = Ok(());
                break;
            }
            gst::MessageView::Error(err) => {
                outcome = Err(EncodeError::Gst(format!(
                    "{} error: {} ({})",
                    what,
                    err.error(),
                    err.debug().unwrap_or_default()
                )));
                break;
            }
            _ => {}
        }
    }

    if let Err(e) = pipeline.set_state(gst::State::Null) {
        log::warn!("Failed to stop {} pipeline: {:?}", what, e);
    }
    outcome
}

/// Create a named GStreamer element
pub(crate) fn make_element(factory: &str) -> Result<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| EncodeError::NotAvailable(format!("Failed to create {}: {}", factory, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framerate_keeps_fractional_rates() {
        let spec = VideoSpec {
            width: 4,
            height: 4,
            fps: 29.97,
        };
        assert_eq!(spec.framerate(), gst::Fraction::new(29970, 1000));
        assert_eq!(spec.frame_duration_ns(), 33_366_700);
    }

    #[test]
    fn invalid_rates_fall_back_to_thirty() {
        let spec = VideoSpec {
            width: 4,
            height: 4,
            fps: 0.0,
        };
        assert_eq!(spec.frame_duration_ns(), 33_333_333);
    }
}
