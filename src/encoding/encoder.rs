//! Video encoder for captured frames
//!
//! Pushes packed RGB rasters through a software H.264 encoder into a Matroska
//! file. Buffers are timestamped from their position in the sequence at the
//! nominal frame rate, so the output plays back frame for frame regardless of
//! how irregularly the frames were captured.
//!
//! Pipeline: appsrc (RGB) ! queue ! videoconvert ! x264enc ! h264parse ! matroskamux ! filesink

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use super::{make_element, run_to_eos, EncodeError, Result, VideoEncoder, VideoSpec};
use crate::video::{Raster, RGB_CHANNELS};

/// Configuration for video encoding
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    /// Target bitrate in kbit/s (0 = encoder default)
    pub bitrate_kbps: u32,
    /// Keyframe interval in frames (0 = automatic)
    pub keyframe_interval: u32,
    /// x264 speed preset name
    pub speed_preset: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            bitrate_kbps: 0,
            keyframe_interval: 60,
            speed_preset: "veryfast".to_string(),
        }
    }
}

/// H.264/Matroska encoder backed by GStreamer
#[derive(Debug, Default, Clone)]
pub struct GstVideoEncoder {
    config: EncoderConfig,
}

impl GstVideoEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    fn create_pipeline(&self, path: &Path, spec: VideoSpec) -> Result<(gst::Pipeline, gst_app::AppSrc)> {
        gst::init().map_err(|e| EncodeError::Gst(e.to_string()))?;
        let pipeline = gst::Pipeline::new();

        let caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Rgb)
            .width(spec.width as i32)
            .height(spec.height as i32)
            .framerate(spec.framerate())
            .build();

        // Bounded so a long session is not copied into the pipeline all at once
        let appsrc = gst_app::AppSrc::builder()
            .name("src")
            .caps(&caps)
            .format(gst::Format::Time)
            .block(true)
            .max_bytes(64 * 1024 * 1024)
            .build();

        let queue = gst::ElementFactory::make("queue")
            .property("max-size-buffers", 30u32)
            .property("max-size-time", 0u64)
            .property("max-size-bytes", 0u32)
            .build()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to create queue: {}", e)))?;

        let videoconvert = make_element("videoconvert")?;
        let encoder = self.create_encoder()?;
        let parser = make_element("h264parse")?;
        let muxer = make_element("matroskamux")?;

        let filesink = gst::ElementFactory::make("filesink")
            .property("location", path.to_string_lossy().to_string())
            .property("sync", false)
            .build()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to create filesink: {}", e)))?;

        pipeline
            .add_many([appsrc.upcast_ref(), &queue, &videoconvert, &encoder, &parser, &muxer, &filesink])
            .map_err(|e| EncodeError::Pipeline(format!("Failed to add elements: {}", e)))?;

        gst::Element::link_many([appsrc.upcast_ref(), &queue, &videoconvert, &encoder, &parser, &muxer, &filesink])
            .map_err(|e| EncodeError::Pipeline(format!("Failed to link elements: {}", e)))?;

        Ok((pipeline, appsrc))
    }

    fn create_encoder(&self) -> Result<gst::Element> {
        let encoder = make_element("x264enc")?;
        if !self.config.speed_preset.is_empty() {
            encoder.set_property_from_str("speed-preset", &self.config.speed_preset);
        }
        if self.config.bitrate_kbps > 0 {
            encoder.set_property("bitrate", self.config.bitrate_kbps);
        }
        if self.config.keyframe_interval > 0 {
            encoder.set_property("key-int-max", self.config.keyframe_interval);
        }
        Ok(encoder)
    }
}

/// Every frame must match the stream geometry
fn check_sizes(spec: VideoSpec, frames: &[&Raster]) -> Result<()> {
    for (index, frame) in frames.iter().enumerate() {
        if frame.width() != spec.width || frame.height() != spec.height {
            return Err(EncodeError::FrameSize {
                index,
                width: spec.width,
                height: spec.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }
    }
    Ok(())
}

/// Row stride GStreamer expects for packed RGB: rows start on 4-byte boundaries
fn row_stride(width: u32) -> usize {
    (width as usize * RGB_CHANNELS + 3) & !3
}

fn pad_rows(frame: &Raster, stride: usize) -> Vec<u8> {
    let row_bytes = frame.width() as usize * RGB_CHANNELS;
    if stride == row_bytes {
        return frame.as_bytes().to_vec();
    }
    let mut padded = vec![0u8; stride * frame.height() as usize];
    for (src, dst) in frame
        .as_bytes()
        .chunks_exact(row_bytes)
        .zip(padded.chunks_exact_mut(stride))
    {
        dst[..row_bytes].copy_from_slice(src);
    }
    padded
}

impl VideoEncoder for GstVideoEncoder {
    fn encode(&mut self, path: &Path, spec: VideoSpec, frames: &[&Raster]) -> Result<()> {
        if frames.is_empty() {
            return Err(EncodeError::Empty);
        }
        check_sizes(spec, frames)?;

        let (pipeline, appsrc) = self.create_pipeline(path, spec)?;
        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to start pipeline: {:?}", e)))?;

        let frame_ns = spec.frame_duration_ns();
        let stride = row_stride(spec.width);
        for (i, frame) in frames.iter().enumerate() {
            let mut buffer = gst::Buffer::from_slice(pad_rows(frame, stride));
            if let Some(buffer_ref) = buffer.get_mut() {
                buffer_ref.set_pts(gst::ClockTime::from_nseconds(i as u64 * frame_ns));
                buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_ns));
            }

            if let Err(e) = appsrc.push_buffer(buffer) {
                pipeline.set_state(gst::State::Null).ok();
                return Err(EncodeError::Pipeline(format!(
                    "Failed to push frame {}: {:?}",
                    i, e
                )));
            }

            if (i + 1) % 500 == 0 {
                log::debug!("Encoded {} of {} frames", i + 1, frames.len());
            }
        }

        if let Err(e) = appsrc.end_of_stream() {
            log::warn!("Video encoder EOS send failed: {:?}", e);
        }
        run_to_eos(&pipeline, 120, "video encode")?;

        let bytes_written = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        log::info!(
            "Encoded {} frames to {} ({} bytes)",
            frames.len(),
            path.display(),
            bytes_written
        );
        Ok(())
    }
}
