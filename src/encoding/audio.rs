// WAV writer
//
// Writes interleaved f32 samples to a float WAV file.
// Pipeline: appsrc(F32LE) ! audioconvert ! wavenc ! filesink

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_audio as gst_audio;

use super::{make_element, run_to_eos, AudioFileWriter, EncodeError, Result};

/// Samples per pushed buffer, per channel (one second at 48 kHz)
const FRAMES_PER_BUFFER: usize = 48_000;

#[derive(Debug, Default, Clone, Copy)]
pub struct GstWavWriter;

impl GstWavWriter {
    fn create_pipeline(
        path: &Path,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(gst::Pipeline, gst_app::AppSrc)> {
        gst::init().map_err(|e| EncodeError::Gst(e.to_string()))?;

        let input_info =
            gst_audio::AudioInfo::builder(gst_audio::AudioFormat::F32le, sample_rate, channels as u32)
                .build()
                .map_err(|e| EncodeError::Pipeline(format!("Failed to create input audio info: {}", e)))?;
        let caps = input_info
            .to_caps()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to create input caps: {}", e)))?;

        let pipeline = gst::Pipeline::new();
        let appsrc = gst_app::AppSrc::builder()
            .name("src")
            .caps(&caps)
            .format(gst::Format::Time)
            .build();

        let audioconvert = make_element("audioconvert")?;
        let encoder = make_element("wavenc")?;
        let filesink = gst::ElementFactory::make("filesink")
            .name("sink")
            .property("location", path.to_string_lossy().to_string())
            .build()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to create filesink: {}", e)))?;

        pipeline
            .add_many([appsrc.upcast_ref(), &audioconvert, &encoder, &filesink])
            .map_err(|e| EncodeError::Pipeline(format!("Failed to add elements to pipeline: {}", e)))?;
        gst::Element::link_many([appsrc.upcast_ref(), &audioconvert, &encoder, &filesink])
            .map_err(|e| EncodeError::Pipeline(format!("Failed to link pipeline elements: {}", e)))?;

        Ok((pipeline, appsrc))
    }
}

impl AudioFileWriter for GstWavWriter {
    fn write(&mut self, path: &Path, sample_rate: u32, channels: u16, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Err(EncodeError::Empty);
        }
        let channels = channels.max(1);
        let (pipeline, appsrc) = Self::create_pipeline(path, sample_rate, channels)?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to start audio pipeline: {:?}", e)))?;

        let mut frames_pushed = 0u64;
        for chunk in samples.chunks(FRAMES_PER_BUFFER * channels as usize) {
            let num_frames = (chunk.len() / channels as usize) as u64;
            let pts_ns = frames_pushed * 1_000_000_000 / sample_rate as u64;
            let duration_ns = num_frames * 1_000_000_000 / sample_rate as u64;

            let bytes: Vec<u8> = chunk.iter().copied().flat_map(f32::to_le_bytes).collect();
            let mut buffer = gst::Buffer::from_slice(bytes);
            if let Some(buffer_ref) = buffer.get_mut() {
                buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts_ns));
                buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration_ns));
            }

            if let Err(e) = appsrc.push_buffer(buffer) {
                pipeline.set_state(gst::State::Null).ok();
                return Err(EncodeError::Pipeline(format!("Audio push error: {:?}", e)));
            }
            frames_pushed += num_frames;
        }

        appsrc
            .end_of_stream()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to send EOS: {:?}", e)))?;
        run_to_eos(&pipeline, 30, "audio write")?;

        let duration_secs = frames_pushed as f64 / sample_rate as f64;
        log::info!(
            "Audio written to {} ({:.1}s, {}Hz, {}ch)",
            path.display(),
            duration_secs,
            sample_rate,
            channels
        );
        Ok(())
    }
}
