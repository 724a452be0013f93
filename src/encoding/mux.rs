// Audio/video muxer
//
// Combines a video-only Matroska file and a WAV file into a single Matroska
// file with both tracks. Streams are copied, not re-encoded.

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;

use super::{make_element, run_to_eos, EncodeError, Muxer, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct GstMuxer;

impl Muxer for GstMuxer {
    fn mux(&mut self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        gst::init().map_err(|e| EncodeError::Gst(e.to_string()))?;

        log::info!(
            "Combining audio+video into single MKV: {} + {}",
            video.display(),
            audio.display()
        );

        // Built by hand to handle matroskademux's dynamic pads
        let pipeline = gst::Pipeline::new();

        let video_filesrc = gst::ElementFactory::make("filesrc")
            .property("location", video.to_string_lossy().to_string())
            .build()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to create video filesrc: {}", e)))?;
        let demux = make_element("matroskademux")?;
        let video_queue = make_element("queue")?;

        let audio_filesrc = gst::ElementFactory::make("filesrc")
            .property("location", audio.to_string_lossy().to_string())
            .build()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to create audio filesrc: {}", e)))?;
        let audio_parser = make_element("wavparse")?;
        let audio_queue = make_element("queue")?;

        let mux = gst::ElementFactory::make("matroskamux")
            .property("writing-app", "annocap")
            .build()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to create matroskamux: {}", e)))?;
        let filesink = gst::ElementFactory::make("filesink")
            .property("location", output.to_string_lossy().to_string())
            .build()
            .map_err(|e| EncodeError::Pipeline(format!("Failed to create filesink: {}", e)))?;

        pipeline
            .add_many([
                &video_filesrc,
                &demux,
                &video_queue,
                &audio_filesrc,
                &audio_parser,
                &audio_queue,
                &mux,
                &filesink,
            ])
            .map_err(|e| EncodeError::Pipeline(format!("Failed to add elements: {}", e)))?;

        video_filesrc
            .link(&demux)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to link video filesrc -> demux: {}", e)))?;
        video_queue
            .link(&mux)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to link video queue -> mux: {}", e)))?;
        gst::Element::link_many([&audio_filesrc, &audio_parser, &audio_queue, &mux])
            .map_err(|e| EncodeError::Pipeline(format!("Failed to link audio branch: {}", e)))?;
        mux.link(&filesink)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to link mux -> filesink: {}", e)))?;

        let vqueue_weak = video_queue.downgrade();
        demux.connect_pad_added(move |_demux, src_pad| {
            let pad_name = src_pad.name();
            if !pad_name.starts_with("video") {
                log::debug!("Ignoring demux pad: {} (only taking video)", pad_name);
                return;
            }
            let Some(queue) = vqueue_weak.upgrade() else {
                return;
            };
            let Some(sink_pad) = queue.static_pad("sink") else {
                return;
            };
            if !sink_pad.is_linked() {
                if let Err(e) = src_pad.link(&sink_pad) {
                    log::warn!("Failed to link demux video pad: {:?}", e);
                }
            }
        });

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| EncodeError::Pipeline(format!("Failed to start combine pipeline: {:?}", e)))?;

        if let Err(e) = run_to_eos(&pipeline, 300, "audio+video combine") {
            let _ = std::fs::remove_file(output);
            return Err(e);
        }

        let size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            let _ = std::fs::remove_file(output);
            return Err(EncodeError::Pipeline("Combine produced empty file".into()));
        }

        log::info!("Combined audio+video: {} ({} bytes)", output.display(), size);
        Ok(())
    }
}
