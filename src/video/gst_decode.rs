// GStreamer decoder
//
// Uses GStreamer's decodebin to decode any supported codec, then converts to
// packed RGB rasters for the capture loop and the playback path.
//
// Pipeline: filesrc → decodebin → videoconvert → appsink (video/x-raw,format=RGB)
//
// The decodebin element auto-detects the container and codec; only the video
// pad is linked, audio and subtitle pads are ignored.

use std::path::Path;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;

use super::decoder::{DecodedFrame, Decoder};
use super::{Raster, Result, VideoError, RGB_CHANNELS};

/// Frame rate assumed when the container does not advertise one
const FALLBACK_FPS: f64 = 30.0;

/// Sequential RGB decoder backed by a GStreamer pipeline
pub struct GstDecoder {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: u64,
    /// Index of the next frame to be read
    next_index: u64,
}

impl GstDecoder {
    /// Open a video file and preroll the decode pipeline
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(VideoError::NotFound(path.display().to_string()));
        }

        gst::init().map_err(|e| VideoError::Gst(e.to_string()))?;

        let pipeline = gst::Pipeline::new();

        let filesrc = gst::ElementFactory::make("filesrc")
            .property("location", path.to_string_lossy().to_string())
            .build()
            .map_err(|e| VideoError::Gst(format!("Failed to create filesrc: {}", e)))?;

        let decodebin = gst::ElementFactory::make("decodebin")
            .build()
            .map_err(|e| VideoError::Gst(format!("Failed to create decodebin: {}", e)))?;

        let videoconvert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(|e| VideoError::Gst(format!("Failed to create videoconvert: {}", e)))?;

        let rgb_caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Rgb)
            .build();

        let appsink = gst_app::AppSink::builder()
            .name("sink")
            .caps(&rgb_caps)
            .sync(false)
            .build();

        pipeline
            .add_many([&filesrc, &decodebin, &videoconvert, appsink.upcast_ref()])
            .map_err(|e| VideoError::Gst(format!("Failed to add elements: {}", e)))?;

        filesrc
            .link(&decodebin)
            .map_err(|e| VideoError::Gst(format!("Failed to link filesrc to decodebin: {}", e)))?;

        videoconvert
            .link(&appsink)
            .map_err(|e| VideoError::Gst(format!("Failed to link videoconvert to appsink: {}", e)))?;

        let videoconvert_weak = videoconvert.downgrade();
        decodebin.connect_pad_added(move |_decodebin, src_pad| {
            let Some(videoconvert) = videoconvert_weak.upgrade() else {
                return;
            };

            let caps = src_pad
                .current_caps()
                .unwrap_or_else(|| src_pad.query_caps(None));
            let Some(structure) = caps.structure(0) else {
                return;
            };
            let name = structure.name().as_str();
            if !name.starts_with("video/") {
                log::debug!("GstDecoder: ignoring non-video pad with caps '{}'", name);
                return;
            }
            let Some(sink_pad) = videoconvert.static_pad("sink") else {
                return;
            };
            if !sink_pad.is_linked() {
                if let Err(e) = src_pad.link(&sink_pad) {
                    log::warn!("GstDecoder: failed to link video pad: {:?}", e);
                }
            }
        });

        pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| VideoError::Gst(format!("Failed to set pipeline to PAUSED: {:?}", e)))?;

        let Some(bus) = pipeline.bus() else {
            pipeline.set_state(gst::State::Null).ok();
            return Err(VideoError::Gst("Failed to get pipeline bus".into()));
        };

        let mut width = 0u32;
        let mut height = 0u32;
        let mut duration_ms = 0u64;

        for msg in bus.iter_timed(gst::ClockTime::from_seconds(10)) {
            match msg.view() {
                gst::MessageView::AsyncDone(_) => {
                    if let Some(dur) = pipeline.query_duration::<gst::ClockTime>() {
                        duration_ms = dur.mseconds();
                    }
                    if let Some(sample) = appsink.try_pull_preroll(gst::ClockTime::from_seconds(5)) {
                        if let Some(info) = sample
                            .caps()
                            .and_then(|caps| gst_video::VideoInfo::from_caps(caps).ok())
                        {
                            width = info.width();
                            height = info.height();
                        }
                    }
                    break;
                }
                gst::MessageView::Error(err) => {
                    pipeline.set_state(gst::State::Null).ok();
                    return Err(VideoError::Gst(format!(
                        "Pipeline error: {} ({:?})",
                        err.error(),
                        err.debug()
                    )));
                }
                _ => {}
            }
        }

        if width == 0 || height == 0 {
            pipeline.set_state(gst::State::Null).ok();
            return Err(VideoError::NoVideoTrack);
        }

        let fps = Self::probe_fps(&path).unwrap_or(FALLBACK_FPS);
        let frame_count = (duration_ms as f64 * fps / 1000.0) as u64;

        log::info!(
            "Opened {} ({}x{} @ {:.2}fps, ~{} frames)",
            path.display(),
            width,
            height,
            fps,
            frame_count
        );

        Ok(Self {
            pipeline,
            appsink,
            width,
            height,
            fps,
            frame_count,
            next_index: 0,
        })
    }

    /// Probe the video file's FPS using GStreamer's discoverer
    fn probe_fps(path: &Path) -> Option<f64> {
        use gst_pbutils::prelude::*;
        use gstreamer_pbutils as gst_pbutils;

        let discoverer = gst_pbutils::Discoverer::new(gst::ClockTime::from_seconds(10)).ok()?;
        let absolute = std::fs::canonicalize(path).ok()?;
        let uri = gst::glib::filename_to_uri(&absolute, None).ok()?;
        let info = discoverer.discover_uri(uri.as_str()).ok()?;

        let video_streams = info.video_streams();
        let stream = video_streams.first()?;
        let caps = stream.caps()?;
        let structure = caps.structure(0)?;

        let fps = structure.get::<gst::Fraction>("framerate").ok()?;
        let fps_val = fps.numer() as f64 / fps.denom() as f64;
        (fps_val > 0.0).then_some(fps_val)
    }

    fn ensure_playing(&self) -> Result<()> {
        if self.pipeline.current_state() != gst::State::Playing {
            self.pipeline
                .set_state(gst::State::Playing)
                .map_err(|e| VideoError::Gst(format!("Failed to set PLAYING: {:?}", e)))?;
            let _ = self.pipeline.state(gst::ClockTime::from_seconds(2));
        }
        Ok(())
    }

    /// Copy a mapped RGB buffer into a packed raster, dropping row padding
    fn unpack(data: &[u8], info: &gst_video::VideoInfo) -> Result<Raster> {
        let width = info.width();
        let height = info.height();
        let stride = info.stride().first().copied().unwrap_or(0).max(0) as usize;
        let row_bytes = width as usize * RGB_CHANNELS;

        if stride == row_bytes {
            return Raster::from_rgb(width, height, data[..row_bytes * height as usize].to_vec());
        }

        let mut packed = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_bytes;
            let Some(slice) = data.get(start..end) else {
                return Err(VideoError::Parse(format!("Short frame buffer at row {}", row)));
            };
            packed.extend_from_slice(slice);
        }
        Raster::from_rgb(width, height, packed)
    }
}

impl Decoder for GstDecoder {
    fn read_next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        self.ensure_playing()?;

        let Some(sample) = self.appsink.try_pull_sample(gst::ClockTime::from_seconds(2)) else {
            if !self.appsink.is_eos() {
                log::warn!("GstDecoder: timed out waiting for frame {}", self.next_index);
            }
            return Ok(None);
        };

        let caps = sample
            .caps()
            .ok_or_else(|| VideoError::Parse("No caps on sample".into()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| VideoError::Parse(format!("Invalid video caps: {}", e)))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| VideoError::Parse("No buffer in sample".into()))?;
        let pts_ms = buffer
            .pts()
            .map(|t| t.nseconds() as f64 / 1_000_000.0)
            .unwrap_or(self.next_index as f64 * 1000.0 / self.fps);

        let map = buffer
            .map_readable()
            .map_err(|e| VideoError::Parse(format!("Failed to map buffer: {}", e)))?;
        let raster = Self::unpack(map.as_slice(), &info)?;

        self.next_index += 1;
        Ok(Some(DecodedFrame { raster, pts_ms }))
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        let seek_ns = (frame_index as f64 * 1_000_000_000.0 / self.fps) as u64;

        self.pipeline
            .seek_simple(
                gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE,
                gst::ClockTime::from_nseconds(seek_ns),
            )
            .map_err(|e| VideoError::Gst(format!("Seek failed: {:?}", e)))?;

        let Some(bus) = self.pipeline.bus() else {
            return Err(VideoError::Gst("Failed to get pipeline bus for seek".into()));
        };
        for msg in bus.iter_timed(gst::ClockTime::from_seconds(2)) {
            match msg.view() {
                gst::MessageView::AsyncDone(_) => break,
                gst::MessageView::Error(err) => {
                    return Err(VideoError::Gst(format!("Seek error: {}", err.error())));
                }
                _ => {}
            }
        }

        self.next_index = frame_index;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.next_index
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for GstDecoder {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            log::warn!("GstDecoder: failed to release pipeline: {:?}", e);
        }
    }
}
