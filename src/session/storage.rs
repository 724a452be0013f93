// Session storage
//
// Output naming and the staged save. Stages run in a fixed order and each
// reports its own outcome; a failed stage never stops the annotation JSON from
// being written, and intermediates are only deleted after a successful mux.

use std::fmt;
use std::path::{Path, PathBuf};

use super::metadata::{AnnotationTimeline, SessionMetadata};
use super::reconcile::{align_to_channels, reconcile_audio};
use super::{Result, SessionError};
use crate::encoding::encoder::EncoderConfig;
use crate::encoding::{
    AudioFileWriter, EncodeError, GstMuxer, GstVideoEncoder, GstWavWriter, Muxer, VideoEncoder,
    VideoSpec,
};
use crate::timeline::FinishedTimeline;
use crate::video::Raster;

/// Where one session's artifacts go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub dir: PathBuf,
    /// Muxed result: `<stem>_annotated.mkv`
    pub final_video: PathBuf,
    /// `<stem>_annotated.json`
    pub timeline: PathBuf,
    /// Video-only intermediate: `<stem>_video.mkv`
    pub video_intermediate: PathBuf,
    /// Audio-only intermediate: `<stem>.wav`
    pub audio_intermediate: PathBuf,
}

impl OutputPaths {
    /// Paths for `input` under `output_dir`. When `input` lies inside
    /// `input_dir`, its subdirectory below `input_dir` is kept.
    pub fn for_input(input: &Path, input_dir: Option<&Path>, output_dir: &Path) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "session".to_string());

        let relative = input_dir
            .and_then(|base| input.parent()?.strip_prefix(base).ok())
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let dir = output_dir.join(relative);

        Self {
            final_video: dir.join(format!("{}_annotated.mkv", stem)),
            timeline: dir.join(format!("{}_annotated.json", stem)),
            video_intermediate: dir.join(format!("{}_video.mkv", stem)),
            audio_intermediate: dir.join(format!("{}.wav", stem)),
            dir,
        }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| SessionError::Io {
            path: self.dir.clone(),
            source: e,
        })
    }
}

/// Result of a single save stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Written(PathBuf),
    /// Nothing to write, or a prerequisite stage produced nothing
    Skipped(String),
    Failed(String),
}

impl StageOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, StageOutcome::Written(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }
}

impl fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageOutcome::Written(path) => write!(f, "written to {}", path.display()),
            StageOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
            StageOutcome::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// Per-stage outcomes of a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub video: StageOutcome,
    pub audio: StageOutcome,
    pub mux: StageOutcome,
    pub annotations: StageOutcome,
}

impl SaveReport {
    pub fn all_ok(&self) -> bool {
        ![&self.video, &self.audio, &self.mux, &self.annotations]
            .iter()
            .any(|stage| stage.is_failed())
    }

    pub fn log(&self) {
        for (name, stage) in [
            ("video", &self.video),
            ("audio", &self.audio),
            ("mux", &self.mux),
            ("annotations", &self.annotations),
        ] {
            if stage.is_failed() {
                log::error!("Save stage {}: {}", name, stage);
            } else {
                log::info!("Save stage {}: {}", name, stage);
            }
        }
    }
}

/// The collaborators a save writes through
pub struct SaveTargets {
    pub encoder: Box<dyn VideoEncoder>,
    pub audio_writer: Box<dyn AudioFileWriter>,
    pub muxer: Box<dyn Muxer>,
}

impl SaveTargets {
    /// GStreamer-backed targets
    pub fn gstreamer(encoder_config: EncoderConfig) -> Self {
        Self {
            encoder: Box::new(GstVideoEncoder::new(encoder_config)),
            audio_writer: Box::new(GstWavWriter),
            muxer: Box::new(GstMuxer),
        }
    }
}

/// Write a finished session: video, then audio, then mux and cleanup, then
/// the annotation JSON. `metadata.frame_count` is replaced by the timeline's
/// high-water mark.
pub fn persist(
    finished: FinishedTimeline,
    mut metadata: SessionMetadata,
    paths: &OutputPaths,
    targets: &mut SaveTargets,
    gap_threshold_secs: f64,
) -> SaveReport {
    log::info!(
        "Saving {} ({} frames, {} audio chunks) to {}",
        metadata.video_name,
        finished.frames.len(),
        finished.audio.len(),
        paths.dir.display()
    );

    if let Err(e) = paths.ensure_dir() {
        let failed = StageOutcome::Failed(e.to_string());
        let report = SaveReport {
            video: failed.clone(),
            audio: failed.clone(),
            mux: failed.clone(),
            annotations: failed,
        };
        report.log();
        return report;
    }

    metadata.frame_count = finished.max_frames;

    let video = write_video(&finished, &metadata, paths, targets.encoder.as_mut());
    let audio = write_audio(&finished, &metadata, paths, targets.audio_writer.as_mut(), gap_threshold_secs);
    let mux = merge(&video, &audio, paths, targets.muxer.as_mut());

    let annotations = if finished.annotations.is_empty() {
        StageOutcome::Skipped("no annotations".into())
    } else {
        let timeline = AnnotationTimeline::from_entries(finished.annotations, metadata);
        match timeline.save(&paths.timeline) {
            Ok(()) => StageOutcome::Written(paths.timeline.clone()),
            Err(e) => StageOutcome::Failed(e.to_string()),
        }
    };

    let report = SaveReport {
        video,
        audio,
        mux,
        annotations,
    };
    report.log();
    report
}

fn encode_outcome(result: std::result::Result<(), EncodeError>, path: &Path) -> StageOutcome {
    match result {
        Ok(()) => StageOutcome::Written(path.to_path_buf()),
        Err(EncodeError::Empty) => StageOutcome::Skipped("nothing to write".into()),
        Err(e) => StageOutcome::Failed(e.to_string()),
    }
}

fn write_video(
    finished: &FinishedTimeline,
    metadata: &SessionMetadata,
    paths: &OutputPaths,
    encoder: &mut dyn VideoEncoder,
) -> StageOutcome {
    if finished.frames.is_empty() {
        return StageOutcome::Skipped("no frames".into());
    }

    let mut frames: Vec<&Raster> = Vec::with_capacity(finished.frames.len());
    for frame in &finished.frames {
        if frame.frame_index < finished.max_frames {
            frames.push(&frame.pixels);
        } else {
            log::warn!("Frame index {} is out of range, not written", frame.frame_index);
        }
    }

    let spec = VideoSpec {
        width: metadata.frame_width,
        height: metadata.frame_height,
        fps: metadata.frame_rate,
    };
    encode_outcome(
        encoder.encode(&paths.video_intermediate, spec, &frames),
        &paths.video_intermediate,
    )
}

fn write_audio(
    finished: &FinishedTimeline,
    metadata: &SessionMetadata,
    paths: &OutputPaths,
    writer: &mut dyn AudioFileWriter,
    gap_threshold_secs: f64,
) -> StageOutcome {
    let timestamps: Vec<f64> = finished.frames.iter().map(|f| f.capture_timestamp).collect();
    let mut reconciled = reconcile_audio(&timestamps, &finished.audio, gap_threshold_secs);
    align_to_channels(&mut reconciled.samples, metadata.channels);

    if reconciled.is_empty() {
        log::warn!("No audio data to save");
        return StageOutcome::Skipped("no audio".into());
    }
    if !reconciled.gaps.is_empty() {
        log::info!(
            "Cut {} audio chunks captured during {} frame gaps",
            reconciled.chunks_dropped,
            reconciled.gaps.len()
        );
    }

    encode_outcome(
        writer.write(
            &paths.audio_intermediate,
            metadata.sample_rate,
            metadata.channels,
            &reconciled.samples,
        ),
        &paths.audio_intermediate,
    )
}

fn merge(
    video: &StageOutcome,
    audio: &StageOutcome,
    paths: &OutputPaths,
    muxer: &mut dyn Muxer,
) -> StageOutcome {
    if !video.is_written() {
        return StageOutcome::Skipped("no video track".into());
    }

    if !audio.is_written() {
        // Video only: the intermediate becomes the result as is
        return match std::fs::rename(&paths.video_intermediate, &paths.final_video) {
            Ok(()) => StageOutcome::Skipped(format!(
                "no audio track, video moved to {}",
                paths.final_video.display()
            )),
            Err(e) => StageOutcome::Failed(format!("Failed to move video-only output: {}", e)),
        };
    }

    match muxer.mux(&paths.video_intermediate, &paths.audio_intermediate, &paths.final_video) {
        Ok(()) => {
            for intermediate in [&paths.video_intermediate, &paths.audio_intermediate] {
                match std::fs::remove_file(intermediate) {
                    Ok(()) => log::debug!("Deleted temporary file {}", intermediate.display()),
                    Err(e) => log::warn!("Failed to delete {}: {}", intermediate.display(), e),
                }
            }
            StageOutcome::Written(paths.final_video.clone())
        }
        Err(e) => StageOutcome::Failed(e.to_string()),
    }
}
