// Capture session
//
// Wires one annotation session together: the timeline, the capture thread,
// the audio input and the command channel. The control side only enqueues
// commands and reads the status mirror; closing stops the decoder and the
// audio stream, joins the capture thread within a deadline and only then
// hands the timeline over for saving.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use super::audio::{AudioCaptureSink, AudioFormat, AudioInput};
use super::capture::{CaptureLoop, CaptureSettings, CaptureStatus, StatusSnapshot};
use super::command::{command_channel, CommandSender};
use super::surface::PreviewSurface;
use crate::session::{
    persist, OutputPaths, Result, SaveReport, SaveTargets, SessionError, SessionMetadata,
};
use crate::timeline::{Epoch, FinishedTimeline, TimelineStore};
use crate::video::{Decoder, GstDecoder, VideoError};

/// Default time allowed for the capture thread to exit on close
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(1000);

/// Session-wide options
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub capture: CaptureSettings,
    pub join_timeout: Duration,
    pub gap_threshold_secs: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            capture: CaptureSettings::default(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            gap_threshold_secs: crate::session::DEFAULT_GAP_THRESHOLD_SECS,
        }
    }
}

/// Source and audio format of a session, logged at start and saved as metadata
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub video_name: String,
    pub frame_rate: f64,
    pub frame_count: u64,
    pub frame_width: u32,
    pub frame_height: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SessionInfo {
    fn log(&self) {
        log::info!(
            "Session started: {} ({}x{} @ {:.2}fps, {} frames), audio {}Hz {}ch",
            self.video_name,
            self.frame_width,
            self.frame_height,
            self.frame_rate,
            self.frame_count,
            self.sample_rate,
            self.channels
        );
    }

    fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            video_name: self.video_name.clone(),
            frame_rate: self.frame_rate,
            frame_count: self.frame_count,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// A running capture session
pub struct CaptureSession {
    info: SessionInfo,
    timeline: Arc<TimelineStore>,
    commands: CommandSender,
    status: Arc<CaptureStatus>,
    stop: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
    capture_done: Receiver<()>,
    audio: Box<dyn AudioInput>,
    options: SessionOptions,
}

impl CaptureSession {
    /// Validate and open a video file, then start capturing it.
    /// Nothing is created when the file cannot be opened.
    pub fn open(
        path: &Path,
        surface: Box<dyn PreviewSurface>,
        audio: Box<dyn AudioInput>,
        options: SessionOptions,
    ) -> Result<Self> {
        if !path.is_file() {
            return Err(VideoError::NotFound(path.display().to_string()).into());
        }
        let decoder = GstDecoder::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::start(name, Box::new(decoder), surface, audio, options)
    }

    /// Start a session over an already opened decoder
    pub fn start(
        video_name: String,
        decoder: Box<dyn Decoder>,
        surface: Box<dyn PreviewSurface>,
        mut audio: Box<dyn AudioInput>,
        options: SessionOptions,
    ) -> Result<Self> {
        let (frame_width, frame_height) = decoder.frame_size();
        let frame_rate = decoder.fps();
        let frame_count = decoder.frame_count();

        let epoch = Epoch::now();
        let timeline = Arc::new(TimelineStore::new(frame_count));
        let (commands, receiver) = command_channel();
        let capture = CaptureLoop::new(
            decoder,
            surface,
            receiver,
            timeline.clone(),
            epoch,
            options.capture.clone(),
        );
        let status = capture.status();

        let AudioFormat {
            sample_rate,
            channels,
        } = audio.start(AudioCaptureSink::new(timeline.clone(), epoch))?;

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, capture_done) = bounded(1);
        let spawned = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("annocap-capture".into())
                .spawn(move || {
                    capture.run(stop);
                    let _ = done_tx.send(());
                })
        };
        let capture_thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                audio.stop();
                return Err(SessionError::Spawn(e));
            }
        };

        let info = SessionInfo {
            video_name,
            frame_rate,
            frame_count,
            frame_width,
            frame_height,
            sample_rate,
            channels,
        };
        info.log();

        Ok(Self {
            info,
            timeline,
            commands,
            status,
            stop,
            capture_thread: Some(capture_thread),
            capture_done,
            audio,
            options,
        })
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    /// Handle for other control threads
    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn pause(&self) -> bool {
        self.commands.pause()
    }

    pub fn seek(&self, frame_index: u64) -> bool {
        self.commands.seek(frame_index)
    }

    pub fn restart(&self) -> bool {
        self.commands.restart()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Stop capturing and join the capture thread. Fails without handing
    /// over the timeline if the thread does not exit in time.
    pub fn finish(mut self) -> Result<ClosedSession> {
        self.shutdown()?;
        Ok(ClosedSession {
            info: self.info.clone(),
            timeline: self.timeline.finish(),
            gap_threshold_secs: self.options.gap_threshold_secs,
        })
    }

    /// Stop the session; when `save` is given, persist it after a clean join
    pub fn close(self, save: Option<(&OutputPaths, &mut SaveTargets)>) -> Result<Option<SaveReport>> {
        let closed = self.finish()?;
        Ok(save.map(|(paths, targets)| closed.persist(paths, targets)))
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.capture_thread.take() else {
            return Ok(());
        };

        // The capture loop drops the decoder as soon as it sees the flag
        self.stop.store(true, Ordering::Release);
        self.audio.stop();

        match self.capture_done.recv_timeout(self.options.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    log::error!("Capture thread panicked");
                    return Err(SessionError::CapturePanicked);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::error!(
                    "Capture thread did not stop within {:?}, not saving",
                    self.options.join_timeout
                );
                return Err(SessionError::JoinTimeout(self.options.join_timeout));
            }
        }

        log::info!(
            "Session closed: {} frames captured",
            self.timeline.frame_count()
        );
        Ok(())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.capture_thread.is_some() {
            self.stop.store(true, Ordering::Release);
            self.audio.stop();
        }
    }
}

/// A session whose writers have all stopped
pub struct ClosedSession {
    info: SessionInfo,
    timeline: FinishedTimeline,
    gap_threshold_secs: f64,
}

impl ClosedSession {
    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn timeline(&self) -> &FinishedTimeline {
        &self.timeline
    }

    /// Save video, audio, muxed output and the annotation timeline
    pub fn persist(self, paths: &OutputPaths, targets: &mut SaveTargets) -> SaveReport {
        let metadata = self.info.metadata();
        persist(self.timeline, metadata, paths, targets, self.gap_threshold_secs)
    }
}
