// Shared fakes for integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use annocap_lib::encoding::{AudioFileWriter, EncodeError, Muxer, VideoEncoder, VideoSpec};
use annocap_lib::recording::{AudioCaptureSink, AudioFormat, AudioInput, CaptureSession, StatusSnapshot};
use annocap_lib::recording::audio::Result as AudioResult;
use annocap_lib::session::SaveTargets;
use annocap_lib::video::Raster;

pub type Log = Arc<Mutex<Vec<String>>>;

/// Audio input that delivers a fixed set of chunks as soon as it starts
pub struct ScriptedAudio {
    pub format: AudioFormat,
    pub chunks: Vec<Vec<f32>>,
    pub stopped: Arc<AtomicBool>,
}

impl ScriptedAudio {
    pub fn new(chunks: Vec<Vec<f32>>) -> Self {
        Self {
            format: AudioFormat {
                sample_rate: 8000,
                channels: 2,
            },
            chunks,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl AudioInput for ScriptedAudio {
    fn start(&mut self, sink: AudioCaptureSink) -> AudioResult<AudioFormat> {
        for chunk in &self.chunks {
            sink.on_samples(chunk);
        }
        Ok(self.format)
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Encoder that keeps the frames it was given and writes a placeholder file
pub struct RecordingEncoder {
    pub log: Log,
    pub frames: Arc<Mutex<Vec<Raster>>>,
    pub spec: Arc<Mutex<Option<VideoSpec>>>,
    pub fail: bool,
}

impl VideoEncoder for RecordingEncoder {
    fn encode(&mut self, path: &Path, spec: VideoSpec, frames: &[&Raster]) -> Result<(), EncodeError> {
        self.log.lock().push("video".into());
        if self.fail {
            return Err(EncodeError::Pipeline("encoder unavailable".into()));
        }
        if frames.is_empty() {
            return Err(EncodeError::Empty);
        }
        *self.spec.lock() = Some(spec);
        self.frames.lock().extend(frames.iter().map(|f| (*f).clone()));
        std::fs::write(path, b"video")?;
        Ok(())
    }
}

pub struct RecordingWriter {
    pub log: Log,
    pub samples: Arc<Mutex<Vec<f32>>>,
}

impl AudioFileWriter for RecordingWriter {
    fn write(&mut self, path: &Path, _sample_rate: u32, _channels: u16, samples: &[f32]) -> Result<(), EncodeError> {
        self.log.lock().push("audio".into());
        if samples.is_empty() {
            return Err(EncodeError::Empty);
        }
        self.samples.lock().extend_from_slice(samples);
        std::fs::write(path, b"audio")?;
        Ok(())
    }
}

pub struct RecordingMuxer {
    pub log: Log,
    pub fail: bool,
}

impl Muxer for RecordingMuxer {
    fn mux(&mut self, video: &Path, audio: &Path, output: &Path) -> Result<(), EncodeError> {
        self.log.lock().push("mux".into());
        assert!(video.exists(), "video intermediate missing at mux time");
        assert!(audio.exists(), "audio intermediate missing at mux time");
        if self.fail {
            return Err(EncodeError::Pipeline("mux failed".into()));
        }
        std::fs::write(output, b"muxed")?;
        Ok(())
    }
}

/// Save targets plus handles on what they received
pub struct Recorded {
    pub log: Log,
    pub frames: Arc<Mutex<Vec<Raster>>>,
    pub spec: Arc<Mutex<Option<VideoSpec>>>,
    pub samples: Arc<Mutex<Vec<f32>>>,
}

pub fn recording_targets(fail_encoder: bool, fail_mux: bool) -> (SaveTargets, Recorded) {
    let recorded = Recorded {
        log: Log::default(),
        frames: Arc::default(),
        spec: Arc::default(),
        samples: Arc::default(),
    };
    let targets = SaveTargets {
        encoder: Box::new(RecordingEncoder {
            log: recorded.log.clone(),
            frames: recorded.frames.clone(),
            spec: recorded.spec.clone(),
            fail: fail_encoder,
        }),
        audio_writer: Box::new(RecordingWriter {
            log: recorded.log.clone(),
            samples: recorded.samples.clone(),
        }),
        muxer: Box::new(RecordingMuxer {
            log: recorded.log.clone(),
            fail: fail_mux,
        }),
    };
    (targets, recorded)
}

/// Poll the session's status until `done` holds
pub fn wait_for(session: &CaptureSession, done: impl Fn(&StatusSnapshot) -> bool) -> StatusSnapshot {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let status = session.status();
        if done(&status) {
            return status;
        }
        assert!(Instant::now() < deadline, "timed out waiting, last status {:?}", status);
        std::thread::sleep(Duration::from_millis(2));
    }
}
