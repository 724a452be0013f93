// Session persistence
//
// What happens to a capture session once it ends: gap reconciliation of the
// audio, the on-disk annotation timeline, and the staged save of video, audio,
// muxed output and JSON.

pub mod metadata;
pub mod reconcile;
pub mod storage;

pub use metadata::{AnnotationTimeline, SessionMetadata, TimelineKey};
pub use reconcile::{reconcile_audio, Gap, Reconciled, DEFAULT_GAP_THRESHOLD_SECS};
pub use storage::{persist, OutputPaths, SaveReport, SaveTargets, StageOutcome};

use std::path::PathBuf;
use std::time::Duration;

use crate::recording::audio::AudioError;
use crate::video::VideoError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Failed to spawn capture thread: {0}")]
    Spawn(std::io::Error),

    #[error("Capture thread did not stop within {0:?}")]
    JoinTimeout(Duration),

    #[error("Capture thread panicked")]
    CapturePanicked,

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid annotation timeline {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
