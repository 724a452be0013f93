// Recording modules

pub mod audio;
pub mod capture;
pub mod command;
pub mod session;
pub mod stroke;
pub mod surface;

pub use audio::{AudioCaptureSink, AudioError, AudioFormat, AudioInput, CpalAudioInput, SilentInput};
pub use capture::{CaptureLoop, CaptureSettings, CaptureStatus, StatusSnapshot, TickOutcome};
pub use command::{command_channel, CaptureCommand, CommandReceiver, CommandSender};
pub use session::{CaptureSession, ClosedSession, SessionInfo, SessionOptions};
pub use stroke::{PointerEvent, StrokePolicy, StrokeRenderer, StrokeTracker};
pub use surface::{ChannelSurface, NullSurface, PointerFeed, PreviewSurface};

use serde::{Deserialize, Serialize};

/// Coarse state of a capture session, derived from its status mirror
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Reading new frames
    Capturing,
    /// Repeating the held frame on request
    Paused,
    /// Repeating the last frame after end of stream
    Holding,
}

impl From<StatusSnapshot> for SessionStatus {
    fn from(snapshot: StatusSnapshot) -> Self {
        if snapshot.paused {
            SessionStatus::Paused
        } else if snapshot.at_end {
            SessionStatus::Holding
        } else {
            SessionStatus::Capturing
        }
    }
}
