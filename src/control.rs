// Line-oriented session control
//
// Verbs read from a terminal or a pipe and forwarded to a running capture
// session. Pointer verbs go to the preview surface, the rest to the command
// channel.

use std::fmt;
use std::str::FromStr;

use crate::recording::{CaptureSession, PointerEvent, PointerFeed, SessionStatus};
use crate::timeline::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlVerb {
    Pause,
    Seek(u64),
    Restart,
    Pointer(PointerEvent),
    Status,
    /// Close and save
    Save,
    /// Close without saving
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl FromStr for ControlVerb {
    type Err = ControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ControlError::Unknown(String::new()));
        };
        let args: Vec<&str> = words.collect();

        match verb.to_ascii_lowercase().as_str() {
            "pause" | "p" => Ok(ControlVerb::Pause),
            "restart" | "r" => Ok(ControlVerb::Restart),
            "status" => Ok(ControlVerb::Status),
            "save" => Ok(ControlVerb::Save),
            "quit" | "q" => Ok(ControlVerb::Quit),
            "seek" => match args.as_slice() {
                [n] => n
                    .parse()
                    .map(ControlVerb::Seek)
                    .map_err(|_| ControlError::Usage("seek <frame>")),
                _ => Err(ControlError::Usage("seek <frame>")),
            },
            "down" => parse_point(&args, "down <x> <y>").map(|p| ControlVerb::Pointer(PointerEvent::Down(p))),
            "move" => parse_point(&args, "move <x> <y>").map(|p| ControlVerb::Pointer(PointerEvent::Move(p))),
            "up" => parse_point(&args, "up <x> <y>").map(|p| ControlVerb::Pointer(PointerEvent::Up(p))),
            other => Err(ControlError::Unknown(other.to_string())),
        }
    }
}

fn parse_point(args: &[&str], usage: &'static str) -> Result<Point, ControlError> {
    match args {
        [x, y] => match (x.parse(), y.parse()) {
            (Ok(x), Ok(y)) => Ok(Point::new(x, y)),
            _ => Err(ControlError::Usage(usage)),
        },
        _ => Err(ControlError::Usage(usage)),
    }
}

/// What the caller should do after a verb was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Continue,
    Close { save: bool },
}

/// Forward one verb to `session`
pub fn apply(verb: ControlVerb, session: &CaptureSession, pointer: &PointerFeed) -> ControlFlow {
    let delivered = match verb {
        ControlVerb::Pause => session.pause(),
        ControlVerb::Seek(n) => session.seek(n),
        ControlVerb::Restart => session.restart(),
        ControlVerb::Pointer(event) => pointer.send(event),
        ControlVerb::Status => {
            log::info!("{}", StatusLine(session));
            true
        }
        ControlVerb::Save => return ControlFlow::Close { save: true },
        ControlVerb::Quit => return ControlFlow::Close { save: false },
    };
    if !delivered {
        log::warn!("Capture loop is gone, {:?} was not delivered", verb);
    }
    ControlFlow::Continue
}

struct StatusLine<'a>(&'a CaptureSession);

impl fmt::Display for StatusLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.0.status();
        let state = match SessionStatus::from(snapshot) {
            SessionStatus::Capturing => "capturing",
            SessionStatus::Paused => "paused",
            SessionStatus::Holding => "holding last frame",
        };
        write!(
            f,
            "{}: frame {}/{} ({} captured)",
            state, snapshot.position, snapshot.max_frames, snapshot.frames_captured
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_control_verbs() {
        assert_eq!("pause".parse(), Ok(ControlVerb::Pause));
        assert_eq!("  SEEK 42 ".parse(), Ok(ControlVerb::Seek(42)));
        assert_eq!("restart".parse(), Ok(ControlVerb::Restart));
        assert_eq!("q".parse(), Ok(ControlVerb::Quit));
        assert_eq!(
            "down 10 -3".parse(),
            Ok(ControlVerb::Pointer(PointerEvent::Down(Point::new(10, -3))))
        );
        assert_eq!(
            "up 1 2".parse(),
            Ok(ControlVerb::Pointer(PointerEvent::Up(Point::new(1, 2))))
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(
            "seek".parse::<ControlVerb>(),
            Err(ControlError::Usage("seek <frame>"))
        );
        assert_eq!(
            "move 1".parse::<ControlVerb>(),
            Err(ControlError::Usage("move <x> <y>"))
        );
        assert_eq!(
            "zoom".parse::<ControlVerb>(),
            Err(ControlError::Unknown("zoom".into()))
        );
    }
}
