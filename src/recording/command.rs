// Capture commands
//
// Control threads enqueue pause/seek/restart; the capture loop drains at most
// one per tick. Every command carries the generation it was sent in, and
// sending a restart opens a new generation, so anything queued before the
// restart is dropped by the receiver instead of being replayed afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureCommand {
    /// Toggle between paused and playing
    TogglePause,
    /// Move the decoder so the next frame read is this index
    Seek(u64),
    /// Clear everything captured and rewind to the first frame
    Restart,
}

#[derive(Debug)]
struct Stamped {
    generation: u64,
    command: CaptureCommand,
}

/// Create a connected sender/receiver pair
pub fn command_channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = unbounded();
    let generation = Arc::new(AtomicU64::new(0));
    (
        CommandSender {
            tx,
            generation: generation.clone(),
        },
        CommandReceiver { rx, generation },
    )
}

/// Control-side handle; cheap to clone
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<Stamped>,
    generation: Arc<AtomicU64>,
}

impl CommandSender {
    pub fn pause(&self) -> bool {
        self.send(CaptureCommand::TogglePause)
    }

    pub fn seek(&self, frame_index: u64) -> bool {
        self.send(CaptureCommand::Seek(frame_index))
    }

    pub fn restart(&self) -> bool {
        self.send(CaptureCommand::Restart)
    }

    /// Enqueue a command. Returns false when the capture loop is gone.
    pub fn send(&self, command: CaptureCommand) -> bool {
        let generation = if command == CaptureCommand::Restart {
            self.generation.fetch_add(1, Ordering::AcqRel) + 1
        } else {
            self.generation.load(Ordering::Acquire)
        };

        let sent = self.tx.send(Stamped { generation, command }).is_ok();
        if !sent {
            log::warn!("Capture command {:?} dropped: capture loop has exited", command);
        }
        sent
    }
}

/// Capture-side handle; single consumer
#[derive(Debug)]
pub struct CommandReceiver {
    rx: Receiver<Stamped>,
    generation: Arc<AtomicU64>,
}

impl CommandReceiver {
    /// Next command still valid in the current generation, if any. Never blocks.
    pub fn try_next(&self) -> Option<CaptureCommand> {
        loop {
            match self.rx.try_recv() {
                Ok(stamped) => {
                    if stamped.generation < self.generation.load(Ordering::Acquire) {
                        log::debug!("Discarding stale command {:?}", stamped.command);
                        continue;
                    }
                    return Some(stamped.command);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return None,
            }
        }
    }
}
