// Capture timeline
//
// The in-memory record of one capture session: frames, audio chunks and
// per-frame annotations, keyed by the logical frame index (the position of a
// frame in this session's append sequence, not the decoder's frame counter).
//
// Two writers touch the store concurrently and never the same stream:
// - the capture thread appends frames and upserts annotations (video track lock)
// - the audio callback appends chunks through a lock-free channel, so it never
//   waits on the capture thread
//
// Reconciliation only runs after both writers have stopped, so no lock spans
// the two streams.

pub mod entries;

pub use entries::{
    AnnotationEntry, AnnotationPatch, AudioChunk, Epoch, FrameEntry, Point, StrokeMark,
    StrokeState,
};

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Frames and annotations, written only by the capture thread
#[derive(Default)]
struct VideoTrack {
    frames: Vec<FrameEntry>,
    /// Indexed by logical frame index; never longer than `frames`
    annotations: Vec<AnnotationEntry>,
}

/// Audio chunks: the callback sends, readers collect
struct AudioTrack {
    sender: Sender<AudioChunk>,
    receiver: Receiver<AudioChunk>,
    collected: Mutex<Vec<AudioChunk>>,
}

impl AudioTrack {
    fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver,
            collected: Mutex::new(Vec::new()),
        }
    }

    /// Move everything sent so far into the collected list
    fn collect_pending(&self, collected: &mut Vec<AudioChunk>) {
        collected.extend(self.receiver.try_iter());
    }
}

/// A finalized timeline, detached from any writer
#[derive(Debug, Default)]
pub struct FinishedTimeline {
    pub frames: Vec<FrameEntry>,
    pub annotations: Vec<AnnotationEntry>,
    pub audio: Vec<AudioChunk>,
    pub max_frames: u64,
}

/// Authoritative record of a capture session
pub struct TimelineStore {
    video: Mutex<VideoTrack>,
    audio: AudioTrack,
    /// High-water mark of frames seen; only ever increases within a session
    max_frames: AtomicU64,
}

impl TimelineStore {
    /// Create an empty store seeded with the source's reported frame count
    pub fn new(max_frames: u64) -> Self {
        Self {
            video: Mutex::new(VideoTrack::default()),
            audio: AudioTrack::new(),
            max_frames: AtomicU64::new(max_frames),
        }
    }

    /// Append a frame and return its logical index.
    ///
    /// When the entry's frame index reaches the high-water mark the mark
    /// advances by one; an index beyond it is logged and otherwise ignored.
    /// Indices below the mark are not logged: the mark is seeded from the
    /// source's frame count, so every frame of a fresh session starts below it.
    pub fn append_frame(&self, frame: FrameEntry) -> u64 {
        let max = self.max_frames.load(Ordering::Acquire);
        if frame.frame_index == max {
            self.max_frames.store(max + 1, Ordering::Release);
        } else if frame.frame_index > max {
            log::warn!(
                "Frame index {} is out of range (max {})",
                frame.frame_index,
                max
            );
        }

        let mut video = self.video.lock();
        video.frames.push(frame);
        (video.frames.len() - 1) as u64
    }

    /// Append captured samples. Never blocks: the chunk is handed to an
    /// unbounded lock-free channel and collected later by readers.
    pub fn append_audio(&self, capture_timestamp: f64, samples: Vec<f32>) {
        let chunk = AudioChunk {
            capture_timestamp,
            samples,
        };
        if self.audio.sender.send(chunk).is_err() {
            log::warn!("Audio chunk at {:.3}s dropped: timeline closed", capture_timestamp);
        }
    }

    /// Create or update the annotation entry of a captured frame.
    ///
    /// Updating keeps the entry's stroke; creating starts with no stroke.
    /// Returns false (and logs) when no frame exists at `logical_index`.
    pub fn upsert_annotation(&self, logical_index: u64, patch: AnnotationPatch) -> bool {
        let mut video = self.video.lock();
        let index = logical_index as usize;

        if index >= video.frames.len() {
            log::warn!(
                "Annotation for frame {} ignored: only {} frames captured",
                logical_index,
                video.frames.len()
            );
            return false;
        }

        if let Some(entry) = video.annotations.get_mut(index) {
            entry.apply(patch);
            return true;
        }
        if index == video.annotations.len() {
            video.annotations.push(AnnotationEntry::from_patch(patch));
            return true;
        }

        log::warn!(
            "Annotation for frame {} ignored: entries end at {}",
            logical_index,
            video.annotations.len()
        );
        false
    }

    /// Record a stroke command against the most recent frame.
    ///
    /// If that frame already holds a `Start`, the state stays `Start` and only
    /// the point is replaced; otherwise command and point both replace the
    /// entry's stroke. Returns the logical index written, or None when there
    /// is no frame (or no entry) to annotate.
    pub fn mark_latest(&self, state: StrokeState, point: Point) -> Option<u64> {
        let mut video = self.video.lock();

        let Some(index) = video.frames.len().checked_sub(1) else {
            log::error!("No frames to annotate");
            return None;
        };
        let Some(entry) = video.annotations.get_mut(index) else {
            log::error!("No frame found for annotation at index {}", index);
            return None;
        };

        let state = match entry.stroke {
            Some(StrokeMark {
                state: StrokeState::Start,
                ..
            }) => StrokeState::Start,
            _ => state,
        };
        entry.stroke = Some(StrokeMark { state, point });

        log::debug!("Added annotation at frame {} with command {:?}", index, state);
        Some(index as u64)
    }

    /// Stroke of the most recent annotation entry, if any
    pub fn get_last_annotation(&self) -> Option<StrokeMark> {
        self.last_stroke().map(|(_, mark)| mark)
    }

    /// Most recent annotation entry's logical index and stroke
    pub fn last_stroke(&self) -> Option<(u64, StrokeMark)> {
        let video = self.video.lock();
        if video.frames.is_empty() {
            return None;
        }
        let index = video.annotations.len().checked_sub(1)?;
        let mark = video.annotations[index].stroke?;
        Some((index as u64, mark))
    }

    /// Copy of one annotation entry
    pub fn annotation(&self, logical_index: u64) -> Option<AnnotationEntry> {
        self.video.lock().annotations.get(logical_index as usize).cloned()
    }

    /// Drop every frame, annotation and audio chunk
    pub fn clear(&self) {
        {
            let mut video = self.video.lock();
            video.frames.clear();
            video.annotations.clear();
        }
        let mut collected = self.audio.collected.lock();
        collected.clear();
        for _ in self.audio.receiver.try_iter() {}
        log::debug!("Timeline cleared");
    }

    /// Reseed the high-water mark (used on restart)
    pub fn set_max_frames(&self, max_frames: u64) {
        self.max_frames.store(max_frames, Ordering::Release);
    }

    pub fn max_frames(&self) -> u64 {
        self.max_frames.load(Ordering::Acquire)
    }

    pub fn frame_count(&self) -> usize {
        self.video.lock().frames.len()
    }

    pub fn annotation_count(&self) -> usize {
        self.video.lock().annotations.len()
    }

    pub fn audio_chunk_count(&self) -> usize {
        let mut collected = self.audio.collected.lock();
        self.audio.collect_pending(&mut collected);
        collected.len()
    }

    /// Capture timestamps of every frame, in logical order
    pub fn frame_timestamps(&self) -> Vec<f64> {
        self.video
            .lock()
            .frames
            .iter()
            .map(|f| f.capture_timestamp)
            .collect()
    }

    /// Take everything out of the store. Call only after every writer has
    /// stopped; the store is left empty.
    pub fn finish(&self) -> FinishedTimeline {
        let (frames, annotations) = {
            let mut video = self.video.lock();
            (
                std::mem::take(&mut video.frames),
                std::mem::take(&mut video.annotations),
            )
        };
        let audio = {
            let mut collected = self.audio.collected.lock();
            self.audio.collect_pending(&mut collected);
            std::mem::take(&mut *collected)
        };

        FinishedTimeline {
            frames,
            annotations,
            audio,
            max_frames: self.max_frames(),
        }
    }
}
