// Capture loop
//
// Owns the decoder on a dedicated thread. Each tick it applies at most one
// queued command, reads (or holds) a frame, draws the live stroke overlay and
// the elapsed-time label, shows the result, records the frame and its
// annotation entry, then collects pointer input against the frame just
// recorded. Ticks are paced to the source frame rate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::command::{CaptureCommand, CommandReceiver};
use super::stroke::{StrokePolicy, StrokeTracker, DEFAULT_STALE_STROKE_WINDOW};
use super::surface::PreviewSurface;
use crate::timeline::{AnnotationPatch, Epoch, FrameEntry, TimelineStore};
use crate::video::overlay::{draw_label, format_elapsed, StrokeStyle};
use crate::video::{Decoder, Raster};

/// Frame rate used for pacing when the source reports none
const FALLBACK_FPS: f64 = 30.0;

/// Rendering options of a capture session
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub policy: StrokePolicy,
    pub stroke_style: StrokeStyle,
    pub stale_stroke_window: u64,
    pub label_color: [u8; 3],
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            policy: StrokePolicy::Short,
            stroke_style: StrokeStyle::default(),
            stale_stroke_window: DEFAULT_STALE_STROKE_WINDOW,
            label_color: [255, 255, 255],
        }
    }
}

/// Lock-free mirror of the capture loop's state for control threads
#[derive(Debug, Default)]
pub struct CaptureStatus {
    paused: AtomicBool,
    at_end: AtomicBool,
    position: AtomicU64,
    frames_captured: AtomicU64,
    max_frames: AtomicU64,
}

/// A point-in-time copy of [`CaptureStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub paused: bool,
    /// True while holding the last frame after end of stream
    pub at_end: bool,
    /// Decoder position of the frame on screen
    pub position: u64,
    pub frames_captured: u64,
    pub max_frames: u64,
}

impl CaptureStatus {
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            paused: self.paused.load(Ordering::Acquire),
            at_end: self.at_end.load(Ordering::Acquire),
            position: self.position.load(Ordering::Acquire),
            frames_captured: self.frames_captured.load(Ordering::Acquire),
            max_frames: self.max_frames.load(Ordering::Acquire),
        }
    }
}

/// The last frame read successfully, held while paused or after end of stream
#[derive(Debug, Clone)]
struct FreezeFrame {
    raster: Raster,
    pts_ms: f64,
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was recorded at this logical index
    Captured(u64),
    /// Nothing to show yet (no frame has ever been decoded)
    Idle,
}

pub struct CaptureLoop {
    decoder: Box<dyn Decoder>,
    surface: Box<dyn PreviewSurface>,
    commands: CommandReceiver,
    timeline: Arc<TimelineStore>,
    status: Arc<CaptureStatus>,
    epoch: Epoch,
    tracker: StrokeTracker,
    label_color: [u8; 3],
    paused: bool,
    held: Option<FreezeFrame>,
    at_end: bool,
    /// Decoder position after the last successful read or seek
    source_position: u64,
    /// Ticks recorded since the session (re)started
    progress: u64,
    frame_budget: Duration,
}

impl CaptureLoop {
    pub fn new(
        decoder: Box<dyn Decoder>,
        surface: Box<dyn PreviewSurface>,
        commands: CommandReceiver,
        timeline: Arc<TimelineStore>,
        epoch: Epoch,
        settings: CaptureSettings,
    ) -> Self {
        let fps = decoder.fps();
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };
        let frame_budget = Duration::from_millis((1000.0 / fps) as u64);

        let status = Arc::new(CaptureStatus::default());
        status.max_frames.store(timeline.max_frames(), Ordering::Release);

        Self {
            decoder,
            surface,
            commands,
            timeline,
            status,
            epoch,
            tracker: StrokeTracker::new(
                settings.policy,
                settings.stroke_style,
                settings.stale_stroke_window,
            ),
            label_color: settings.label_color,
            paused: false,
            held: None,
            at_end: false,
            source_position: 0,
            progress: 0,
            frame_budget,
        }
    }

    pub fn status(&self) -> Arc<CaptureStatus> {
        self.status.clone()
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    /// Run one iteration without pacing
    pub fn tick(&mut self) -> TickOutcome {
        if let Some(command) = self.commands.try_next() {
            self.apply(command);
        }

        if !self.paused {
            self.advance();
        }

        let Some(held) = &self.held else {
            return TickOutcome::Idle;
        };
        let pixels = held.raster.clone();
        let time_label = format_elapsed(held.pts_ms);

        let mut composed = pixels.clone();
        if self.tracker.is_drawing() {
            self.tracker.overlay(&mut composed, &self.timeline);
        }
        draw_label(&mut composed, &time_label, self.label_color);
        self.surface.present(&composed);

        let capture_timestamp = self.epoch.elapsed_secs();
        let logical = self.timeline.append_frame(FrameEntry {
            capture_timestamp,
            frame_index: self.progress,
            pixels,
        });
        self.timeline.upsert_annotation(
            logical,
            AnnotationPatch {
                frame_index: self.progress,
                source_frame_index: self.source_position,
                time_label,
                capture_timestamp,
            },
        );

        for event in self.surface.poll_pointer_events() {
            self.tracker.handle(event, &self.timeline);
        }

        self.progress += 1;
        self.publish();
        TickOutcome::Captured(logical)
    }

    /// Tick until `stop` is raised, sleeping off each tick's unused budget.
    /// The decoder is released when the loop returns.
    pub fn run(mut self, stop: Arc<AtomicBool>) {
        log::info!(
            "Capture loop started ({} ms per frame)",
            self.frame_budget.as_millis()
        );

        while !stop.load(Ordering::Acquire) {
            let started = Instant::now();
            self.tick();
            if let Some(slack) = self.frame_budget.checked_sub(started.elapsed()) {
                std::thread::sleep(slack);
            }
        }

        log::info!(
            "Capture loop stopped after {} frames",
            self.timeline.frame_count()
        );
    }

    fn advance(&mut self) {
        match self.decoder.read_next_frame() {
            Ok(Some(frame)) => {
                self.source_position = self.decoder.position();
                self.held = Some(FreezeFrame {
                    raster: frame.raster,
                    pts_ms: frame.pts_ms,
                });
                self.at_end = false;
            }
            Ok(None) => {
                if !self.at_end {
                    log::info!(
                        "End of stream at frame {}, holding last frame",
                        self.source_position
                    );
                    self.at_end = true;
                }
            }
            Err(e) => {
                if !self.at_end {
                    log::warn!("Failed to read frame {}: {}", self.source_position, e);
                    self.at_end = true;
                }
            }
        }
    }

    fn apply(&mut self, command: CaptureCommand) {
        match command {
            CaptureCommand::TogglePause => {
                self.paused = !self.paused;
                log::debug!("Capture {}", if self.paused { "paused" } else { "resumed" });
            }
            CaptureCommand::Seek(frame_index) => match self.decoder.seek(frame_index) {
                Ok(()) => {
                    self.source_position = frame_index;
                    self.at_end = false;
                    log::debug!("Seeked to frame {}", frame_index);
                }
                Err(e) => log::warn!("Seek to frame {} failed: {}", frame_index, e),
            },
            CaptureCommand::Restart => self.restart(),
        }
    }

    fn restart(&mut self) {
        self.paused = false;
        self.tracker.reset();
        if let Err(e) = self.decoder.seek(0) {
            log::warn!("Failed to rewind decoder on restart: {}", e);
        }
        self.timeline.clear();
        self.timeline.set_max_frames(self.decoder.frame_count());
        self.source_position = 0;
        self.progress = 0;
        self.at_end = false;
        self.publish();
        log::info!("Capture restarted");
    }

    fn publish(&self) {
        self.status.paused.store(self.paused, Ordering::Release);
        self.status.at_end.store(self.at_end, Ordering::Release);
        self.status
            .position
            .store(self.source_position, Ordering::Release);
        self.status
            .frames_captured
            .store(self.timeline.frame_count() as u64, Ordering::Release);
        self.status
            .max_frames
            .store(self.timeline.max_frames(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::command::{command_channel, CommandSender};
    use crate::recording::stroke::PointerEvent;
    use crate::recording::surface::{ChannelSurface, NullSurface, PointerFeed};
    use crate::timeline::{Point, StrokeMark, StrokeState};
    use crate::video::MemoryDecoder;

    fn capture(frames: usize) -> (CaptureLoop, CommandSender, Arc<TimelineStore>) {
        let decoder = MemoryDecoder::numbered(frames, 64, 48, 50.0);
        let timeline = Arc::new(TimelineStore::new(decoder.frame_count()));
        let (tx, rx) = command_channel();
        let capture = CaptureLoop::new(
            Box::new(decoder),
            Box::new(NullSurface),
            rx,
            timeline.clone(),
            Epoch::now(),
            CaptureSettings::default(),
        );
        (capture, tx, timeline)
    }

    fn capture_with_pointer(frames: usize) -> (CaptureLoop, PointerFeed, Arc<TimelineStore>) {
        let decoder = MemoryDecoder::numbered(frames, 64, 48, 50.0);
        let timeline = Arc::new(TimelineStore::new(decoder.frame_count()));
        let (_tx, rx) = command_channel();
        let (surface, feed) = ChannelSurface::new();
        let capture = CaptureLoop::new(
            Box::new(decoder),
            Box::new(surface),
            rx,
            timeline.clone(),
            Epoch::now(),
            CaptureSettings::default(),
        );
        (capture, feed, timeline)
    }

    fn red_of(timeline: &TimelineStore) -> Vec<u8> {
        timeline
            .finish()
            .frames
            .iter()
            .map(|f| f.pixels.as_bytes()[0])
            .collect()
    }

    #[test]
    fn frame_budget_follows_the_source_rate() {
        let (capture, _, _) = capture(1);
        assert_eq!(capture.frame_budget(), Duration::from_millis(20));
    }

    #[test]
    fn each_tick_records_one_frame_and_entry() {
        let (mut capture, _, timeline) = capture(3);
        for expected in 0..3 {
            assert_eq!(capture.tick(), TickOutcome::Captured(expected));
        }

        let entry = timeline.annotation(2).unwrap();
        assert_eq!(entry.frame_index, 2);
        assert_eq!(entry.source_frame_index, 3);
        assert_eq!(entry.time_label, "0:00:00");
        assert_eq!(timeline.annotation_count(), 3);
    }

    #[test]
    fn end_of_stream_holds_the_last_frame_and_timestamp() {
        let (mut capture, _, timeline) = capture(2);
        for _ in 0..5 {
            capture.tick();
        }

        assert!(capture.status().snapshot().at_end);
        let held = timeline.annotation(4).unwrap();
        assert_eq!(held.source_frame_index, 2);
        assert_eq!(red_of(&timeline), vec![0, 1, 1, 1, 1]);
    }

    #[test]
    fn pause_repeats_the_held_frame() {
        let (mut capture, tx, timeline) = capture(10);
        capture.tick();
        capture.tick();
        tx.pause();
        capture.tick();
        capture.tick();
        tx.pause();
        capture.tick();

        assert_eq!(red_of(&timeline), vec![0, 1, 1, 1, 2]);
    }

    #[test]
    fn seek_moves_the_source_without_touching_history() {
        let (mut capture, tx, timeline) = capture(10);
        capture.tick();
        tx.seek(7);
        capture.tick();

        assert_eq!(timeline.annotation(1).unwrap().source_frame_index, 8);
        assert_eq!(red_of(&timeline), vec![0, 7]);
    }

    #[test]
    fn restart_clears_the_session_and_discards_stale_commands() {
        let (mut capture, tx, timeline) = capture(10);
        for _ in 0..4 {
            capture.tick();
        }
        tx.pause();
        tx.restart();
        capture.tick();

        let status = capture.status().snapshot();
        assert!(!status.paused);
        assert_eq!(status.frames_captured, 1);
        let entry = timeline.annotation(0).unwrap();
        assert_eq!(entry.frame_index, 0);
        assert_eq!(entry.source_frame_index, 1);
        assert_eq!(red_of(&timeline), vec![0]);
    }

    #[test]
    fn commands_sent_after_a_restart_still_apply() {
        let (mut capture, tx, timeline) = capture(10);
        for _ in 0..3 {
            capture.tick();
        }
        tx.restart();
        tx.seek(6);
        capture.tick();
        capture.tick();

        assert_eq!(red_of(&timeline), vec![0, 6]);
    }

    #[test]
    fn restart_reseeds_the_high_water_mark() {
        let (mut capture, tx, timeline) = capture(3);
        for _ in 0..6 {
            capture.tick();
        }
        assert!(timeline.max_frames() > 3);

        tx.restart();
        capture.tick();
        // the frame recorded after the restart is index 0, below the mark
        assert_eq!(timeline.max_frames(), 3);
    }

    #[test]
    fn pointer_input_lands_on_the_frame_just_recorded() {
        let (mut capture, feed, timeline) = capture_with_pointer(10);
        capture.tick();
        feed.send(PointerEvent::Down(Point::new(5, 5)));
        capture.tick();
        feed.send(PointerEvent::Move(Point::new(9, 5)));
        capture.tick();

        assert_eq!(timeline.annotation(0).unwrap().stroke, None);
        assert_eq!(
            timeline.annotation(1).unwrap().stroke,
            Some(StrokeMark::new(StrokeState::Start, Point::new(5, 5)))
        );
        assert_eq!(
            timeline.annotation(2).unwrap().stroke,
            Some(StrokeMark::new(StrokeState::Move, Point::new(9, 5)))
        );
    }

    #[test]
    fn recorded_pixels_exclude_the_overlay() {
        let (mut capture, feed, timeline) = capture_with_pointer(10);
        capture.tick();
        feed.send(PointerEvent::Down(Point::new(0, 10)));
        capture.tick();
        feed.send(PointerEvent::Move(Point::new(30, 10)));
        capture.tick();
        capture.tick();

        let finished = timeline.finish();
        assert!(finished
            .frames
            .iter()
            .all(|f| f.pixels.pixel(15, 10) == Some([f.frame_index as u8, 0, 0])));
    }

    #[test]
    fn run_returns_once_stopped() {
        let (capture, _, timeline) = capture(1000);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            std::thread::spawn(move || capture.run(stop))
        };
        std::thread::sleep(Duration::from_millis(100));
        stop.store(true, Ordering::Release);
        handle.join().unwrap();

        assert!(timeline.frame_count() > 0);
    }
}
