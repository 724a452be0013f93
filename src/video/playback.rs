// Annotated playback
//
// Redraws a saved annotation timeline over the frames of the saved video.
// Strokes go through the same renderer the capture loop uses for its live
// overlay, so a replay looks like the session did. Nothing is written back.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::decoder::Decoder;
use super::overlay::{draw_label, StrokeStyle};
use super::{Raster, Result};
use crate::recording::stroke::{StrokePolicy, StrokeRenderer};
use crate::session::AnnotationTimeline;

pub struct PlaybackReconstructor {
    timeline: AnnotationTimeline,
    renderer: StrokeRenderer,
    label_color: [u8; 3],
}

impl PlaybackReconstructor {
    pub fn new(
        timeline: AnnotationTimeline,
        policy: StrokePolicy,
        style: StrokeStyle,
        label_color: [u8; 3],
    ) -> Self {
        Self {
            timeline,
            renderer: StrokeRenderer::new(policy, style),
            label_color,
        }
    }

    pub fn load(
        path: &Path,
        policy: StrokePolicy,
        style: StrokeStyle,
        label_color: [u8; 3],
    ) -> crate::session::Result<Self> {
        let timeline = AnnotationTimeline::load(path)?;
        log::info!(
            "Loaded annotation timeline {} ({} frames)",
            path.display(),
            timeline.frames.len()
        );
        Ok(Self::new(timeline, policy, style, label_color))
    }

    pub fn timeline(&self) -> &AnnotationTimeline {
        &self.timeline
    }

    /// Draw the stroke and label recorded for `frame_number`.
    /// Returns false when the timeline has no entry for it.
    pub fn render(&mut self, frame_number: u64, raster: &mut Raster) -> bool {
        let Some(entry) = self.timeline.frames.get(&frame_number) else {
            return false;
        };
        if let Some(mark) = entry.stroke {
            self.renderer.apply(raster, mark);
        }
        if !entry.time_label.is_empty() {
            draw_label(raster, &entry.time_label, self.label_color);
        }
        true
    }

    /// Decode `decoder` from its current position to the end, rendering each
    /// frame and handing it to `sink` with its 0-based frame number. Stops
    /// early when `stop` is raised or `sink` returns false. Returns the
    /// number of frames delivered.
    pub fn run<F>(&mut self, decoder: &mut dyn Decoder, stop: &AtomicBool, mut sink: F) -> Result<u64>
    where
        F: FnMut(u64, Raster) -> bool,
    {
        self.renderer.reset();
        let mut frame_number = 0u64;

        while !stop.load(Ordering::Acquire) {
            let Some(frame) = decoder.read_next_frame()? else {
                break;
            };
            let mut raster = frame.raster;
            self.render(frame_number, &mut raster);
            frame_number += 1;
            if !sink(frame_number - 1, raster) {
                break;
            }
        }

        log::info!("Playback finished after {} frames", frame_number);
        Ok(frame_number)
    }
}
