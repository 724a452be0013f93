// Preview surfaces
//
// The capture loop shows each composited frame on a surface and collects the
// pointer events that happened since the previous tick. Both calls run on the
// capture thread.

use crossbeam_channel::{unbounded, Receiver, Sender, TrySendError};

use super::stroke::PointerEvent;
use crate::video::Raster;

pub trait PreviewSurface: Send {
    /// Show a composited frame (overlay and label applied)
    fn present(&mut self, frame: &Raster);

    /// Pointer events received since the last call, oldest first
    fn poll_pointer_events(&mut self) -> Vec<PointerEvent>;
}

/// Headless surface: shows nothing, never receives input
#[derive(Debug, Default)]
pub struct NullSurface;

impl PreviewSurface for NullSurface {
    fn present(&mut self, _frame: &Raster) {}

    fn poll_pointer_events(&mut self) -> Vec<PointerEvent> {
        Vec::new()
    }
}

/// Surface fed from other threads: pointer events arrive over a channel and
/// presented frames can be tapped.
pub struct ChannelSurface {
    events: Receiver<PointerEvent>,
    frame_tap: Option<Sender<Raster>>,
}

/// Sending half for pointer input into a [`ChannelSurface`]
#[derive(Debug, Clone)]
pub struct PointerFeed {
    tx: Sender<PointerEvent>,
}

impl PointerFeed {
    pub fn send(&self, event: PointerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

impl ChannelSurface {
    pub fn new() -> (Self, PointerFeed) {
        let (tx, rx) = unbounded();
        (
            Self {
                events: rx,
                frame_tap: None,
            },
            PointerFeed { tx },
        )
    }

    /// Forward a copy of every presented frame to `tap`
    pub fn with_frame_tap(mut self, tap: Sender<Raster>) -> Self {
        self.frame_tap = Some(tap);
        self
    }
}

impl PreviewSurface for ChannelSurface {
    fn present(&mut self, frame: &Raster) {
        let Some(tap) = &self.frame_tap else {
            return;
        };
        match tap.try_send(frame.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => self.frame_tap = None,
        }
    }

    fn poll_pointer_events(&mut self) -> Vec<PointerEvent> {
        self.events.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::Point;

    #[test]
    fn channel_surface_delivers_events_in_order() {
        let (mut surface, feed) = ChannelSurface::new();
        feed.send(PointerEvent::Down(Point::new(1, 1)));
        feed.send(PointerEvent::Up(Point::new(2, 2)));

        assert_eq!(
            surface.poll_pointer_events(),
            vec![
                PointerEvent::Down(Point::new(1, 1)),
                PointerEvent::Up(Point::new(2, 2))
            ]
        );
        assert!(surface.poll_pointer_events().is_empty());
    }

    #[test]
    fn frame_tap_survives_a_dropped_receiver() {
        let (tap, frames) = crossbeam_channel::bounded(1);
        let (surface, _feed) = ChannelSurface::new();
        let mut surface = surface.with_frame_tap(tap);

        surface.present(&Raster::new(2, 2));
        surface.present(&Raster::new(2, 2));
        assert_eq!(frames.try_iter().count(), 1);

        drop(frames);
        surface.present(&Raster::new(2, 2));
        assert!(surface.frame_tap.is_none());
    }
}
