// In-memory decoder
//
// Serves a fixed list of rasters at a nominal frame rate. Used for still-image
// sources and for driving capture sessions without a media backend.

use super::decoder::{DecodedFrame, Decoder};
use super::{Raster, Result};

/// Decoder over frames already held in memory
pub struct MemoryDecoder {
    frames: Vec<Raster>,
    fps: f64,
    cursor: u64,
    size: (u32, u32),
}

impl MemoryDecoder {
    pub fn new(frames: Vec<Raster>, fps: f64) -> Self {
        let size = frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));
        Self {
            frames,
            fps,
            cursor: 0,
            size,
        }
    }

    /// `count` solid frames whose red channel encodes the frame number
    pub fn numbered(count: usize, width: u32, height: u32, fps: f64) -> Self {
        let frames = (0..count)
            .map(|i| Raster::filled(width, height, [(i % 256) as u8, 0, 0]))
            .collect();
        Self::new(frames, fps)
    }
}

impl Decoder for MemoryDecoder {
    fn read_next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        let Some(raster) = self.frames.get(self.cursor as usize) else {
            return Ok(None);
        };
        let pts_ms = self.cursor as f64 * 1000.0 / self.fps;
        self.cursor += 1;
        Ok(Some(DecodedFrame {
            raster: raster.clone(),
            pts_ms,
        }))
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        self.cursor = frame_index;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }

    fn frame_count(&self) -> u64 {
        self.frames.len() as u64
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_size(&self) -> (u32, u32) {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_sequentially_then_reports_end_of_stream() {
        let mut decoder = MemoryDecoder::numbered(2, 4, 4, 25.0);
        let first = decoder.read_next_frame().unwrap().unwrap();
        let second = decoder.read_next_frame().unwrap().unwrap();

        assert_eq!(first.pts_ms, 0.0);
        assert_eq!(second.pts_ms, 40.0);
        assert_eq!(second.raster.pixel(0, 0), Some([1, 0, 0]));
        assert!(decoder.read_next_frame().unwrap().is_none());
        assert_eq!(decoder.position(), 2);
    }

    #[test]
    fn seek_repositions_the_cursor() {
        let mut decoder = MemoryDecoder::numbered(5, 2, 2, 10.0);
        decoder.seek(3).unwrap();
        let frame = decoder.read_next_frame().unwrap().unwrap();

        assert_eq!(frame.raster.pixel(0, 0), Some([3, 0, 0]));
        assert_eq!(decoder.position(), 4);
    }
}
