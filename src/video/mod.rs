// Video frame handling module
//
// This module provides the raster type shared by capture, overlay and encode,
// the decoder interface the capture loop pulls frames from, and the playback
// path that redraws a saved annotation timeline over a decoded video.

pub mod decoder;
pub mod gst_decode;
pub mod memory;
pub mod overlay;
pub mod playback;

pub use decoder::{DecodedFrame, Decoder};
pub use gst_decode::GstDecoder;
pub use memory::MemoryDecoder;
pub use playback::PlaybackReconstructor;

/// Bytes per pixel of a packed RGB raster
pub const RGB_CHANNELS: usize = 3;

/// An owned, packed RGB24 image (no row padding)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    /// Create a black raster of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * RGB_CHANNELS],
        }
    }

    /// Create a raster filled with a single color
    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * RGB_CHANNELS);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&color);
        }
        Self { width, height, data }
    }

    /// Wrap packed RGB bytes, checking the length matches the dimensions
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * RGB_CHANNELS;
        if data.len() != expected {
            return Err(VideoError::InvalidRaster {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Read a pixel; None when outside the raster
    pub fn pixel(&self, x: i64, y: i64) -> Option<[u8; 3]> {
        let offset = self.offset(x, y)?;
        Some([self.data[offset], self.data[offset + 1], self.data[offset + 2]])
    }

    /// Write a pixel; coordinates outside the raster are clipped silently
    pub fn put_pixel(&mut self, x: i64, y: i64, color: [u8; 3]) {
        if let Some(offset) = self.offset(x, y) {
            self.data[offset..offset + RGB_CHANNELS].copy_from_slice(&color);
        }
    }

    fn offset(&self, x: i64, y: i64) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * RGB_CHANNELS)
    }
}

/// Error type for video operations
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Video file not found: {0}")]
    NotFound(String),

    #[error("No video track found")]
    NoVideoTrack,

    #[error("Raster {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidRaster {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("GStreamer error: {0}")]
    Gst(String),
}

pub type Result<T> = std::result::Result<T, VideoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_rejects_short_buffers() {
        let err = Raster::from_rgb(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, VideoError::InvalidRaster { expected: 48, actual: 10, .. }));
    }

    #[test]
    fn pixels_outside_the_raster_are_clipped() {
        let mut raster = Raster::new(2, 2);
        raster.put_pixel(-1, 0, [255, 0, 0]);
        raster.put_pixel(5, 5, [255, 0, 0]);
        raster.put_pixel(1, 1, [1, 2, 3]);

        assert_eq!(raster.pixel(-1, 0), None);
        assert_eq!(raster.pixel(1, 1), Some([1, 2, 3]));
        assert_eq!(raster.as_bytes().iter().filter(|b| **b != 0).count(), 3);
    }
}
