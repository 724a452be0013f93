// Annocap - frame-by-frame video annotation with voice commentary
// Main library entry point

pub mod config;
pub mod control;
pub mod encoding;
pub mod gstreamer_init;
pub mod recording;
pub mod session;
pub mod timeline;
pub mod video;
