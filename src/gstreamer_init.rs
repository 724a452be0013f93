//! GStreamer initialization
//!
//! Initializes GStreamer once per process and checks that the elements the
//! decode, encode and mux pipelines are built from can be created.

use std::sync::Once;

static GSTREAMER_INIT: Once = Once::new();

/// Elements the capture and save pipelines depend on
pub const REQUIRED_ELEMENTS: &[&str] = &[
    "filesrc",
    "decodebin",
    "videoconvert",
    "appsink",
    "appsrc",
    "queue",
    "x264enc",
    "h264parse",
    "matroskamux",
    "matroskademux",
    "audioconvert",
    "wavenc",
    "wavparse",
    "filesink",
];

/// Initialize GStreamer. Safe to call from several places; only the first
/// call does any work. Failures are logged, and the pipelines report them
/// again when they try to build elements.
pub fn init_gstreamer() {
    GSTREAMER_INIT.call_once(|| match gstreamer::init() {
        Ok(_) => {
            log::info!("GStreamer initialized successfully");
            log_gstreamer_version();
            let missing = missing_elements();
            if !missing.is_empty() {
                log::warn!("Missing GStreamer elements: {}", missing.join(", "));
            }
        }
        Err(e) => {
            log::error!("Failed to initialize GStreamer: {}", e);
            log::error!("Video decoding and saving will not be available");
        }
    });
}

fn log_gstreamer_version() {
    let (major, minor, micro, nano) = gstreamer::version();
    let nano_str = match nano {
        0 => String::new(),
        1 => " (CVS)".to_string(),
        2 => " (prerelease)".to_string(),
        _ => format!(" (nano: {})", nano),
    };
    log::info!("GStreamer version: {}.{}.{}{}", major, minor, micro, nano_str);
}

/// Names from [`REQUIRED_ELEMENTS`] with no installed factory
pub fn missing_elements() -> Vec<&'static str> {
    if gstreamer::init().is_err() {
        return REQUIRED_ELEMENTS.to_vec();
    }
    REQUIRED_ELEMENTS
        .iter()
        .copied()
        .filter(|name| gstreamer::ElementFactory::find(name).is_none())
        .collect()
}
