// Configuration management for annocap

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::encoding::encoder::EncoderConfig;
use crate::recording::stroke::{StrokePolicy, DEFAULT_STALE_STROKE_WINDOW};
use crate::recording::{CaptureSettings, SessionOptions};
use crate::session::DEFAULT_GAP_THRESHOLD_SECS;
use crate::video::overlay::StrokeStyle;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory videos are picked from; subdirectories below it are
    /// mirrored under `output_dir`
    #[serde(default)]
    pub input_dir: Option<PathBuf>,

    /// Where annotated videos and timelines are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Redraw the whole stroke each tick instead of the latest segment
    #[serde(default)]
    pub long_annotations: bool,

    /// Frames during which the last stroke is still redrawn live
    #[serde(default = "default_stale_stroke_window")]
    pub stale_stroke_window: u64,

    /// Frame-to-frame step (seconds) treated as a capture stall
    #[serde(default = "default_gap_threshold_secs")]
    pub gap_threshold_secs: f64,

    /// Requested microphone sample rate
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Requested microphone channel count
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Input device name; None selects the system default
    #[serde(default)]
    pub audio_device: Option<String>,

    #[serde(default = "default_stroke_color")]
    pub stroke_color: [u8; 3],

    #[serde(default = "default_stroke_thickness")]
    pub stroke_thickness: u32,

    #[serde(default = "default_label_color")]
    pub label_color: [u8; 3],

    /// How long closing waits for the capture thread
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// Target video bitrate in kbit/s (0 = encoder default)
    #[serde(default)]
    pub video_bitrate_kbps: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: default_output_dir(),
            long_annotations: false,
            stale_stroke_window: default_stale_stroke_window(),
            gap_threshold_secs: default_gap_threshold_secs(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            audio_device: None,
            stroke_color: default_stroke_color(),
            stroke_thickness: default_stroke_thickness(),
            label_color: default_label_color(),
            join_timeout_ms: default_join_timeout_ms(),
            video_bitrate_kbps: 0,
        }
    }
}

impl Config {
    /// Load config from disk or return default
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        log::warn!("Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Save config to disk
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    pub fn stroke_policy(&self) -> StrokePolicy {
        StrokePolicy::from_long(self.long_annotations)
    }

    pub fn stroke_style(&self) -> StrokeStyle {
        StrokeStyle {
            color: self.stroke_color,
            thickness: self.stroke_thickness,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            capture: CaptureSettings {
                policy: self.stroke_policy(),
                stroke_style: self.stroke_style(),
                stale_stroke_window: self.stale_stroke_window,
                label_color: self.label_color,
            },
            join_timeout: Duration::from_millis(self.join_timeout_ms),
            gap_threshold_secs: self.gap_threshold_secs,
        }
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            bitrate_kbps: self.video_bitrate_kbps,
            ..EncoderConfig::default()
        }
    }
}

/// Get the config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("annocap")
        .join("config.toml")
}

/// Get the default output path for annotated videos
fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Videos")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("annotated")
}

fn default_stale_stroke_window() -> u64 {
    DEFAULT_STALE_STROKE_WINDOW
}

fn default_gap_threshold_secs() -> f64 {
    DEFAULT_GAP_THRESHOLD_SECS
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_channels() -> u16 {
    2
}

fn default_stroke_color() -> [u8; 3] {
    [255, 0, 0]
}

fn default_stroke_thickness() -> u32 {
    3
}

fn default_label_color() -> [u8; 3] {
    [255, 255, 255]
}

fn default_join_timeout_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.stale_stroke_window, 5);
        assert_eq!(config.gap_threshold_secs, 0.1);
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn partial_files_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            long_annotations = true
            stale_stroke_window = 12
            audio_device = "USB Mic"
            "#,
        )
        .unwrap();

        assert_eq!(config.stroke_policy(), StrokePolicy::Long);
        assert_eq!(config.session_options().capture.stale_stroke_window, 12);
        assert_eq!(config.audio_device.as_deref(), Some("USB Mic"));
        assert_eq!(config.join_timeout_ms, 1000);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            input_dir: Some(PathBuf::from("/videos")),
            video_bitrate_kbps: 4000,
            ..Config::default()
        };

        config.save(&path).unwrap();
        assert_eq!(Config::load_or_default(&path), config);
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "sample_rate = \"fast\"").unwrap();

        assert_eq!(Config::load_or_default(&path), Config::default());
    }
}
