// Audio capture
//
// The sink is what the audio callback calls: it stamps each batch against the
// session epoch and hands it to the timeline's lock-free audio path. Inputs
// own the device stream; the cpal input keeps its stream on the thread that
// built it, since cpal streams are not Send.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::timeline::{Epoch, TimelineStore};

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("No default audio input device")]
    NoDefaultDevice,

    #[error("Audio config error: {0}")]
    Config(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Callback target for captured samples
#[derive(Clone)]
pub struct AudioCaptureSink {
    timeline: Arc<TimelineStore>,
    epoch: Epoch,
}

impl AudioCaptureSink {
    pub fn new(timeline: Arc<TimelineStore>, epoch: Epoch) -> Self {
        Self { timeline, epoch }
    }

    /// Record one batch of interleaved samples. Never blocks.
    pub fn on_samples(&self, data: &[f32]) {
        if data.is_empty() {
            return;
        }
        self.timeline
            .append_audio(self.epoch.elapsed_secs(), data.to_vec());
    }
}

/// Stream format actually negotiated with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A source of microphone samples
pub trait AudioInput {
    /// Start delivering samples to `sink`; returns the negotiated format
    fn start(&mut self, sink: AudioCaptureSink) -> Result<AudioFormat>;

    /// Stop the stream. Calling it when not started is a no-op.
    fn stop(&mut self);
}

/// Microphone input through cpal's default host
pub struct CpalAudioInput {
    device_name: Option<String>,
    requested: AudioFormat,
    stream: Option<cpal::Stream>,
}

impl CpalAudioInput {
    /// `device_name` of None selects the host's default input
    pub fn new(device_name: Option<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            device_name,
            requested: AudioFormat {
                sample_rate,
                channels,
            },
            stream: None,
        }
    }

    fn find_device(&self, host: &cpal::Host) -> Result<cpal::Device> {
        let Some(wanted) = &self.device_name else {
            return host.default_input_device().ok_or(AudioError::NoDefaultDevice);
        };

        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Config(format!("Failed to list input devices: {}", e)))?;
        for device in devices {
            if device.name().map(|name| &name == wanted).unwrap_or(false) {
                return Ok(device);
            }
        }
        Err(AudioError::DeviceNotFound(wanted.clone()))
    }

    /// The requested rate/channels when the device supports them as f32,
    /// otherwise the device default.
    fn pick_config(&self, device: &cpal::Device) -> Result<cpal::StreamConfig> {
        let wanted = cpal::SampleRate(self.requested.sample_rate);
        if let Ok(mut ranges) = device.supported_input_configs() {
            let matching = ranges.find(|range| {
                range.channels() == self.requested.channels
                    && range.sample_format() == cpal::SampleFormat::F32
                    && range.min_sample_rate() <= wanted
                    && wanted <= range.max_sample_rate()
            });
            if let Some(range) = matching {
                return Ok(range.with_sample_rate(wanted).into());
            }
        }

        let fallback = device
            .default_input_config()
            .map_err(|e| AudioError::Config(format!("No usable input config: {}", e)))?;
        log::warn!(
            "Audio input does not support {}Hz {}ch, using device default {}Hz {}ch",
            self.requested.sample_rate,
            self.requested.channels,
            fallback.sample_rate().0,
            fallback.channels()
        );
        Ok(fallback.into())
    }
}

impl AudioInput for CpalAudioInput {
    fn start(&mut self, sink: AudioCaptureSink) -> Result<AudioFormat> {
        self.stop();

        let host = cpal::default_host();
        let device = self.find_device(&host)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".into());
        let config = self.pick_config(&device)?;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    sink.on_samples(data);
                },
                |err| {
                    log::warn!("Audio error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::Stream(format!("Failed to create audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::Stream(format!("Failed to start audio stream: {}", e)))?;

        let format = AudioFormat {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };
        log::info!(
            "Audio input ready: {} ({}Hz, {}ch)",
            device_name,
            format.sample_rate,
            format.channels
        );

        self.stream = Some(stream);
        Ok(format)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause audio stream: {}", e);
            }
            log::info!("Audio input stopped");
        }
    }
}

impl Drop for CpalAudioInput {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Input that captures nothing, for sessions without a microphone
#[derive(Debug, Clone, Copy)]
pub struct SilentInput {
    pub format: AudioFormat,
}

impl AudioInput for SilentInput {
    fn start(&mut self, _sink: AudioCaptureSink) -> Result<AudioFormat> {
        Ok(self.format)
    }

    fn stop(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_timestamps_against_the_shared_epoch() {
        let timeline = Arc::new(TimelineStore::new(0));
        let epoch = Epoch::now();
        let sink = AudioCaptureSink::new(timeline.clone(), epoch);

        sink.on_samples(&[0.1, 0.2]);
        sink.on_samples(&[]);
        let later = epoch.elapsed_secs();
        sink.on_samples(&[0.3, 0.4]);

        let audio = timeline.finish().audio;
        assert_eq!(audio.len(), 2);
        assert!(audio[0].capture_timestamp <= later);
        assert!(audio[1].capture_timestamp >= later);
        assert_eq!(audio[1].samples, vec![0.3, 0.4]);
    }

    #[test]
    fn silent_input_reports_its_format() {
        let format = AudioFormat {
            sample_rate: 44_100,
            channels: 2,
        };
        let mut input = SilentInput { format };
        let sink = AudioCaptureSink::new(Arc::new(TimelineStore::new(0)), Epoch::now());
        assert_eq!(input.start(sink).unwrap(), format);
    }
}
