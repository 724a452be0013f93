//! Annocap command-line interface
//!
//! Runs annotation sessions headlessly: control and pointer verbs are read
//! from stdin, and saved timelines can be replayed over their video.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use clap::{Parser, Subcommand};

use annocap_lib::config::{default_config_path, Config};
use annocap_lib::control::{self, ControlFlow, ControlVerb};
use annocap_lib::encoding::{GstVideoEncoder, VideoEncoder, VideoSpec};
use annocap_lib::gstreamer_init::init_gstreamer;
use annocap_lib::recording::{
    AudioFormat, AudioInput, CaptureSession, ChannelSurface, CpalAudioInput, SilentInput,
};
use annocap_lib::session::{OutputPaths, SaveTargets};
use annocap_lib::video::{Decoder, GstDecoder, PlaybackReconstructor, Raster};

/// Annocap - annotate videos frame by frame while narrating
#[derive(Parser, Debug)]
#[command(name = "annocap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture an annotation session over a video
    Annotate {
        video: PathBuf,

        /// Redraw whole strokes instead of the latest segment
        #[arg(long)]
        long: bool,

        /// Discard the session when it closes
        #[arg(long)]
        no_save: bool,

        /// Capture without a microphone
        #[arg(long)]
        no_audio: bool,
    },
    /// Redraw a saved timeline over its video and encode the result
    Replay {
        video: PathBuf,
        timeline: PathBuf,
        output: PathBuf,

        #[arg(long)]
        long: bool,
    },
    /// Print the effective configuration
    Config,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load_or_default(&config_path);

    let result = match cli.command {
        Commands::Annotate {
            video,
            long,
            no_save,
            no_audio,
        } => annotate(&video, config_with_policy(config, long), no_save, no_audio),
        Commands::Replay {
            video,
            timeline,
            output,
            long,
        } => replay(&video, &timeline, &output, &config_with_policy(config, long)),
        Commands::Config => print_config(&config),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn config_with_policy(mut config: Config, long: bool) -> Config {
    config.long_annotations |= long;
    config
}

fn annotate(video: &Path, config: Config, no_save: bool, no_audio: bool) -> anyhow::Result<()> {
    init_gstreamer();

    let (surface, pointer) = ChannelSurface::new();
    let audio: Box<dyn AudioInput> = if no_audio {
        Box::new(SilentInput {
            format: AudioFormat {
                sample_rate: config.sample_rate,
                channels: config.channels,
            },
        })
    } else {
        Box::new(CpalAudioInput::new(
            config.audio_device.clone(),
            config.sample_rate,
            config.channels,
        ))
    };

    let session = CaptureSession::open(video, Box::new(surface), audio, config.session_options())
        .with_context(|| format!("Failed to start session for {}", video.display()))?;
    log::info!("Commands: pause, seek <n>, restart, down|move|up <x> <y>, status, save, quit");

    // End of input closes the session as if `save` was entered
    let mut save = true;
    for line in std::io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ControlVerb>() {
            Ok(verb) => {
                if let ControlFlow::Close { save: requested } = control::apply(verb, &session, &pointer) {
                    save = requested;
                    break;
                }
            }
            Err(e) => log::warn!("{}", e),
        }
    }

    if no_save || !save {
        session.close(None)?;
        log::info!("Session discarded");
        return Ok(());
    }

    let paths = OutputPaths::for_input(video, config.input_dir.as_deref(), &config.output_dir);
    let mut targets = SaveTargets::gstreamer(config.encoder_config());
    if let Some(report) = session.close(Some((&paths, &mut targets)))? {
        if !report.all_ok() {
            anyhow::bail!("Some outputs could not be saved");
        }
    }
    Ok(())
}

fn replay(video: &Path, timeline: &Path, output: &Path, config: &Config) -> anyhow::Result<()> {
    init_gstreamer();

    let mut decoder = GstDecoder::open(video)
        .with_context(|| format!("Failed to open {}", video.display()))?;
    let mut playback = PlaybackReconstructor::load(
        timeline,
        config.stroke_policy(),
        config.stroke_style(),
        config.label_color,
    )?;

    let (width, height) = decoder.frame_size();
    let spec = VideoSpec {
        width,
        height,
        fps: decoder.fps(),
    };

    let mut frames: Vec<Raster> = Vec::new();
    playback.run(&mut decoder, &AtomicBool::new(false), |_, raster| {
        frames.push(raster);
        true
    })?;

    let refs: Vec<&Raster> = frames.iter().collect();
    GstVideoEncoder::new(config.encoder_config())
        .encode(output, spec, &refs)
        .with_context(|| format!("Failed to encode {}", output.display()))?;
    log::info!("Wrote {} annotated frames to {}", frames.len(), output.display());
    Ok(())
}

fn print_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_annotate_flags() {
        let cli = Cli::try_parse_from(["annocap", "annotate", "clip.mp4", "--long", "--no-save"]).unwrap();
        match cli.command {
            Commands::Annotate {
                video,
                long,
                no_save,
                no_audio,
            } => {
                assert_eq!(video, PathBuf::from("clip.mp4"));
                assert!(long);
                assert!(no_save);
                assert!(!no_audio);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn parse_replay() {
        let cli = Cli::try_parse_from([
            "annocap",
            "replay",
            "clip_annotated.mkv",
            "clip_annotated.json",
            "out.mkv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Replay { long: false, .. }));
    }
}
