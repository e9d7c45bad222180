//! `sitstraight` command-line entry point.

mod commands;
mod settings;
mod state;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sitstraight_core::ModelVariant;
use tracing::info;

use commands::FrameInput;
use settings::{apply_runtime_env_from_settings, default_settings_path, load_settings};
use state::{AppState, ModelChoice};

#[derive(Debug, Parser)]
#[command(name = "sitstraight", version, about = "Webcam posture monitor")]
struct Cli {
    /// MoveNet variant to load.
    #[arg(long, global = true, value_enum)]
    model: Option<ModelArg>,

    /// Explicit path to the MoveNet `.onnx` file.
    #[arg(long, global = true)]
    model_path: Option<PathBuf>,

    /// Threshold file to read or write.
    #[arg(long, global = true, env = "SITSTRAIGHT_THRESHOLDS")]
    thresholds: Option<PathBuf>,

    /// Settings file (defaults to the per-user data directory).
    #[arg(long, global = true, env = "SITSTRAIGHT_SETTINGS")]
    settings: Option<PathBuf>,

    /// Use a fixed upright pose instead of a real model.
    #[arg(long, global = true)]
    stub_model: bool,

    /// Print engine events as JSON lines on stdout.
    #[arg(long, global = true)]
    json_events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Lightning,
    Thunder,
}

impl From<ModelArg> for ModelVariant {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Lightning => ModelVariant::Lightning,
            ModelArg::Thunder => ModelVariant::Thunder,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Record a good then a bad posture window and save thresholds.
    Calibrate {
        /// Directory of frames to replay.
        #[arg(long, conflicts_with = "camera", required_unless_present = "camera")]
        frames: Option<PathBuf>,
        /// Capture from this webcam instead of replaying frames.
        #[arg(long)]
        camera: Option<i32>,
        #[arg(long)]
        fps: Option<f64>,
        /// Sleep between frames instead of replaying as fast as possible.
        #[arg(long)]
        realtime: bool,
        /// Also write the full calibration report (JSON) here.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Monitor posture against saved thresholds.
    Detect {
        #[arg(long, conflicts_with = "camera", required_unless_present = "camera")]
        frames: Option<PathBuf>,
        #[arg(long)]
        camera: Option<i32>,
        #[arg(long)]
        fps: Option<f64>,
        #[arg(long)]
        realtime: bool,
        /// Directory of `.wav` alert clips.
        #[arg(long)]
        audio_dir: Option<PathBuf>,
    },
    /// Print the saved thresholds.
    Thresholds,
    /// List audio output devices.
    Devices,
    /// Print the effective settings.
    Settings {
        /// Write the normalized settings back to disk.
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitstraight=info,sitstraight_core=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    if let Some(model) = cli.model {
        settings.model_variant = ModelVariant::from(model).as_str().into();
    }
    apply_runtime_env_from_settings(&settings);
    info!(settings = %settings_path.display(), "SitStraight starting");

    if let Command::Devices = cli.command {
        return commands::list_devices();
    }

    let state = AppState::new(
        settings,
        settings_path,
        cli.thresholds.clone(),
        &ModelChoice {
            stub: cli.stub_model,
            model_path: cli.model_path.clone(),
        },
    )?;

    match cli.command {
        Command::Calibrate {
            frames,
            camera,
            fps,
            realtime,
            report,
        } => {
            let input = FrameInput {
                frames,
                camera,
                fps,
                realtime,
            };
            commands::calibrate(&state, &input, report.as_deref(), cli.json_events).await
        }
        Command::Detect {
            frames,
            camera,
            fps,
            realtime,
            audio_dir,
        } => {
            let input = FrameInput {
                frames,
                camera,
                fps,
                realtime,
            };
            commands::detect(&state, &input, audio_dir, cli.json_events).await
        }
        Command::Thresholds => commands::show_thresholds(&state),
        Command::Settings { save } => commands::show_settings(&state, save),
        Command::Devices => commands::list_devices(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sitstraight",
            "detect",
            "--frames",
            "/tmp/frames",
            "--model",
            "thunder",
            "--stub-model",
        ])
        .expect("parse");
        assert!(cli.stub_model);
        assert!(matches!(cli.model, Some(ModelArg::Thunder)));
        assert!(matches!(cli.command, Command::Detect { .. }));
    }

    #[test]
    fn cli_accepts_camera_instead_of_frames() {
        let cli = Cli::try_parse_from(["sitstraight", "calibrate", "--camera", "1"]).expect("parse");
        match cli.command {
            Command::Calibrate { frames, camera, .. } => {
                assert!(frames.is_none());
                assert_eq!(camera, Some(1));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_needs_exactly_one_frame_input() {
        assert!(Cli::try_parse_from(["sitstraight", "detect"]).is_err());
        assert!(Cli::try_parse_from([
            "sitstraight",
            "detect",
            "--frames",
            "/tmp/frames",
            "--camera",
            "0",
        ])
        .is_err());
    }

    #[test]
    fn cli_rejects_unknown_model_variant() {
        let parsed = Cli::try_parse_from([
            "sitstraight",
            "--model",
            "huge",
            "thresholds",
        ]);
        assert!(parsed.is_err());
    }
}
