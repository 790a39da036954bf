//! Command-line argument definitions for both programs.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser};
use visage_utils::config::DetectorBackend;

/// Flags shared by training and recognition.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Optional settings JSON. Defaults to `config/visage.json` when present, otherwise
    /// built-in parameters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Cascade classifier XML used to find faces.
    #[arg(long)]
    pub cascade: Option<PathBuf>,

    /// Face detector implementation (`cascade` or `yunet`).
    #[arg(long)]
    pub backend: Option<DetectorBackend>,

    /// YuNet ONNX model, used with `--backend yunet`.
    #[arg(long)]
    pub yunet_model: Option<PathBuf>,

    /// Eigenfaces model file.
    #[arg(long)]
    pub eigen_model: Option<PathBuf>,

    /// Fisherfaces model file.
    #[arg(long)]
    pub fisher_model: Option<PathBuf>,

    /// Eigenfaces distance threshold.
    #[arg(long)]
    pub eigen_threshold: Option<f64>,

    /// Fisherfaces distance threshold.
    #[arg(long)]
    pub fisher_threshold: Option<f64>,

    /// Enable telemetry timing logs (defaults to settings file).
    #[arg(long, action = ArgAction::SetTrue)]
    pub telemetry: bool,

    /// Override telemetry logging level (error, warn, info, debug, trace).
    #[arg(long, value_name = "LEVEL")]
    pub telemetry_level: Option<String>,
}

/// Train Eigenfaces and Fisherfaces models from a `path;label` list.
#[derive(Debug, Parser)]
#[command(name = "visage-train", author, version, about)]
pub struct TrainArgs {
    /// CSV file with one `image_path;label` entry per line.
    pub csv: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of Eigenfaces components (0 keeps all).
    #[arg(long)]
    pub eigen_components: Option<usize>,

    /// Number of Fisherfaces components (0 keeps classes - 1).
    #[arg(long)]
    pub fisher_components: Option<usize>,
}

/// Recognize faces from a webcam using previously trained models.
#[derive(Debug, Parser)]
#[command(name = "visage-recognize", author, version, about)]
pub struct RecognizeArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Webcam device index.
    #[arg(long)]
    pub device: Option<u32>,

    /// Requested capture width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Requested capture height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Run without a window, logging identifications.
    #[arg(long, action = ArgAction::SetTrue)]
    pub headless: bool,

    /// Frames to process in headless mode (0 = continuous, Ctrl+C to stop).
    #[arg(long, default_value_t = 0, requires = "headless")]
    pub frames: u32,

    /// Directory to write annotated frames to in headless mode.
    #[arg(long, requires = "headless")]
    pub annotate: Option<PathBuf>,

    /// Write identifications to a JSON file when headless mode ends.
    #[arg(long, requires = "headless")]
    pub json: Option<PathBuf>,
}
