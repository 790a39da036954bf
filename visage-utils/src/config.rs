//! Shared configuration types consumed by the training and recognition programs.
//!
//! Every section is `#[serde(default)]`, so a settings file only needs to mention the values it
//! changes. Command-line flags are applied on top of whatever is loaded here.

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Which face detector implementation to run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    /// Boosted Haar/LBP cascade loaded from an XML file.
    #[default]
    Cascade,
    /// YuNet ONNX model run through tract.
    Yunet,
}

impl fmt::Display for DetectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectorBackend::Cascade => "cascade",
            DetectorBackend::Yunet => "yunet",
        })
    }
}

impl FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cascade" | "haar" | "lbp" => Ok(DetectorBackend::Cascade),
            "yunet" => Ok(DetectorBackend::Yunet),
            other => Err(format!(
                "invalid detector backend '{other}'; expected 'cascade' or 'yunet'"
            )),
        }
    }
}

/// Face detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorSettings {
    pub backend: DetectorBackend,
    /// Cascade XML file used by the cascade backend.
    pub cascade_path: String,
    /// ONNX model used by the YuNet backend.
    pub yunet_model_path: String,
    /// Pyramid step between detection scales. Must be greater than 1.
    pub scale_factor: f64,
    /// Neighbouring hits a candidate needs to survive grouping.
    pub min_neighbors: u32,
    /// Smallest face side considered, in pixels. Zero disables the bound.
    pub min_size: u32,
    /// Largest face side considered, in pixels. Zero disables the bound.
    pub max_size: u32,
    /// Keep only the largest face.
    pub find_biggest: bool,
    /// Stop at the first (largest) scale that produces a face.
    pub rough_search: bool,
    /// YuNet input resolution (width, height).
    pub yunet_input_width: u32,
    pub yunet_input_height: u32,
    /// YuNet minimum confidence.
    pub score_threshold: f32,
    /// YuNet non-maximum suppression IoU threshold.
    pub nms_threshold: f32,
    /// YuNet cap on candidates kept before NMS.
    pub top_k: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DetectorBackend::Cascade,
            cascade_path: "haarcascade_frontalface_alt.xml".into(),
            yunet_model_path: "models/face_detection_yunet_2023mar_640.onnx".into(),
            scale_factor: 1.1,
            min_neighbors: 1,
            min_size: 250,
            max_size: 0,
            find_biggest: true,
            rough_search: true,
            yunet_input_width: 640,
            yunet_input_height: 640,
            score_threshold: 0.9,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

impl DetectorSettings {
    /// Clamp values to ranges the detectors accept.
    pub fn sanitize(&mut self) {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            self.scale_factor = 1.1;
        }
        self.score_threshold = self.score_threshold.clamp(0.0, 1.0);
        self.nms_threshold = self.nms_threshold.clamp(0.0, 1.0);
        self.yunet_input_width = self.yunet_input_width.max(32);
        self.yunet_input_height = self.yunet_input_height.max(32);
    }
}

/// Geometry of the normalized face samples.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FaceSettings {
    pub sample_width: u32,
    pub sample_height: u32,
    /// Pixels trimmed from the left and right of the square around the face circle.
    pub crop_inset: i32,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            sample_width: 240,
            sample_height: 280,
            crop_inset: 20,
        }
    }
}

/// Eigenface recognizer parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EigenSettings {
    pub components: usize,
    pub threshold: f64,
    pub model_path: String,
}

impl Default for EigenSettings {
    fn default() -> Self {
        Self {
            components: 80,
            threshold: 10_500.0,
            model_path: "models/eigenfaces.bin".into(),
        }
    }
}

/// Fisherface recognizer parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FisherSettings {
    pub components: usize,
    pub threshold: f64,
    pub model_path: String,
}

impl Default for FisherSettings {
    fn default() -> Self {
        Self {
            components: 2,
            threshold: 1_500.0,
            model_path: "models/fisherfaces.bin".into(),
        }
    }
}

/// Camera capture parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebcamSettings {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Pause between frames, also the key polling interval.
    pub poll_interval_ms: u64,
}

impl Default for WebcamSettings {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            fps: 30,
            poll_interval_ms: 10,
        }
    }
}

/// Controls timing logs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Whether telemetry timing logs are enabled.
    pub enabled: bool,
    /// Logging level for telemetry output (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            level: "debug".to_string(),
        }
    }
}

impl TelemetrySettings {
    /// Resolve the configured level string into a `LevelFilter`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.trim().to_ascii_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "error" => LevelFilter::Error,
            "warn" | "warning" => LevelFilter::Warn,
            "info" => LevelFilter::Info,
            "trace" => LevelFilter::Trace,
            _ => LevelFilter::Debug,
        }
    }

    pub fn set_level(&mut self, level: LevelFilter) {
        self.level = level.as_str().to_ascii_lowercase();
    }
}

/// Persistent settings shared by `visage-train` and `visage-recognize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub detector: DetectorSettings,
    pub face: FaceSettings,
    pub eigen: EigenSettings,
    pub fisher: FisherSettings,
    pub webcam: WebcamSettings,
    pub telemetry: TelemetrySettings,
}

impl AppSettings {
    /// Load settings from a JSON file.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let mut settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        settings.detector.sanitize();
        Ok(settings)
    }

    /// Load `path` when given, else the default settings file when it exists, else defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let fallback = default_settings_path();
                if fallback.is_file() {
                    log::debug!("loading settings from {}", fallback.display());
                    Self::load_from_path(&fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Serialize settings to disk in pretty-printed JSON, creating parent directories.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }
}

/// Returns the default path for persisted settings (`config/visage.json`).
pub fn default_settings_path() -> PathBuf {
    env::current_dir()
        .map(|dir| dir.join("config/visage.json"))
        .unwrap_or_else(|_| PathBuf::from("config/visage.json"))
}
