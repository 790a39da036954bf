//! Configuration loading and CLI override logic.

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{LevelFilter, info};
use visage_utils::{
    config::{AppSettings, default_settings_path},
    configure_telemetry, normalize_path,
};

use crate::args::{CommonArgs, RecognizeArgs, TrainArgs};

/// Load application settings from a file or use defaults.
pub fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    let resolved = config_path.map(normalize_path).transpose()?;
    let settings = AppSettings::resolve(resolved.as_deref())?;
    match resolved {
        Some(path) => info!("Loaded settings from {}", path.display()),
        None if default_settings_path().is_file() => {
            info!("Loaded settings from {}", default_settings_path().display())
        }
        None => {}
    }
    Ok(settings)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Overrides shared by both programs.
pub fn apply_common_overrides(settings: &mut AppSettings, args: &CommonArgs) {
    if let Some(cascade) = args.cascade.as_ref() {
        settings.detector.cascade_path = path_string(cascade);
    }
    if let Some(backend) = args.backend {
        settings.detector.backend = backend;
    }
    if let Some(model) = args.yunet_model.as_ref() {
        settings.detector.yunet_model_path = path_string(model);
    }
    if let Some(path) = args.eigen_model.as_ref() {
        settings.eigen.model_path = path_string(path);
    }
    if let Some(path) = args.fisher_model.as_ref() {
        settings.fisher.model_path = path_string(path);
    }
    if let Some(threshold) = args.eigen_threshold {
        settings.eigen.threshold = threshold;
    }
    if let Some(threshold) = args.fisher_threshold {
        settings.fisher.threshold = threshold;
    }

    if args.telemetry {
        settings.telemetry.enabled = true;
    }
    if let Some(level) = args.telemetry_level.as_ref() {
        let normalized = level.trim();
        if !normalized.is_empty() {
            let lower = normalized.to_ascii_lowercase();
            if lower == "off" {
                settings.telemetry.enabled = false;
            }
            settings.telemetry.level = lower;
        }
    }
}

pub fn apply_train_overrides(settings: &mut AppSettings, args: &TrainArgs) {
    apply_common_overrides(settings, &args.common);
    if let Some(components) = args.eigen_components {
        settings.eigen.components = components;
    }
    if let Some(components) = args.fisher_components {
        settings.fisher.components = components;
    }
}

pub fn apply_recognize_overrides(settings: &mut AppSettings, args: &RecognizeArgs) {
    apply_common_overrides(settings, &args.common);
    if let Some(device) = args.device {
        settings.webcam.device_index = device;
    }
    if let Some(width) = args.width {
        settings.webcam.width = width;
    }
    if let Some(height) = args.height {
        settings.webcam.height = height;
    }
}

/// Push the telemetry section into the global telemetry switch.
pub fn apply_telemetry(settings: &AppSettings) {
    let level = settings.telemetry.level_filter();
    configure_telemetry(
        settings.telemetry.enabled && level != LevelFilter::Off,
        level,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use visage_utils::config::DetectorBackend;

    #[test]
    fn train_flags_override_settings() {
        let args = TrainArgs::parse_from([
            "visage-train",
            "faces.csv",
            "--cascade",
            "cascades/lbp.xml",
            "--eigen-model",
            "out/e.bin",
            "--eigen-components",
            "20",
            "--fisher-components",
            "1",
            "--eigen-threshold",
            "8000",
        ]);
        let mut settings = AppSettings::default();
        apply_train_overrides(&mut settings, &args);
        assert_eq!(settings.detector.cascade_path, "cascades/lbp.xml");
        assert_eq!(settings.eigen.model_path, "out/e.bin");
        assert_eq!(settings.eigen.components, 20);
        assert_eq!(settings.eigen.threshold, 8000.0);
        assert_eq!(settings.fisher.components, 1);
        assert_eq!(settings.fisher.model_path, "models/fisherfaces.bin");
    }

    #[test]
    fn recognize_flags_override_settings() {
        let args = RecognizeArgs::parse_from([
            "visage-recognize",
            "--device",
            "2",
            "--width",
            "320",
            "--backend",
            "yunet",
            "--telemetry",
            "--telemetry-level",
            "TRACE",
        ]);
        let mut settings = AppSettings::default();
        apply_recognize_overrides(&mut settings, &args);
        assert_eq!(settings.webcam.device_index, 2);
        assert_eq!(settings.webcam.width, 320);
        assert_eq!(settings.webcam.height, 480);
        assert_eq!(settings.detector.backend, DetectorBackend::Yunet);
        assert!(settings.telemetry.enabled);
        assert_eq!(settings.telemetry.level, "trace");
    }

    #[test]
    fn telemetry_off_disables() {
        let args = RecognizeArgs::parse_from([
            "visage-recognize",
            "--telemetry",
            "--telemetry-level",
            "off",
        ]);
        let mut settings = AppSettings::default();
        apply_recognize_overrides(&mut settings, &args);
        assert!(!settings.telemetry.enabled);
    }

    #[test]
    fn explicit_config_file_is_loaded() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("visage.json");
        std::fs::write(&path, r#"{ "face": { "sample_width": 100 } }"#).expect("write");
        let settings = load_settings(Some(&path)).expect("load");
        assert_eq!(settings.face.sample_width, 100);
        assert_eq!(settings.face.sample_height, 280);
    }
}
