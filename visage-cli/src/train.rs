//! The `visage-train` workflow.

use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use visage_core::{
    DEFAULT_SEPARATOR, TrainingReport, build_detector, collect_samples, read_dataset,
    train_models,
};
use visage_utils::config::AppSettings;

/// Load the detector, build samples from `csv`, train both recognizers and save them.
pub fn run_training(csv: &Path, settings: &AppSettings) -> Result<TrainingReport> {
    let detector = build_detector(&settings.detector)?;
    let entries = read_dataset(csv, DEFAULT_SEPARATOR)?;
    info!("Read {} entries from {}", entries.len(), csv.display());

    let set = collect_samples(&entries, detector.as_ref(), &settings.face);
    if !set.report.skipped.is_empty() {
        warn!(
            "{} of {} listed images were skipped",
            set.report.skipped.len(),
            set.report.images_listed
        );
    }

    let models = train_models(&set, &settings.eigen, &settings.fisher)?;
    models
        .save(
            Path::new(&settings.eigen.model_path),
            Path::new(&settings.fisher.model_path),
        )
        .context("failed to write models")?;
    info!(
        "Models written to {} and {}",
        settings.eigen.model_path, settings.fisher.model_path
    );
    Ok(set.report)
}

/// Line printed when training succeeds.
pub fn completion_message(report: &TrainingReport) -> String {
    format!("Training completed with {} images.", report.samples_used)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_message_counts_used_samples() {
        let report = TrainingReport {
            images_listed: 10,
            samples_used: 8,
            skipped: Vec::new(),
        };
        assert_eq!(completion_message(&report), "Training completed with 8 images.");
    }

    #[test]
    fn missing_cascade_fails_before_reading_csv() {
        let mut settings = AppSettings::default();
        settings.detector.cascade_path = "nowhere/cascade.xml".into();
        let err = run_training(Path::new("also/missing.csv"), &settings).expect_err("fails");
        assert!(matches!(
            visage_core::find_visage_error(&err),
            Some(visage_core::VisageError::CascadeLoad { .. })
        ));
    }
}
