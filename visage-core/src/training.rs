//! Building training samples from a dataset and fitting both recognizers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::GrayImage;
use log::{Level, info, warn};
use rayon::prelude::*;
use visage_utils::{
    config::{EigenSettings, FaceSettings, FisherSettings},
    load_image, timing_guard,
};

use crate::{
    dataset::DatasetEntry,
    detector::FaceDetector,
    error::VisageError,
    recognizer::{EigenFaceRecognizer, FaceRecognizer, FisherFaceRecognizer},
    sample::prepare_training_sample,
};

/// Why a listed image contributed no sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Unreadable(String),
    NoFace,
    DetectionFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub line: u64,
    pub reason: SkipReason,
}

/// Counts gathered while building a training set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingReport {
    pub images_listed: usize,
    pub samples_used: usize,
    pub skipped: Vec<SkippedImage>,
}

/// Normalized face samples with their labels, in dataset order.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub samples: Vec<GrayImage>,
    pub labels: Vec<i32>,
    pub report: TrainingReport,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Load every listed image, detect its face and normalize it.
///
/// Images are processed in parallel; the resulting order matches `entries`. Images that cannot
/// be read or contain no face are skipped with a warning.
pub fn collect_samples(
    entries: &[DatasetEntry],
    detector: &dyn FaceDetector,
    face: &FaceSettings,
) -> TrainingSet {
    let _timing = timing_guard("visage_core::training::collect_samples", Level::Debug);

    let outcomes: Vec<Result<GrayImage, SkipReason>> = entries
        .par_iter()
        .map(|entry| sample_for(entry, detector, face))
        .collect();

    let mut set = TrainingSet {
        report: TrainingReport {
            images_listed: entries.len(),
            ..TrainingReport::default()
        },
        ..TrainingSet::default()
    };
    for (entry, outcome) in entries.iter().zip(outcomes) {
        match outcome {
            Ok(sample) => {
                set.samples.push(sample);
                set.labels.push(entry.label);
            }
            Err(reason) => {
                match &reason {
                    SkipReason::Unreadable(err) => {
                        warn!("Skipping {}: {err}", entry.path.display())
                    }
                    SkipReason::NoFace => warn!("No face found in {}", entry.path.display()),
                    SkipReason::DetectionFailed(err) => {
                        warn!("Face detection failed on {}: {err}", entry.path.display())
                    }
                }
                set.report.skipped.push(SkippedImage {
                    path: entry.path.clone(),
                    line: entry.line,
                    reason,
                });
            }
        }
    }
    set.report.samples_used = set.samples.len();
    set
}

fn sample_for(
    entry: &DatasetEntry,
    detector: &dyn FaceDetector,
    face: &FaceSettings,
) -> Result<GrayImage, SkipReason> {
    let image = load_image(&entry.path).map_err(|e| SkipReason::Unreadable(format!("{e:#}")))?;
    match prepare_training_sample(&image, detector, face) {
        Ok(Some(sample)) => Ok(sample),
        Ok(None) => Err(SkipReason::NoFace),
        Err(e) => Err(SkipReason::DetectionFailed(format!("{e:#}"))),
    }
}

/// Both recognizers trained on the same samples.
#[derive(Debug, Clone)]
pub struct TrainedModels {
    pub eigen: EigenFaceRecognizer,
    pub fisher: FisherFaceRecognizer,
}

impl TrainedModels {
    pub fn save(&self, eigen_path: &Path, fisher_path: &Path) -> Result<()> {
        self.eigen
            .save(eigen_path)
            .with_context(|| format!("failed to save {}", eigen_path.display()))?;
        self.fisher
            .save(fisher_path)
            .with_context(|| format!("failed to save {}", fisher_path.display()))?;
        Ok(())
    }
}

/// Fit the Eigenfaces and Fisherfaces recognizers.
pub fn train_models(
    set: &TrainingSet,
    eigen: &EigenSettings,
    fisher: &FisherSettings,
) -> Result<TrainedModels> {
    if set.is_empty() {
        return Err(VisageError::EmptyDataset {
            listed: set.report.images_listed,
        }
        .into());
    }

    let mut eigen_model = EigenFaceRecognizer::from(eigen);
    eigen_model.train(&set.samples, &set.labels)?;
    let mut fisher_model = FisherFaceRecognizer::from(fisher);
    fisher_model.train(&set.samples, &set.labels)?;

    info!(
        "Trained eigenfaces ({} components) and fisherfaces ({} components) on {} samples",
        eigen_model.trained_components().unwrap_or_default(),
        fisher_model.trained_components().unwrap_or_default(),
        set.len()
    );
    Ok(TrainedModels {
        eigen: eigen_model,
        fisher: fisher_model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use image::{Rgb, RgbImage};

    struct CenterDetector;

    impl FaceDetector for CenterDetector {
        fn detect(&self, image: &GrayImage) -> Result<Vec<Rect>> {
            // Uniform images have no face.
            if image.pixels().all(|p| p.0[0] == image.get_pixel(0, 0).0[0]) {
                return Ok(Vec::new());
            }
            Ok(vec![Rect::new(10, 10, 40, 40)])
        }
    }

    fn settings() -> FaceSettings {
        FaceSettings {
            sample_width: 12,
            sample_height: 14,
            crop_inset: 4,
        }
    }

    fn write_face(dir: &Path, name: &str, seed: u32) -> PathBuf {
        let img = RgbImage::from_fn(60, 60, |x, y| {
            let v = ((x * (seed + 3) + y * (seed * 7 + 1)) % 200) as u8 + 20;
            Rgb([v, v / 2, 255 - v])
        });
        let path = dir.join(name);
        img.save(&path).expect("save");
        path
    }

    fn entry(path: PathBuf, label: i32, line: u64) -> DatasetEntry {
        DatasetEntry { path, label, line }
    }

    #[test]
    fn collects_in_order_and_skips_bad_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blank = dir.path().join("blank.png");
        RgbImage::new(60, 60).save(&blank).expect("save");
        let entries = vec![
            entry(write_face(dir.path(), "a.png", 1), 1, 1),
            entry(dir.path().join("missing.png"), 1, 2),
            entry(blank, 2, 3),
            entry(write_face(dir.path(), "b.png", 2), 2, 4),
        ];

        let set = collect_samples(&entries, &CenterDetector, &settings());
        assert_eq!(set.labels, vec![1, 2]);
        assert_eq!(set.report.images_listed, 4);
        assert_eq!(set.report.samples_used, 2);
        assert_eq!(set.report.skipped.len(), 2);
        assert!(matches!(
            set.report.skipped[0].reason,
            SkipReason::Unreadable(_)
        ));
        assert_eq!(set.report.skipped[1].reason, SkipReason::NoFace);
        assert_eq!(set.report.skipped[1].line, 3);
        assert!(set.samples.iter().all(|s| s.dimensions() == (12, 14)));
    }

    #[test]
    fn empty_set_is_empty_dataset_error() {
        let set = TrainingSet {
            report: TrainingReport {
                images_listed: 3,
                ..TrainingReport::default()
            },
            ..TrainingSet::default()
        };
        let err = train_models(&set, &EigenSettings::default(), &FisherSettings::default())
            .expect_err("empty");
        assert!(matches!(
            err.downcast_ref::<VisageError>(),
            Some(VisageError::EmptyDataset { listed: 3 })
        ));
    }

    #[test]
    fn trains_and_saves_both_models() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut entries = Vec::new();
        for i in 0..6u32 {
            let path = write_face(dir.path(), &format!("f{i}.png"), i + 1);
            entries.push(entry(path, (i % 2) as i32, i as u64 + 1));
        }
        let set = collect_samples(&entries, &CenterDetector, &settings());
        assert_eq!(set.len(), 6);

        let models = train_models(&set, &EigenSettings::default(), &FisherSettings::default())
            .expect("train");
        let eigen_path = dir.path().join("models/eigenfaces.bin");
        let fisher_path = dir.path().join("models/fisherfaces.bin");
        models.save(&eigen_path, &fisher_path).expect("save");
        assert!(eigen_path.is_file());
        assert!(fisher_path.is_file());
        assert_eq!(models.fisher.trained_components(), Some(1));
    }
}
