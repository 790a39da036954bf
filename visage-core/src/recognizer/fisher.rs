use std::{collections::BTreeSet, path::Path};

use anyhow::{Context, Result, ensure};
use image::GrayImage;
use log::{Level, debug};
use visage_utils::{config::FisherSettings, timing_guard};

use super::{
    FaceRecognizer, Lda, ModelKind, Pca, Prediction, Subspace, stack_samples,
    storage::{load_model, save_model},
};

/// Fisherfaces: PCA down to `samples - classes` dimensions followed by LDA.
#[derive(Debug, Clone)]
pub struct FisherFaceRecognizer {
    components: usize,
    threshold: f64,
    model: Option<Subspace>,
}

impl FisherFaceRecognizer {
    pub const DEFAULT_COMPONENTS: usize = 2;
    pub const DEFAULT_THRESHOLD: f64 = 1_500.0;

    /// `components == 0` keeps `classes - 1` discriminants.
    pub fn new(components: usize, threshold: f64) -> Self {
        Self {
            components,
            threshold,
            model: None,
        }
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn trained_components(&self) -> Option<usize> {
        self.model.as_ref().map(Subspace::components)
    }
}

impl Default for FisherFaceRecognizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COMPONENTS, Self::DEFAULT_THRESHOLD)
    }
}

impl From<&FisherSettings> for FisherFaceRecognizer {
    fn from(settings: &FisherSettings) -> Self {
        Self::new(settings.components, settings.threshold)
    }
}

impl FaceRecognizer for FisherFaceRecognizer {
    fn kind(&self) -> ModelKind {
        ModelKind::Fisherfaces
    }

    fn train(&mut self, samples: &[GrayImage], labels: &[i32]) -> Result<()> {
        let _timing = timing_guard("visage_core::fisherfaces::train", Level::Debug);
        let (data, size) = stack_samples(samples, labels)?;

        let classes = labels.iter().collect::<BTreeSet<_>>().len();
        ensure!(
            classes >= 2,
            "fisherfaces need at least two distinct labels, got {classes}"
        );
        let reduced = samples.len() - classes;
        ensure!(
            reduced > 0,
            "fisherfaces need more samples than labels ({} samples, {classes} labels)",
            samples.len()
        );

        let pca = Pca::compute(&data, reduced).context("fisherfaces PCA step failed")?;
        let projected = pca.project_rows(&data);
        let lda = Lda::compute(&projected, labels, self.components)
            .context("fisherfaces LDA step failed")?;
        debug!(
            "fisherfaces: {} samples, {classes} labels, PCA {} -> LDA {} components",
            samples.len(),
            pca.components(),
            lda.components()
        );

        let basis = pca.basis.dot(&lda.basis);
        self.model = Some(Subspace::build(
            size,
            &data,
            pca.mean,
            basis,
            lda.eigenvalues,
            labels,
        ));
        Ok(())
    }

    fn predict(&self, sample: &GrayImage) -> Result<Prediction> {
        let model = self
            .model
            .as_ref()
            .context("fisherfaces recognizer is not trained")?;
        model.nearest(sample, self.threshold)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .context("cannot save an untrained fisherfaces recognizer")?;
        save_model(path, self.kind(), self.components, self.threshold, model)
    }

    fn load(path: &Path) -> Result<Self> {
        let stored = load_model(path, ModelKind::Fisherfaces)?;
        Ok(Self {
            components: stored.components,
            threshold: stored.threshold,
            model: Some(stored.subspace),
        })
    }

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}
