use std::path::Path;

use anyhow::{Context, Result};
use image::GrayImage;
use log::{Level, debug};
use visage_utils::{config::EigenSettings, timing_guard};

use super::{
    FaceRecognizer, ModelKind, Pca, Prediction, Subspace, stack_samples,
    storage::{load_model, save_model},
};

/// Eigenfaces: nearest neighbour in the principal component space of the training set.
#[derive(Debug, Clone)]
pub struct EigenFaceRecognizer {
    components: usize,
    threshold: f64,
    model: Option<Subspace>,
}

impl EigenFaceRecognizer {
    pub const DEFAULT_COMPONENTS: usize = 80;
    pub const DEFAULT_THRESHOLD: f64 = 10_500.0;

    /// `components == 0` keeps every component the training set supports.
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

    /// Components actually kept by the last training run.
    pub fn trained_components(&self) -> Option<usize> {
        self.model.as_ref().map(Subspace::components)
    }
}

impl Default for EigenFaceRecognizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_COMPONENTS, Self::DEFAULT_THRESHOLD)
    }
}

impl From<&EigenSettings> for EigenFaceRecognizer {
    fn from(settings: &EigenSettings) -> Self {
        Self::new(settings.components, settings.threshold)
    }
}

impl FaceRecognizer for EigenFaceRecognizer {
    fn kind(&self) -> ModelKind {
        ModelKind::Eigenfaces
    }

    fn train(&mut self, samples: &[GrayImage], labels: &[i32]) -> Result<()> {
        let _timing = timing_guard("visage_core::eigenfaces::train", Level::Debug);
        let (data, size) = stack_samples(samples, labels)?;
        let pca = Pca::compute(&data, self.components).context("eigenfaces training failed")?;
        debug!(
            "eigenfaces: {} samples of {}x{}, {} components kept",
            samples.len(),
            size.0,
            size.1,
            pca.components()
        );
        self.model = Some(Subspace::build(
            size,
            &data,
            pca.mean,
            pca.basis,
            pca.eigenvalues,
            labels,
        ));
        Ok(())
    }

    fn predict(&self, sample: &GrayImage) -> Result<Prediction> {
        let model = self
            .model
            .as_ref()
            .context("eigenfaces recognizer is not trained")?;
        model.nearest(sample, self.threshold)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .context("cannot save an untrained eigenfaces recognizer")?;
        save_model(path, self.kind(), self.components, self.threshold, model)
    }

    fn load(path: &Path) -> Result<Self> {
        let stored = load_model(path, ModelKind::Eigenfaces)?;
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
