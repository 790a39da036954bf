//! Eigenface and Fisherface recognizers.
//!
//! Both project normalized face samples into a learned subspace and classify a query by its
//! nearest training projection. A match only counts when its distance is below the
//! recognizer's threshold.

mod eigen;
mod fisher;
pub mod lda;
pub mod linalg;
pub mod pca;
mod storage;

use std::path::Path;

use anyhow::{Result, bail, ensure};
use image::GrayImage;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

pub use eigen::EigenFaceRecognizer;
pub use fisher::FisherFaceRecognizer;
pub use lda::Lda;
pub use pca::Pca;

/// Which algorithm produced a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Eigenfaces,
    Fisherfaces,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ModelKind::Eigenfaces => "eigenfaces",
            ModelKind::Fisherfaces => "fisherfaces",
        })
    }
}

/// Outcome of classifying one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Label of the nearest training sample, when it lies within the threshold.
    pub label: Option<i32>,
    /// Distance to the nearest training sample in the projected space.
    pub distance: f64,
}

/// Common interface of the subspace recognizers.
pub trait FaceRecognizer {
    fn kind(&self) -> ModelKind;

    /// Learn from equally sized grayscale samples and their labels.
    fn train(&mut self, samples: &[GrayImage], labels: &[i32]) -> Result<()>;

    fn predict(&self, sample: &GrayImage) -> Result<Prediction>;

    fn save(&self, path: &Path) -> Result<()>;

    fn load(path: &Path) -> Result<Self>
    where
        Self: Sized;

    fn threshold(&self) -> f64;

    fn set_threshold(&mut self, threshold: f64);

    fn is_trained(&self) -> bool;
}

/// A trained projection: mean, basis and the projected training set.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Subspace {
    pub size: (u32, u32),
    pub mean: Array1<f64>,
    /// `pixels x components`.
    pub basis: Array2<f64>,
    pub eigenvalues: Array1<f64>,
    pub projections: Vec<Array1<f64>>,
    pub labels: Vec<i32>,
}

impl Subspace {
    pub fn build(
        size: (u32, u32),
        data: &Array2<f64>,
        mean: Array1<f64>,
        basis: Array2<f64>,
        eigenvalues: Array1<f64>,
        labels: &[i32],
    ) -> Self {
        let projections = data
            .rows()
            .into_iter()
            .map(|row| pca::project(&basis, mean.view(), row))
            .collect();
        Self {
            size,
            mean,
            basis,
            eigenvalues,
            projections,
            labels: labels.to_vec(),
        }
    }

    pub fn components(&self) -> usize {
        self.basis.ncols()
    }

    /// Nearest training projection to `sample`.
    pub fn nearest(&self, sample: &GrayImage, threshold: f64) -> Result<Prediction> {
        let vector = sample_vector(sample, self.size)?;
        let query = pca::project(&self.basis, self.mean.view(), vector.view());

        let mut best: Option<(usize, f64)> = None;
        for (idx, proj) in self.projections.iter().enumerate() {
            let dist = (proj - &query).mapv(|v| v * v).sum().sqrt();
            if best.is_none_or(|(_, d)| dist < d) {
                best = Some((idx, dist));
            }
        }
        let Some((idx, distance)) = best else {
            bail!("model holds no training projections");
        };
        Ok(Prediction {
            label: (distance < threshold).then(|| self.labels[idx]),
            distance,
        })
    }
}

/// Flatten samples into a `samples x pixels` matrix after checking their shapes.
pub(crate) fn stack_samples(
    samples: &[GrayImage],
    labels: &[i32],
) -> Result<(Array2<f64>, (u32, u32))> {
    ensure!(!samples.is_empty(), "no training samples given");
    ensure!(
        samples.len() == labels.len(),
        "{} samples but {} labels",
        samples.len(),
        labels.len()
    );
    let size = samples[0].dimensions();
    ensure!(size.0 > 0 && size.1 > 0, "training samples are empty images");
    let pixels = size.0 as usize * size.1 as usize;

    let mut data = Array2::<f64>::zeros((samples.len(), pixels));
    for (i, (sample, mut row)) in samples.iter().zip(data.rows_mut()).enumerate() {
        ensure!(
            sample.dimensions() == size,
            "sample {i} is {}x{}, expected {}x{}",
            sample.width(),
            sample.height(),
            size.0,
            size.1
        );
        for (dst, &src) in row.iter_mut().zip(sample.as_raw()) {
            *dst = src as f64;
        }
    }
    Ok((data, size))
}

fn sample_vector(sample: &GrayImage, size: (u32, u32)) -> Result<Array1<f64>> {
    ensure!(
        sample.dimensions() == size,
        "query is {}x{}, model expects {}x{}",
        sample.width(),
        sample.height(),
        size.0,
        size.1
    );
    Ok(Array1::from(visage_utils::gray_to_vector(sample)))
}
