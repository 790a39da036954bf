//! Classifying the faces found in live frames.

use std::path::Path;

use anyhow::Result;
use image::{DynamicImage, GrayImage};
use log::{Level, debug};
use serde::Serialize;
use visage_utils::{config::FaceSettings, timing_guard};

use crate::{
    detector::FaceDetector,
    geometry::Rect,
    recognizer::{EigenFaceRecognizer, FaceRecognizer, FisherFaceRecognizer, Prediction},
    region::FaceRegion,
    sample::{detection_frame, prepare_query_sample},
};

/// Combined verdict for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "label", rename_all = "lowercase")]
pub enum Identity {
    Known(i32),
    Unknown,
}

impl Identity {
    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

/// Both recognizers' answers for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Identification {
    pub identity: Identity,
    pub eigen: Prediction,
    pub fisher: Prediction,
}

/// A detected face with its classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceObservation {
    pub bbox: Rect,
    pub region: FaceRegion,
    pub identification: Identification,
}

/// The pair of trained recognizers used at recognition time.
#[derive(Debug, Clone)]
pub struct FaceIdentifier {
    eigen: EigenFaceRecognizer,
    fisher: FisherFaceRecognizer,
}

impl FaceIdentifier {
    pub fn new(eigen: EigenFaceRecognizer, fisher: FisherFaceRecognizer) -> Self {
        Self { eigen, fisher }
    }

    /// Load both model files; failures are [`VisageError::ModelLoad`](crate::VisageError)
    /// or `InvalidModel`.
    pub fn load(eigen_path: &Path, fisher_path: &Path) -> Result<Self> {
        let eigen = EigenFaceRecognizer::load(eigen_path)?;
        let fisher = FisherFaceRecognizer::load(fisher_path)?;
        debug!(
            "loaded eigenfaces (threshold {}) and fisherfaces (threshold {})",
            eigen.threshold(),
            fisher.threshold()
        );
        Ok(Self { eigen, fisher })
    }

    pub fn eigen(&self) -> &EigenFaceRecognizer {
        &self.eigen
    }

    pub fn fisher(&self) -> &FisherFaceRecognizer {
        &self.fisher
    }

    /// Override the thresholds stored in the model files.
    pub fn set_thresholds(&mut self, eigen: Option<f64>, fisher: Option<f64>) {
        if let Some(t) = eigen {
            self.eigen.set_threshold(t);
        }
        if let Some(t) = fisher {
            self.fisher.set_threshold(t);
        }
    }

    /// Classify a normalized sample. The Eigenfaces label wins when both recognizers answer.
    pub fn identify(&self, sample: &GrayImage) -> Result<Identification> {
        let _timing = timing_guard("visage_core::recognition::identify", Level::Debug);
        let eigen = self.eigen.predict(sample)?;
        let fisher = self.fisher.predict(sample)?;
        debug!(
            "eigenfaces: label {:?} distance {:.1}; fisherfaces: label {:?} distance {:.1}",
            eigen.label, eigen.distance, fisher.label, fisher.distance
        );
        let identity = match eigen.label.or(fisher.label) {
            Some(label) => Identity::Known(label),
            None => Identity::Unknown,
        };
        Ok(Identification {
            identity,
            eigen,
            fisher,
        })
    }
}

/// Detect and classify every face in a colour frame.
///
/// Faces whose crop falls completely outside the frame are skipped.
pub fn analyze_frame(
    frame: &DynamicImage,
    detector: &dyn FaceDetector,
    identifier: &FaceIdentifier,
    face: &FaceSettings,
) -> Result<Vec<FaceObservation>> {
    let equalized = detection_frame(frame);
    let boxes = detector.detect(&equalized)?;

    let mut observations = Vec::with_capacity(boxes.len());
    for bbox in boxes {
        let region = FaceRegion::from_bbox(bbox);
        let Some(query) = prepare_query_sample(&equalized, &region, face) else {
            debug!("skipping face {bbox:?}: crop lies outside the frame");
            continue;
        };
        let identification = identifier.identify(&query)?;
        observations.push(FaceObservation {
            bbox,
            region,
            identification,
        });
    }
    Ok(observations)
}
