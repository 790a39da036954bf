//! The face detector seam used by both pipelines.

use anyhow::Result;
use image::GrayImage;
use log::info;
use visage_utils::config::{DetectorBackend, DetectorSettings};

use crate::cascade::{CascadeClassifier, CascadeParams};
use crate::error::VisageError;
use crate::geometry::Rect;
use crate::yunet::YuNetDetector;

/// Finds face bounding boxes in a grayscale, histogram-equalized frame.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &GrayImage) -> Result<Vec<Rect>>;
}

/// Cascade classifier run with fixed multi-scale parameters.
#[derive(Debug, Clone)]
pub struct CascadeDetector {
    classifier: CascadeClassifier,
    params: CascadeParams,
}

impl CascadeDetector {
    pub fn new(classifier: CascadeClassifier, params: CascadeParams) -> Self {
        Self { classifier, params }
    }

    pub fn params(&self) -> &CascadeParams {
        &self.params
    }
}

impl FaceDetector for CascadeDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<Rect>> {
        self.classifier.detect_multi_scale(image, &self.params)
    }
}

/// YuNet boxes, optionally reduced to the largest one.
#[derive(Debug)]
pub struct YuNetFaceDetector {
    inner: YuNetDetector,
    min_size: u32,
    find_biggest: bool,
}

impl FaceDetector for YuNetFaceDetector {
    fn detect(&self, image: &GrayImage) -> Result<Vec<Rect>> {
        let mut rects: Vec<Rect> = self
            .inner
            .detect(image)?
            .iter()
            .map(|b| b.to_rect())
            .filter(|r| r.width >= self.min_size as i32 && r.height >= self.min_size as i32)
            .collect();
        if self.find_biggest
            && let Some(best) = rects.iter().copied().max_by_key(|r| r.area())
        {
            rects = vec![best];
        }
        Ok(rects)
    }
}

/// Build the detector selected by `settings.backend`.
///
/// Failing to load the cascade or the YuNet model is reported as [`VisageError::CascadeLoad`].
pub fn build_detector(settings: &DetectorSettings) -> Result<Box<dyn FaceDetector>> {
    match settings.backend {
        DetectorBackend::Cascade => {
            let classifier = CascadeClassifier::load(&settings.cascade_path)?;
            info!("using cascade detector {}", settings.cascade_path);
            Ok(Box::new(CascadeDetector::new(classifier, settings.into())))
        }
        DetectorBackend::Yunet => {
            let inner = YuNetDetector::from_settings(settings)
                .map_err(|e| VisageError::cascade_load(&settings.yunet_model_path, e))?;
            info!("using YuNet detector {}", settings.yunet_model_path);
            Ok(Box::new(YuNetFaceDetector {
                inner,
                min_size: settings.min_size,
                find_biggest: settings.find_biggest,
            }))
        }
    }
}
