//! Turning detected faces into fixed-size grayscale samples.

use anyhow::Result;
use image::{DynamicImage, GrayImage, imageops};
use log::trace;
use visage_utils::{config::FaceSettings, equalize_histogram, resize_gray, to_grayscale};

use crate::detector::FaceDetector;
use crate::region::FaceRegion;

/// Equalized grayscale copy of a colour frame, as fed to the detector.
pub fn detection_frame(color: &DynamicImage) -> GrayImage {
    equalize_histogram(&to_grayscale(color))
}

/// Detect the face in a training photo and normalize it.
///
/// When several faces are found the last one is used. The crop is taken from the colour image,
/// then converted to gray, resized to the sample size and equalized. `Ok(None)` means no usable
/// face.
pub fn prepare_training_sample(
    color: &DynamicImage,
    detector: &dyn FaceDetector,
    face: &FaceSettings,
) -> Result<Option<GrayImage>> {
    let equalized = detection_frame(color);
    let Some(bbox) = detector.detect(&equalized)?.last().copied() else {
        return Ok(None);
    };
    let region = FaceRegion::from_bbox(bbox);
    let Some(crop) = region.clamped_crop_rect(face.crop_inset, color.width(), color.height())
    else {
        trace!("face region {region:?} lies outside the image");
        return Ok(None);
    };

    let cropped = color.crop_imm(
        crop.x as u32,
        crop.y as u32,
        crop.width as u32,
        crop.height as u32,
    );
    let gray = resize_gray(&to_grayscale(&cropped), face.sample_width, face.sample_height);
    Ok(Some(equalize_histogram(&gray)))
}

/// Cut a query sample out of an already-equalized frame.
pub fn prepare_query_sample(
    equalized: &GrayImage,
    region: &FaceRegion,
    face: &FaceSettings,
) -> Option<GrayImage> {
    let crop = region.clamped_crop_rect(face.crop_inset, equalized.width(), equalized.height())?;
    let view = imageops::crop_imm(
        equalized,
        crop.x as u32,
        crop.y as u32,
        crop.width as u32,
        crop.height as u32,
    )
    .to_image();
    Some(resize_gray(&view, face.sample_width, face.sample_height))
}
