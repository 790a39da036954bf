//! YuNet face detection through `tract-onnx`, as an alternative to cascades.

pub mod model;
pub mod postprocess;

use std::path::Path;

use anyhow::{Result, anyhow, ensure};
use image::{DynamicImage, GrayImage, imageops::FilterType};
use tract_onnx::prelude::Tensor;
use visage_utils::{compute_resize_scales, config::DetectorSettings, rgb_to_bgr_chw, timing_guard};

pub use model::YuNetModel;
pub use postprocess::{PostprocessConfig, ScoredBox, apply_postprocess};

/// Network input plus the factors that map its coordinates back to the frame.
#[derive(Debug)]
pub struct Prepared {
    pub tensor: Tensor,
    pub scale_x: f32,
    pub scale_y: f32,
}

/// Resize a grayscale frame to the network input and lay it out as a `[1, 3, H, W]` BGR tensor.
///
/// The gray channel is replicated into all three colour planes.
pub fn prepare_gray(image: &GrayImage, input: (u32, u32)) -> Result<Prepared> {
    let (in_w, in_h) = input;
    ensure!(in_w > 0 && in_h > 0, "input dimensions must be greater than zero");
    let (w, h) = image.dimensions();
    ensure!(w > 0 && h > 0, "frame dimensions must be greater than zero");

    let rgb = DynamicImage::ImageLuma8(image.clone())
        .resize_exact(in_w, in_h, FilterType::Triangle)
        .to_rgb8();
    let (data, offset) = rgb_to_bgr_chw(&rgb).into_raw_vec_and_offset();
    debug_assert_eq!(offset, Some(0));
    let tensor = Tensor::from_shape(&[1, 3, in_h as usize, in_w as usize], &data)
        .map_err(|e| anyhow!("failed to build input tensor: {e}"))?;
    let (scale_x, scale_y) = compute_resize_scales((w, h), input)?;
    Ok(Prepared {
        tensor,
        scale_x,
        scale_y,
    })
}

/// Model plus post-processing settings.
#[derive(Debug)]
pub struct YuNetDetector {
    model: YuNetModel,
    postprocess: PostprocessConfig,
}

impl YuNetDetector {
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input: (u32, u32),
        postprocess: PostprocessConfig,
    ) -> Result<Self> {
        Ok(Self {
            model: YuNetModel::load(model_path, input)?,
            postprocess,
        })
    }

    pub fn from_settings(settings: &DetectorSettings) -> Result<Self> {
        Self::new(
            &settings.yunet_model_path,
            (settings.yunet_input_width, settings.yunet_input_height),
            settings.into(),
        )
    }

    /// Face boxes in frame pixels, best score first.
    pub fn detect(&self, image: &GrayImage) -> Result<Vec<ScoredBox>> {
        let _guard = timing_guard("visage_core::yunet::detect", log::Level::Debug);
        let prepared = prepare_gray(image, self.model.input_size())?;
        let raw = self.model.run(prepared.tensor)?;
        apply_postprocess(&raw, prepared.scale_x, prepared.scale_y, &self.postprocess)
    }
}
