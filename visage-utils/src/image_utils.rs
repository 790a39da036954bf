use std::path::Path;

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, RgbImage, imageops::FilterType};
use ndarray::Array3;

/// Load an image from disk into memory.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path_ref = path.as_ref();
    image::open(path_ref).with_context(|| format!("failed to open image {}", path_ref.display()))
}

/// Convert any image to 8-bit luma.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Histogram-equalize a grayscale image.
///
/// The lowest occupied intensity maps to 0 and the cumulative distribution is stretched across
/// the full 0..=255 range. Images with a single intensity are returned unchanged.
pub fn equalize_histogram(image: &GrayImage) -> GrayImage {
    let mut hist = [0u32; 256];
    for pixel in image.as_raw() {
        hist[*pixel as usize] += 1;
    }
    let lut = build_equalization_lut(&hist, image.as_raw().len() as u32);

    let mut out = image.clone();
    for pixel in out.iter_mut() {
        *pixel = lut[*pixel as usize];
    }
    out
}

fn identity_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, item) in lut.iter_mut().enumerate() {
        *item = i as u8;
    }
    lut
}

fn build_equalization_lut(hist: &[u32; 256], total: u32) -> [u8; 256] {
    if total == 0 {
        return identity_lut();
    }

    let mut cdf = [0u32; 256];
    let mut cumulative = 0u32;
    let mut cdf_min = None;
    for (idx, count) in hist.iter().enumerate() {
        cumulative += *count;
        cdf[idx] = cumulative;
        if cdf_min.is_none() && *count > 0 {
            cdf_min = Some(cumulative);
        }
    }

    let Some(cdf_min) = cdf_min else {
        return identity_lut();
    };
    if cdf_min == total {
        return identity_lut();
    }

    let denom = (total - cdf_min) as f64;
    let mut lut = [0u8; 256];
    for (slot, cdf_val) in lut.iter_mut().zip(cdf.iter()) {
        let numerator = cdf_val.saturating_sub(cdf_min) as f64;
        *slot = (numerator / denom * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Resize a grayscale image to exactly `width` x `height` with bilinear filtering.
pub fn resize_gray(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

/// Flatten a grayscale image row by row into `f64` intensities.
pub fn gray_to_vector(image: &GrayImage) -> Vec<f64> {
    image.as_raw().iter().map(|&v| v as f64).collect()
}

/// Convert an RGB image into a BGR CHW array with values matching OpenCV's `blobFromImage`.
pub fn rgb_to_bgr_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut array = Array3::<f32>::zeros((3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        array[(0, yi, xi)] = pixel[2] as f32;
        array[(1, yi, xi)] = pixel[1] as f32;
        array[(2, yi, xi)] = pixel[0] as f32;
    }
    array
}

/// Scale factors that map coordinates from a resized image back to the original.
pub fn compute_resize_scales(original: (u32, u32), target: (u32, u32)) -> Result<(f32, f32)> {
    let (orig_w, orig_h) = original;
    let (target_w, target_h) = target;
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "target dimensions must be non-zero"
    );
    anyhow::ensure!(
        orig_w > 0 && orig_h > 0,
        "original dimensions must be non-zero"
    );
    Ok((
        orig_w as f32 / target_w as f32,
        orig_h as f32 / target_h as f32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn equalize_stretches_narrow_range() {
        let mut image = GrayImage::new(4, 1);
        image.put_pixel(0, 0, Luma([100]));
        image.put_pixel(1, 0, Luma([101]));
        image.put_pixel(2, 0, Luma([102]));
        image.put_pixel(3, 0, Luma([103]));

        let out = equalize_histogram(&image);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 0)[0], 85);
        assert_eq!(out.get_pixel(2, 0)[0], 170);
        assert_eq!(out.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn equalize_leaves_uniform_image_unchanged() {
        let image = GrayImage::from_pixel(8, 8, Luma([77]));
        assert_eq!(equalize_histogram(&image), image);
    }

    #[test]
    fn equalize_handles_empty_image() {
        let image = GrayImage::new(0, 0);
        assert_eq!(equalize_histogram(&image).dimensions(), (0, 0));
    }

    #[test]
    fn resize_gray_hits_exact_dimensions() {
        let image = GrayImage::from_pixel(17, 9, Luma([10]));
        let out = resize_gray(&image, 240, 280);
        assert_eq!(out.dimensions(), (240, 280));
        assert!(out.pixels().all(|p| p[0] == 10));
    }

    #[test]
    fn gray_to_vector_is_row_major() {
        let mut image = GrayImage::new(2, 2);
        image.put_pixel(1, 0, Luma([5]));
        image.put_pixel(0, 1, Luma([9]));
        assert_eq!(gray_to_vector(&image), vec![0.0, 5.0, 9.0, 0.0]);
    }

    #[test]
    fn to_grayscale_uses_luma() {
        let rgb = RgbImage::from_pixel(1, 1, image::Rgb([255, 255, 255]));
        let gray = to_grayscale(&DynamicImage::ImageRgb8(rgb));
        assert_eq!(gray.get_pixel(0, 0)[0], 255);
    }

    #[test]
    fn rgb_to_bgr_chw_swaps_channels() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, image::Rgb([0, 128, 255]));
        let array = rgb_to_bgr_chw(&image);
        assert_eq!(array.shape(), &[3, 1, 2]);
        assert_eq!(array[(0, 0, 0)], 255.0);
        assert_eq!(array[(1, 0, 0)], 128.0);
        assert_eq!(array[(2, 0, 0)], 0.0);
    }

    #[test]
    fn compute_resize_scales_rejects_zero() {
        assert_eq!(
            compute_resize_scales((640, 480), (320, 240)).expect("scales"),
            (2.0, 2.0)
        );
        assert!(compute_resize_scales((0, 480), (320, 240)).is_err());
        assert!(compute_resize_scales((640, 480), (0, 240)).is_err());
    }
}
