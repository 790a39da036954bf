//! Haar and LBP feature definitions and their per-window evaluation.

use anyhow::{Context, Result, bail, ensure};

use super::integral::IntegralImages;
use super::xml::XmlNode;

/// One weighted rectangle of a Haar feature, in window coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct WeightedRect {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HaarFeature {
    pub rects: Vec<WeightedRect>,
    pub tilted: bool,
}

impl HaarFeature {
    /// Apply the weighting of `opencv-haar-classifier` files.
    ///
    /// Tilted rectangles count half, and the first rectangle's weight is recomputed from the
    /// others so that a flat window scores zero.
    pub fn scale_legacy_weights(&mut self) {
        let factor = if self.tilted { 0.5 } else { 1.0 };
        for rect in &mut self.rects {
            rect.weight *= factor;
        }
        let area = |r: &WeightedRect| (r.w * r.h) as f64;
        let Some((first, rest)) = self.rects.split_first_mut() else {
            return;
        };
        let balance: f64 = rest.iter().map(|r| r.weight * area(r)).sum();
        let first_area = area(first);
        if first_area > 0.0 {
            first.weight = -balance / first_area;
        }
    }
}

/// 3x3 grid of `w x h` blocks anchored at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LbpFeature {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FeatureSet {
    Haar(Vec<HaarFeature>),
    Lbp(Vec<LbpFeature>),
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        match self {
            FeatureSet::Haar(f) => f.len(),
            FeatureSet::Lbp(f) => f.len(),
        }
    }

    pub fn uses_tilted(&self) -> bool {
        matches!(self, FeatureSet::Haar(f) if f.iter().any(|feat| feat.tilted))
    }
}

pub(crate) fn to_index(value: f64, what: &str) -> Result<usize> {
    ensure!(
        value >= 0.0 && value.fract() == 0.0,
        "{what} must be a non-negative integer, got {value}"
    );
    Ok(value as usize)
}

pub(crate) fn parse_haar_features(
    features: &XmlNode,
    win_w: usize,
    win_h: usize,
) -> Result<Vec<HaarFeature>> {
    features
        .items()
        .enumerate()
        .map(|(idx, node)| {
            parse_haar_feature(node, win_w, win_h).with_context(|| format!("feature {idx}"))
        })
        .collect()
}

pub(crate) fn parse_haar_feature(
    node: &XmlNode,
    win_w: usize,
    win_h: usize,
) -> Result<HaarFeature> {
    let tilted = match node.child("tilted") {
        Some(t) => t.parse_number::<i32>()? != 0,
        None => false,
    };

    let mut rects = Vec::new();
    for item in node.require("rects")?.items() {
        let values = item.parse_list()?;
        ensure!(
            values.len() == 5,
            "a Haar rectangle needs 'x y w h weight', got {} values",
            values.len()
        );
        let rect = WeightedRect {
            x: to_index(values[0], "rect x")?,
            y: to_index(values[1], "rect y")?,
            w: to_index(values[2], "rect width")?,
            h: to_index(values[3], "rect height")?,
            weight: values[4],
        };
        let fits = if tilted {
            rect.x >= rect.h && rect.x + rect.w <= win_w && rect.y + rect.w + rect.h <= win_h
        } else {
            rect.x + rect.w <= win_w && rect.y + rect.h <= win_h
        };
        ensure!(fits, "rectangle {:?} falls outside the {win_w}x{win_h} window", rect);
        rects.push(rect);
    }
    ensure!(
        (1..=3).contains(&rects.len()),
        "a Haar feature needs one to three rectangles, got {}",
        rects.len()
    );
    Ok(HaarFeature { rects, tilted })
}

pub(crate) fn parse_lbp_features(
    features: &XmlNode,
    win_w: usize,
    win_h: usize,
) -> Result<Vec<LbpFeature>> {
    let mut out = Vec::new();
    for (idx, node) in features.items().enumerate() {
        let values = node
            .require("rect")
            .and_then(XmlNode::parse_list)
            .with_context(|| format!("feature {idx}"))?;
        if values.len() != 4 {
            bail!("feature {idx}: an LBP rectangle needs 'x y w h'");
        }
        let feature = LbpFeature {
            x: to_index(values[0], "rect x")?,
            y: to_index(values[1], "rect y")?,
            w: to_index(values[2], "rect width")?,
            h: to_index(values[3], "rect height")?,
        };
        ensure!(
            feature.x + 3 * feature.w <= win_w && feature.y + 3 * feature.h <= win_h,
            "feature {idx}: LBP block grid falls outside the {win_w}x{win_h} window"
        );
        out.push(feature);
    }
    Ok(out)
}

/// Integral images positioned at one detection window.
pub(crate) struct Window<'a> {
    pub integral: &'a IntegralImages,
    pub x: usize,
    pub y: usize,
    /// Reciprocal of the window's pixel standard deviation times its area.
    pub inv_norm: f64,
}

impl<'a> Window<'a> {
    /// Position a window and compute its variance normalization over the inner
    /// `(1, 1, w - 2, h - 2)` rectangle.
    pub fn new(
        integral: &'a IntegralImages,
        x: usize,
        y: usize,
        win_w: usize,
        win_h: usize,
    ) -> Self {
        let (nw, nh) = (win_w.saturating_sub(2), win_h.saturating_sub(2));
        let area = (nw * nh) as f64;
        let sum = integral.rect_sum(x + 1, y + 1, nw, nh) as f64;
        let sqsum = integral.rect_sqsum(x + 1, y + 1, nw, nh) as f64;
        let variance = area * sqsum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };
        Self {
            integral,
            x,
            y,
            inv_norm: 1.0 / norm,
        }
    }

    pub fn haar(&self, feature: &HaarFeature) -> f64 {
        let raw: f64 = feature
            .rects
            .iter()
            .map(|r| {
                let sum = if feature.tilted {
                    self.integral.tilted_sum(self.x + r.x, self.y + r.y, r.w, r.h)
                } else {
                    self.integral.rect_sum(self.x + r.x, self.y + r.y, r.w, r.h)
                };
                r.weight * sum as f64
            })
            .sum();
        raw * self.inv_norm
    }

    /// 8-bit local binary pattern code comparing the eight outer blocks with the centre one.
    pub fn lbp(&self, feature: &LbpFeature) -> u8 {
        let block = |col: usize, row: usize| {
            self.integral.rect_sum(
                self.x + feature.x + col * feature.w,
                self.y + feature.y + row * feature.h,
                feature.w,
                feature.h,
            )
        };
        let center = block(1, 1);
        // Clockwise from the top-left block, most significant bit first.
        const ORDER: [(usize, usize); 8] = [
            (0, 0),
            (1, 0),
            (2, 0),
            (2, 1),
            (2, 2),
            (1, 2),
            (0, 2),
            (0, 1),
        ];
        ORDER.iter().enumerate().fold(0u8, |code, (bit, &(col, row))| {
            if block(col, row) >= center {
                code | (0x80 >> bit)
            } else {
                code
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::xml::parse_document;
    use image::{GrayImage, Luma};

    #[test]
    fn rejects_rect_outside_window() {
        let doc = parse_document(
            "<features><_><rects><_>20 0 10 4 -1.</_></rects><tilted>0</tilted></_></features>",
        )
        .unwrap();
        assert!(parse_haar_features(&doc, 24, 24).is_err());
    }

    #[test]
    fn haar_value_is_variance_normalized() {
        // Left half 0, right half 200.
        let image = GrayImage::from_fn(6, 6, |x, _| Luma([if x < 3 { 0 } else { 200 }]));
        let integral = IntegralImages::new(&image, false);
        let feature = HaarFeature {
            rects: vec![WeightedRect {
                x: 3,
                y: 0,
                w: 3,
                h: 6,
                weight: 1.0,
            }],
            tilted: false,
        };
        let window = Window::new(&integral, 0, 0, 6, 6);
        // Inner 4x4: eight pixels at 0, eight at 200.
        let (area, sum, sq) = (16.0f64, 1600.0f64, 8.0 * 40_000.0);
        let norm = (area * sq - sum * sum).sqrt();
        assert!((window.haar(&feature) - 3600.0 / norm).abs() < 1e-12);
    }

    #[test]
    fn legacy_weights_balance_first_rect() {
        let rect = |x, y, w, h, weight| WeightedRect { x, y, w, h, weight };
        let mut upright = HaarFeature {
            rects: vec![rect(0, 0, 4, 4, -3.0), rect(0, 0, 2, 4, 2.0)],
            tilted: false,
        };
        upright.scale_legacy_weights();
        assert_eq!(upright.rects[0].weight, -1.0);
        assert_eq!(upright.rects[1].weight, 2.0);

        let mut tilted = HaarFeature {
            rects: vec![rect(4, 0, 4, 4, -1.0), rect(4, 2, 2, 2, 4.0)],
            tilted: true,
        };
        tilted.scale_legacy_weights();
        assert_eq!(tilted.rects[0].weight, -0.5);
        assert_eq!(tilted.rects[1].weight, 2.0);
    }

    #[test]
    fn flat_window_uses_unit_norm() {
        let image = GrayImage::from_pixel(6, 6, Luma([10]));
        let integral = IntegralImages::new(&image, false);
        let window = Window::new(&integral, 0, 0, 6, 6);
        assert_eq!(window.inv_norm, 1.0);
    }

    #[test]
    fn lbp_code_orders_bits_clockwise() {
        // 3x3 image, one pixel per block; only the top-middle and left-middle blocks are bright.
        let mut image = GrayImage::from_pixel(3, 3, Luma([50]));
        for (x, y) in [(0, 0), (2, 0), (2, 1), (2, 2), (1, 2), (0, 2)] {
            image.put_pixel(x, y, Luma([10]));
        }
        image.put_pixel(1, 0, Luma([90]));
        image.put_pixel(0, 1, Luma([90]));
        let integral = IntegralImages::new(&image, false);
        let window = Window::new(&integral, 0, 0, 3, 3);
        let feature = LbpFeature {
            x: 0,
            y: 0,
            w: 1,
            h: 1,
        };
        assert_eq!(window.lbp(&feature), 64 | 1);
    }
}
