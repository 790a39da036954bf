use std::cmp::Ordering;

use anyhow::{Result, anyhow, bail};
use tract_onnx::prelude::{Tensor, tract_ndarray::ArrayView2};
use visage_utils::config::DetectorSettings;

use super::model::ROW_LEN;
use crate::geometry::Rect;

/// Score filtering and suppression settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.9,
            nms_threshold: 0.3,
            top_k: 5_000,
        }
    }
}

impl From<&DetectorSettings> for PostprocessConfig {
    fn from(settings: &DetectorSettings) -> Self {
        Self {
            score_threshold: settings.score_threshold,
            nms_threshold: settings.nms_threshold,
            top_k: settings.top_k,
        }
    }
}

/// Floating point face box with its confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl ScoredBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn iou(&self, other: &Self) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(
            self.x.round() as i32,
            self.y.round() as i32,
            self.width.round() as i32,
            self.height.round() as i32,
        )
    }
}

fn rows_view(output: &Tensor) -> Result<ArrayView2<'_, f32>> {
    let rows = match output.shape() {
        [rows, cols] if *cols == ROW_LEN => *rows,
        [1, rows, cols] if *cols == ROW_LEN => *rows,
        other => bail!("YuNet output must be [N, {ROW_LEN}] or [1, N, {ROW_LEN}], got {other:?}"),
    };
    let slice = output
        .as_slice::<f32>()
        .map_err(|e| anyhow!("YuNet output is not f32: {e}"))?;
    ArrayView2::from_shape((rows, ROW_LEN), slice)
        .map_err(|_| anyhow!("YuNet output data is not contiguous"))
}

/// Keep confident rows, rescale them to source pixels, then suppress overlaps.
pub fn apply_postprocess(
    output: &Tensor,
    scale_x: f32,
    scale_y: f32,
    config: &PostprocessConfig,
) -> Result<Vec<ScoredBox>> {
    let rows = rows_view(output)?;
    let mut boxes: Vec<ScoredBox> = rows
        .rows()
        .into_iter()
        .filter_map(|row| {
            let score = row[14];
            if !score.is_finite() || score < config.score_threshold {
                return None;
            }
            let b = ScoredBox {
                x: row[0] * scale_x,
                y: row[1] * scale_y,
                width: row[2] * scale_x,
                height: row[3] * scale_y,
                score,
            };
            (b.width > 0.0 && b.height > 0.0).then_some(b)
        })
        .collect();

    boxes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    if config.top_k > 0 {
        boxes.truncate(config.top_k);
    }
    if config.nms_threshold > 0.0 {
        let mut kept: Vec<ScoredBox> = Vec::with_capacity(boxes.len());
        for candidate in boxes {
            if kept.iter().all(|k| candidate.iou(k) <= config.nms_threshold) {
                kept.push(candidate);
            }
        }
        boxes = kept;
    }
    Ok(boxes)
}
