//! Face circle and crop arithmetic shared by training and recognition.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Circle enclosing a detected face, plus the crop derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub center: (i32, i32),
    pub radius: i32,
}

impl FaceRegion {
    /// Circle centred on the box with a radius of a quarter of `width + height`.
    ///
    /// Halves round to even, so a 5x5 box at the origin gives centre `(2, 2)` and radius 2.
    pub fn from_bbox(rect: Rect) -> Self {
        let cx = (rect.x as f64 + rect.width as f64 * 0.5).round_ties_even() as i32;
        let cy = (rect.y as f64 + rect.height as f64 * 0.5).round_ties_even() as i32;
        let radius = ((rect.width + rect.height) as f64 * 0.25).round_ties_even() as i32;
        Self {
            center: (cx, cy),
            radius,
        }
    }

    /// Square around the circle, narrowed by `inset` on the left and right.
    pub fn crop_rect(&self, inset: i32) -> Rect {
        let (cx, cy) = self.center;
        let r = self.radius;
        Rect::new(cx - r + inset, cy - r, 2 * r - 2 * inset, 2 * r)
    }

    /// [`crop_rect`](Self::crop_rect) clipped to an image; `None` when nothing is left.
    pub fn clamped_crop_rect(&self, inset: i32, width: u32, height: u32) -> Option<Rect> {
        self.crop_rect(inset).clamp_to(width, height)
    }
}
