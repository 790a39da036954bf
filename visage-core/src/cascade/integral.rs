//! Summed-area tables used for constant-time feature evaluation.

use image::GrayImage;
use imageproc::integral_image::{integral_image, integral_squared_image};

/// Plain, squared and 45-degree tilted integrals of one grayscale image.
///
/// Every table is `(width + 1) x (height + 1)` with a zero first row and column, so the sum of
/// the pixels in `[x, x + w) x [y, y + h)` is four lookups.
#[derive(Debug, Clone)]
pub struct IntegralImages {
    width: usize,
    height: usize,
    sum: Vec<i64>,
    sqsum: Vec<i64>,
    tilted: Option<Vec<i64>>,
}

impl IntegralImages {
    pub fn new(image: &GrayImage, with_tilted: bool) -> Self {
        let (w, h) = image.dimensions();
        let sum = integral_image::<_, u32>(image)
            .into_raw()
            .into_iter()
            .map(i64::from)
            .collect();
        let sqsum = integral_squared_image::<_, u64>(image)
            .into_raw()
            .into_iter()
            .map(|v| v as i64)
            .collect();
        let tilted = with_tilted.then(|| tilted_integral(image));
        Self {
            width: w as usize,
            height: h as usize,
            sum,
            sqsum,
            tilted,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    fn stride(&self) -> usize {
        self.width + 1
    }

    #[inline]
    fn box_sum(table: &[i64], stride: usize, x: usize, y: usize, w: usize, h: usize) -> i64 {
        let top = y * stride;
        let bottom = (y + h) * stride;
        table[bottom + x + w] - table[bottom + x] - table[top + x + w] + table[top + x]
    }

    /// Pixel sum over an upright rectangle.
    #[inline]
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        Self::box_sum(&self.sum, self.stride(), x, y, w, h)
    }

    /// Sum of squared pixels over an upright rectangle.
    #[inline]
    pub fn rect_sqsum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        Self::box_sum(&self.sqsum, self.stride(), x, y, w, h)
    }

    /// Pixel sum over a rectangle rotated by 45 degrees.
    ///
    /// `(x, y)` is the top corner; `w` runs down-right and `h` runs down-left. Requires
    /// `x >= h`, `x + w <= width` and `y + w + h <= height`.
    #[inline]
    pub fn tilted_sum(&self, x: usize, y: usize, w: usize, h: usize) -> i64 {
        let Some(t) = self.tilted.as_deref() else {
            return 0;
        };
        let stride = self.stride();
        let p0 = t[y * stride + x];
        let p1 = t[(y + h) * stride + x - h];
        let p2 = t[(y + w) * stride + x + w];
        let p3 = t[(y + w + h) * stride + x + w - h];
        p0 - p1 - p2 + p3
    }
}

/// `T(X, Y)` holds the sum of pixels `(x, y)` with `y < Y` and `|x - X + 1| <= Y - y - 1`,
/// the triangle whose apex sits at `(X - 1, Y - 1)`.
///
/// Built with `T(X,Y) = T(X-1,Y-1) + T(X+1,Y-1) - T(X,Y-2) + I(X-1,Y-1) + I(X-1,Y-2)` on a
/// grid padded by `height + 1` columns on both sides, then cropped to `0..=width`.
fn tilted_integral(image: &GrayImage) -> Vec<i64> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let pad = h + 1;
    let ext_w = (w + 1 + 2 * pad) as usize;
    let rows = (h + 1) as usize;
    let raw = image.as_raw();

    let pixel = |x: i64, y: i64| -> i64 {
        if x < 0 || y < 0 || x >= w || y >= h {
            0
        } else {
            raw[(y * w + x) as usize] as i64
        }
    };

    let mut ext = vec![0i64; ext_w * rows];
    let at = |ext: &[i64], col: i64, row: i64| -> i64 {
        if row < 0 || col < 0 || col >= ext_w as i64 {
            0
        } else {
            ext[row as usize * ext_w + col as usize]
        }
    };

    for row in 1..rows as i64 {
        for col in 0..ext_w as i64 {
            let x = col - pad;
            let value = at(&ext, col - 1, row - 1) + at(&ext, col + 1, row - 1)
                - at(&ext, col, row - 2)
                + pixel(x - 1, row - 1)
                + pixel(x - 1, row - 2);
            ext[row as usize * ext_w + col as usize] = value;
        }
    }

    let stride = (w + 1) as usize;
    let mut out = vec![0i64; stride * rows];
    for row in 0..rows {
        let src = row * ext_w + pad as usize;
        out[row * stride..(row + 1) * stride].copy_from_slice(&ext[src..src + stride]);
    }
    out
}
