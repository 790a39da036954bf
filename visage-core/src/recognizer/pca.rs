use anyhow::{Result, ensure};
use ndarray::{Array1, Array2, ArrayView1, Axis};

use super::linalg::{normalize_columns, symmetric_eigen};

/// Eigenvalues below this fraction of the largest are treated as zero.
const RANK_EPS: f64 = 1e-10;

/// Principal component basis of a set of row samples.
#[derive(Debug, Clone)]
pub struct Pca {
    pub mean: Array1<f64>,
    /// `dims x components`, unit columns.
    pub basis: Array2<f64>,
    pub eigenvalues: Array1<f64>,
}

impl Pca {
    /// Compute the leading `components` principal directions of `data` (one sample per row).
    ///
    /// `0` or a count above what the data supports keeps every direction with a non-zero
    /// variance. With fewer samples than dimensions the eigenproblem is solved on the small
    /// `samples x samples` Gram matrix.
    pub fn compute(data: &Array2<f64>, components: usize) -> Result<Self> {
        let (n, d) = data.dim();
        ensure!(n > 0 && d > 0, "PCA needs at least one non-empty sample");

        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(d));
        let centered = data - &mean;

        let (values, mut vectors) = if n < d {
            let gram = centered.dot(&centered.t());
            let eig = symmetric_eigen(&gram)?;
            (eig.values, centered.t().dot(&eig.vectors))
        } else {
            let cov = centered.t().dot(&centered);
            let eig = symmetric_eigen(&cov)?;
            (eig.values, eig.vectors)
        };

        let largest = values.iter().copied().fold(0.0f64, f64::max);
        let available = values
            .iter()
            .take_while(|&&v| largest > 0.0 && v > RANK_EPS * largest)
            .count();
        let keep = if components == 0 || components > available {
            available
        } else {
            components
        };

        vectors = vectors.slice_move(ndarray::s![.., ..keep]);
        normalize_columns(&mut vectors);
        Ok(Self {
            mean,
            basis: vectors,
            eigenvalues: values.slice_move(ndarray::s![..keep]),
        })
    }

    pub fn components(&self) -> usize {
        self.basis.ncols()
    }

    pub fn project(&self, sample: ArrayView1<'_, f64>) -> Array1<f64> {
        project(&self.basis, self.mean.view(), sample)
    }

    /// Project every row of `data`.
    pub fn project_rows(&self, data: &Array2<f64>) -> Array2<f64> {
        (data - &self.mean).dot(&self.basis)
    }
}

/// Coordinates of `sample` in the subspace spanned by `basis` around `mean`.
pub fn project(
    basis: &Array2<f64>,
    mean: ArrayView1<'_, f64>,
    sample: ArrayView1<'_, f64>,
) -> Array1<f64> {
    basis.t().dot(&(&sample - &mean))
}

/// Map subspace coordinates back to sample space.
pub fn reconstruct(
    basis: &Array2<f64>,
    mean: ArrayView1<'_, f64>,
    coords: ArrayView1<'_, f64>,
) -> Array1<f64> {
    basis.dot(&coords) + &mean
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn finds_dominant_direction() {
        // Points spread along (1, 1) with a little noise across it.
        let data = array![
            [0.0, 0.0, 5.0],
            [2.0, 2.1, 5.0],
            [4.0, 3.9, 5.0],
            [6.0, 6.0, 5.0],
        ];
        let pca = Pca::compute(&data, 1).expect("pca");
        assert_eq!(pca.components(), 1);
        for (m, e) in pca.mean.iter().zip([3.0, 3.0, 5.0]) {
            assert!((m - e).abs() < 1e-12);
        }
        let dir = pca.basis.column(0);
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((dir[0].abs() - expected).abs() < 0.02);
        assert!((dir[1].abs() - expected).abs() < 0.02);
        assert!(dir[2].abs() < 1e-9);
    }

    #[test]
    fn gram_path_matches_sample_count() {
        // Three samples in eight dimensions: at most two informative directions.
        let data = Array2::from_shape_fn((3, 8), |(i, j)| ((i * 7 + j * 3) % 5) as f64 + i as f64);
        let pca = Pca::compute(&data, 0).expect("pca");
        assert_eq!(pca.components(), 2);
        for col in pca.basis.columns() {
            assert!((col.dot(&col) - 1.0).abs() < 1e-9);
        }
        // Training samples lie in the span, so they reconstruct exactly.
        for row in data.rows() {
            let coords = pca.project(row);
            let back = reconstruct(&pca.basis, pca.mean.view(), coords.view());
            for (a, b) in back.iter().zip(row.iter()) {
                assert!((a - b).abs() < 1e-8);
            }
        }
    }

    #[test]
    fn oversized_request_is_clipped() {
        let data = array![[0.0, 1.0], [1.0, 0.0], [2.0, 2.0]];
        let pca = Pca::compute(&data, 80).expect("pca");
        assert_eq!(pca.components(), 2);
    }

    #[test]
    fn identical_samples_have_no_components() {
        let data = array![[1.0, 2.0, 3.0], [1.0, 2.0, 3.0]];
        let pca = Pca::compute(&data, 0).expect("pca");
        assert_eq!(pca.components(), 0);
        assert_eq!(pca.project(data.row(0)).len(), 0);
    }
}
