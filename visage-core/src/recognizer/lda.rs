use std::collections::BTreeMap;

use anyhow::{Result, bail, ensure};
use ndarray::{Array1, Array2, Axis};

use super::linalg::{normalize_columns, symmetric_eigen};

const RANK_EPS: f64 = 1e-10;

/// Linear discriminant directions separating labelled row samples.
#[derive(Debug, Clone)]
pub struct Lda {
    /// `dims x components`, unit columns.
    pub basis: Array2<f64>,
    pub eigenvalues: Array1<f64>,
}

impl Lda {
    /// Solve `Sb w = lambda Sw w` for the leading discriminants.
    ///
    /// `components` defaults to (and is capped at) `classes - 1`. The within-class scatter is
    /// whitened through its own eigen-decomposition, so it only has to be non-singular on the
    /// subspace the data occupies.
    pub fn compute(data: &Array2<f64>, labels: &[i32], components: usize) -> Result<Self> {
        let (n, d) = data.dim();
        ensure!(n == labels.len(), "{n} samples but {} labels", labels.len());
        ensure!(d > 0, "LDA needs non-empty samples");

        let mut members: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (i, &label) in labels.iter().enumerate() {
            members.entry(label).or_default().push(i);
        }
        let classes = members.len();
        ensure!(
            classes >= 2,
            "at least two classes are needed, got {classes}"
        );

        let total_mean = data.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
        let mut sw = Array2::<f64>::zeros((d, d));
        let mut sb = Array2::<f64>::zeros((d, d));
        for rows in members.values() {
            let class = data.select(Axis(0), rows);
            let class_mean = class.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(d));
            let centered = &class - &class_mean;
            sw += &centered.t().dot(&centered);

            let diff = (&class_mean - &total_mean).insert_axis(Axis(1));
            sb += &(diff.dot(&diff.t()) * rows.len() as f64);
        }

        let sw_eig = symmetric_eigen(&sw)?;
        let largest = sw_eig.values.iter().copied().fold(0.0f64, f64::max);
        let rank = sw_eig
            .values
            .iter()
            .take_while(|&&v| largest > 0.0 && v > RANK_EPS * largest)
            .count();
        if rank == 0 {
            bail!("within-class scatter is zero; every class needs varied samples");
        }
        let mut whiten = sw_eig.vectors.slice_move(ndarray::s![.., ..rank]);
        for (mut col, &value) in whiten.columns_mut().into_iter().zip(sw_eig.values.iter()) {
            col /= value.sqrt();
        }

        let between = whiten.t().dot(&sb).dot(&whiten);
        let eig = symmetric_eigen(&between)?;

        let max_components = (classes - 1).min(rank);
        let keep = if components == 0 || components > max_components {
            max_components
        } else {
            components
        };
        let mut basis = whiten.dot(&eig.vectors.slice(ndarray::s![.., ..keep]));
        normalize_columns(&mut basis);

        Ok(Self {
            basis,
            eigenvalues: eig.values.slice_move(ndarray::s![..keep]),
        })
    }

    pub fn components(&self) -> usize {
        self.basis.ncols()
    }
}
