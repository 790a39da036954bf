//! Binary model files.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use log::info;
use ndarray::{Array1, Array2, ShapeBuilder};
use serde::{Deserialize, Serialize};

use super::{ModelKind, Subspace};
use crate::error::VisageError;

const MAGIC: &str = "visage-recognizer";
const FORMAT_VERSION: u32 = 1;

/// Everything needed to rebuild a trained recognizer.
#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    magic: String,
    version: u32,
    kind: ModelKind,
    /// Requested component count, kept so a reloaded recognizer retrains the same way.
    components: usize,
    threshold: f64,
    width: u32,
    height: u32,
    mean: Vec<f64>,
    basis_cols: usize,
    /// Column-major `pixels x basis_cols`.
    basis: Vec<f64>,
    eigenvalues: Vec<f64>,
    projections: Vec<Vec<f64>>,
    labels: Vec<i32>,
}

/// Parameters and trained state read back from disk.
pub(crate) struct StoredModel {
    pub components: usize,
    pub threshold: f64,
    pub subspace: Subspace,
}

pub(crate) fn save_model(
    path: &Path,
    kind: ModelKind,
    components: usize,
    threshold: f64,
    subspace: &Subspace,
) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file = ModelFile {
        magic: MAGIC.to_string(),
        version: FORMAT_VERSION,
        kind,
        components,
        threshold,
        width: subspace.size.0,
        height: subspace.size.1,
        mean: subspace.mean.to_vec(),
        basis_cols: subspace.basis.ncols(),
        basis: subspace.basis.t().iter().copied().collect(),
        eigenvalues: subspace.eigenvalues.to_vec(),
        projections: subspace.projections.iter().map(|p| p.to_vec()).collect(),
        labels: subspace.labels.clone(),
    };

    let handle =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(handle);
    bincode::serialize_into(&mut writer, &file)
        .with_context(|| format!("failed to write {kind} model {}", path.display()))?;
    writer.flush()?;
    info!(
        "Saved {kind} model ({} components, {} samples) to {}",
        file.basis_cols,
        file.labels.len(),
        path.display()
    );
    Ok(())
}

pub(crate) fn load_model(path: &Path, expected: ModelKind) -> Result<StoredModel> {
    let handle = File::open(path).map_err(|e| VisageError::model_load(path, e))?;
    let file: ModelFile = bincode::deserialize_from(BufReader::new(handle))
        .map_err(|e| VisageError::model_load(path, e))?;

    if file.magic != MAGIC {
        return Err(VisageError::InvalidModel(format!(
            "{} is not a recognizer model",
            path.display()
        ))
        .into());
    }
    if file.version != FORMAT_VERSION {
        return Err(VisageError::InvalidModel(format!(
            "{} has format version {}, expected {FORMAT_VERSION}",
            path.display(),
            file.version
        ))
        .into());
    }
    if file.kind != expected {
        return Err(VisageError::InvalidModel(format!(
            "{} holds a {} model, expected {expected}",
            path.display(),
            file.kind
        ))
        .into());
    }
    Ok(StoredModel {
        components: file.components,
        threshold: file.threshold,
        subspace: rebuild(file).map_err(VisageError::InvalidModel)?,
    })
}

fn rebuild(file: ModelFile) -> std::result::Result<Subspace, String> {
    let dims = file.width as usize * file.height as usize;
    if dims == 0 || file.mean.len() != dims {
        return Err(format!(
            "mean has {} values for a {}x{} sample",
            file.mean.len(),
            file.width,
            file.height
        ));
    }
    if file.basis.len() != dims * file.basis_cols {
        return Err(format!(
            "basis has {} values, expected {dims} x {}",
            file.basis.len(),
            file.basis_cols
        ));
    }
    if file.projections.is_empty() || file.projections.len() != file.labels.len() {
        return Err(format!(
            "{} projections for {} labels",
            file.projections.len(),
            file.labels.len()
        ));
    }
    if let Some(bad) = file.projections.iter().find(|p| p.len() != file.basis_cols) {
        return Err(format!(
            "projection of length {}, expected {}",
            bad.len(),
            file.basis_cols
        ));
    }

    let basis = Array2::from_shape_vec((dims, file.basis_cols).f(), file.basis)
        .map_err(|e| e.to_string())?;
    Ok(Subspace {
        size: (file.width, file.height),
        mean: Array1::from(file.mean),
        basis,
        eigenvalues: Array1::from(file.eigenvalues),
        projections: file.projections.into_iter().map(Array1::from).collect(),
        labels: file.labels,
    })
}
