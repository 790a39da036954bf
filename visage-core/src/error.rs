use std::path::PathBuf;

use thiserror::Error;

/// Failures that the programs report with a dedicated exit status.
///
/// Library functions still return `anyhow::Result`; callers downcast to this type when the
/// distinction matters.
#[derive(Debug, Error)]
pub enum VisageError {
    #[error("could not load cascade classifier {}: {reason}", path.display())]
    CascadeLoad { path: PathBuf, reason: String },

    #[error("could not open dataset {}: {reason}", path.display())]
    DatasetOpen { path: PathBuf, reason: String },

    #[error("could not open camera {device}: {reason}")]
    CameraOpen { device: u32, reason: String },

    #[error("could not load recognizer model {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("invalid recognizer model: {0}")]
    InvalidModel(String),

    #[error("no usable face samples among {listed} listed images")]
    EmptyDataset { listed: usize },
}

impl VisageError {
    pub fn cascade_load(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        VisageError::CascadeLoad {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }

    pub fn model_load(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        VisageError::ModelLoad {
            path: path.into(),
            reason: format!("{err:#}"),
        }
    }
}

/// Find a [`VisageError`] anywhere in an error chain.
pub fn find_visage_error(err: &anyhow::Error) -> Option<&VisageError> {
    err.chain().find_map(|cause| cause.downcast_ref::<VisageError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn finds_typed_error_under_context() {
        let err = Err::<(), _>(VisageError::EmptyDataset { listed: 4 })
            .context("training failed")
            .expect_err("error");
        assert!(matches!(
            find_visage_error(&err),
            Some(VisageError::EmptyDataset { listed: 4 })
        ));
    }

    #[test]
    fn plain_errors_have_no_typed_cause() {
        let err = anyhow::anyhow!("boom");
        assert!(find_visage_error(&err).is_none());
    }

    #[test]
    fn cascade_message_names_the_file() {
        let err = VisageError::cascade_load("faces.xml", "missing <cascade>");
        assert_eq!(
            err.to_string(),
            "could not load cascade classifier faces.xml: missing <cascade>"
        );
    }
}
