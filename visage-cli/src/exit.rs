//! Argument parsing and failure reporting with the programs' exit statuses.

use std::process::ExitCode;

use clap::{Parser, error::ErrorKind};
use log::error;
use visage_core::{VisageError, find_visage_error};

/// Exit status of `visage-train` on any failure.
pub const TRAIN_FAILURE: u8 = 1;
/// Exit status of `visage-recognize` on any failure.
pub const RECOGNIZE_FAILURE: u8 = 255;

/// Parse the command line, mapping usage errors to `failure` instead of clap's default.
pub fn parse_or_exit<T: Parser>(failure: u8) -> Result<T, ExitCode> {
    T::try_parse().map_err(|err| usage_exit(err, failure))
}

fn usage_exit(err: clap::Error, failure: u8) -> ExitCode {
    let _ = err.print();
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
        _ => ExitCode::from(failure),
    }
}

/// Short prefix naming the failed step.
pub fn describe(err: &anyhow::Error) -> &'static str {
    match find_visage_error(err) {
        Some(VisageError::CascadeLoad { .. }) => "Error loading face cascade",
        Some(VisageError::DatasetOpen { .. }) => "Error opening dataset",
        Some(VisageError::CameraOpen { .. }) => "Error opening camera",
        Some(VisageError::ModelLoad { .. }) | Some(VisageError::InvalidModel(_)) => {
            "Error loading recognizer models"
        }
        Some(VisageError::EmptyDataset { .. }) => "Error training models",
        None => "Error",
    }
}

/// Print the failure to stderr and return the exit status.
pub fn report_failure(err: &anyhow::Error, failure: u8) -> ExitCode {
    error!("{err:#}");
    eprintln!("{}: {err:#}", describe(err));
    ExitCode::from(failure)
}
