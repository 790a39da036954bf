//! `path;label` training lists.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::error::VisageError;

/// Field separator used by training lists.
pub const DEFAULT_SEPARATOR: u8 = b';';

/// One line of a training list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetEntry {
    pub path: PathBuf,
    pub label: i32,
    /// 1-based line number, for diagnostics.
    pub line: u64,
}

/// Read a training list.
///
/// Each line is split at the first `separator`: the left part is the image path and the label is
/// the integer the rest starts with (`7;x` and `7abc` both read as 7). Lines with an empty path
/// or label are ignored; labels without a leading integer are skipped with a warning.
pub fn read_dataset<P: AsRef<Path>>(path: P, separator: u8) -> Result<Vec<DatasetEntry>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| VisageError::DatasetOpen {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(separator)
        .flexible(true)
        .quoting(false)
        .from_reader(file);

    let sep = String::from_utf8_lossy(&[separator]).into_owned();
    let mut entries = Vec::new();
    for record in reader.byte_records() {
        let record = record.with_context(|| format!("failed to read {}", path.display()))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let Some(first) = record.get(0) else {
            continue;
        };
        let image = String::from_utf8_lossy(first).into_owned();
        let label_text = record
            .iter()
            .skip(1)
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect::<Vec<_>>()
            .join(sep.as_str());

        if image.is_empty() || label_text.is_empty() {
            debug!("{}:{line}: skipping line without path or label", path.display());
            continue;
        }
        match leading_integer(&label_text) {
            Some((label, rest)) => {
                if !rest.trim().is_empty() {
                    debug!(
                        "{}:{line}: ignoring '{rest}' after label {label}",
                        path.display()
                    );
                }
                entries.push(DatasetEntry {
                    path: PathBuf::from(image),
                    label,
                    line,
                });
            }
            None => warn!(
                "{}:{line}: label '{label_text}' does not start with an integer, skipping",
                path.display()
            ),
        }
    }
    debug!("{} entries read from {}", entries.len(), path.display());
    Ok(entries)
}

/// Integer at the start of `text` after optional whitespace and sign, plus the remainder.
///
/// `None` when no digit follows or the value does not fit an `i32`.
fn leading_integer(text: &str) -> Option<(i32, &str)> {
    let trimmed = text.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits = trimmed[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    let (number, rest) = trimmed.split_at(sign_len + digits);
    number.parse().ok().map(|value| (value, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_list(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("faces.csv");
        fs::write(&path, contents).expect("write list");
        (dir, path)
    }

    #[test]
    fn parses_paths_and_labels() {
        let (_dir, path) = write_list("a/1.png;0\r\nb/2.png;7\n");
        let entries = read_dataset(&path, DEFAULT_SEPARATOR).expect("read");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, PathBuf::from("a/1.png"));
        assert_eq!(entries[0].label, 0);
        assert_eq!(entries[1].label, 7);
        assert_eq!(entries[1].line, 2);
    }

    #[test]
    fn skips_incomplete_and_invalid_lines() {
        let (_dir, path) = write_list("only_path\n;3\nface.png;\n\nface.png;abc\nok.png; 4\n");
        let entries = read_dataset(&path, DEFAULT_SEPARATOR).expect("read");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, PathBuf::from("ok.png"));
        assert_eq!(entries[0].label, 4);
    }

    #[test]
    fn label_is_leading_integer_of_the_rest() {
        let (_dir, path) = write_list("a.png;1;2\nb.png;12abc\nc.png;  -3 \nd.png;+8\n");
        let entries = read_dataset(&path, DEFAULT_SEPARATOR).expect("read");
        let labels: Vec<i32> = entries.iter().map(|e| e.label).collect();
        assert_eq!(labels, vec![1, 12, -3, 8]);
        assert_eq!(entries[1].path, PathBuf::from("b.png"));
    }

    #[test]
    fn leading_integer_edge_cases() {
        assert_eq!(leading_integer("42"), Some((42, "")));
        assert_eq!(leading_integer(" 5;6"), Some((5, ";6")));
        assert_eq!(leading_integer("-"), None);
        assert_eq!(leading_integer("x1"), None);
        assert_eq!(leading_integer("99999999999"), None);
    }

    #[test]
    fn quotes_are_literal() {
        let (_dir, path) = write_list("\"quoted name.png\";5\n");
        let entries = read_dataset(&path, DEFAULT_SEPARATOR).expect("read");
        assert_eq!(entries[0].path, PathBuf::from("\"quoted name.png\""));
    }

    #[test]
    fn missing_file_is_dataset_open_error() {
        let err = read_dataset("does/not/exist.csv", DEFAULT_SEPARATOR).expect_err("missing");
        assert!(matches!(
            err.downcast_ref::<VisageError>(),
            Some(VisageError::DatasetOpen { .. })
        ));
    }

    #[test]
    fn custom_separator() {
        let (_dir, path) = write_list("img.png,9\n");
        let entries = read_dataset(&path, b',').expect("read");
        assert_eq!(entries[0].label, 9);
    }
}
