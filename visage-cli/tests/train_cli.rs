mod common;

use std::{error::Error, fs};

use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::tempdir;

use common::{fixture_cascade, write_dataset};

#[test]
fn missing_csv_argument_exits_with_one() {
    cargo_bin_cmd!("visage-train").assert().failure().code(1);
}

#[test]
fn extra_positional_argument_exits_with_one() {
    cargo_bin_cmd!("visage-train")
        .args(["a.csv", "b.csv"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn help_exits_successfully() {
    cargo_bin_cmd!("visage-train").arg("--help").assert().success();
}

#[test]
fn missing_cascade_exits_with_one() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let csv = write_dataset(dir.path());
    let output = cargo_bin_cmd!("visage-train")
        .arg(&csv)
        .arg("--cascade")
        .arg(dir.path().join("absent.xml"))
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error loading face cascade"), "{stderr}");
    Ok(())
}

#[test]
fn unreadable_csv_exits_with_one() -> Result<(), Box<dyn Error>> {
    let Some(cascade) = fixture_cascade() else {
        return Ok(());
    };
    let dir = tempdir()?;
    let output = cargo_bin_cmd!("visage-train")
        .arg(dir.path().join("missing.csv"))
        .arg("--cascade")
        .arg(&cascade)
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error opening dataset"), "{stderr}");
    Ok(())
}

#[test]
fn dataset_without_faces_exits_with_one() -> Result<(), Box<dyn Error>> {
    let Some(cascade) = fixture_cascade() else {
        return Ok(());
    };
    let dir = tempdir()?;
    let csv = dir.path().join("faces.csv");
    fs::write(&csv, "nowhere/a.png;1\nnowhere/b.png;2\n")?;
    cargo_bin_cmd!("visage-train")
        .arg(&csv)
        .arg("--cascade")
        .arg(&cascade)
        .arg("--eigen-model")
        .arg(dir.path().join("e.bin"))
        .arg("--fisher-model")
        .arg(dir.path().join("f.bin"))
        .assert()
        .failure()
        .code(1);
    assert!(!dir.path().join("e.bin").exists());
    Ok(())
}

#[test]
fn trains_and_writes_both_models() -> Result<(), Box<dyn Error>> {
    let Some(cascade) = fixture_cascade() else {
        return Ok(());
    };
    let dir = tempdir()?;
    let csv = write_dataset(dir.path());
    let config = dir.path().join("visage.json");
    fs::write(
        &config,
        r#"{ "detector": { "min_size": 100 }, "face": { "sample_width": 48, "sample_height": 56, "crop_inset": 4 } }"#,
    )?;
    let eigen = dir.path().join("models/eigenfaces.bin");
    let fisher = dir.path().join("models/fisherfaces.bin");

    let output = cargo_bin_cmd!("visage-train")
        .arg(&csv)
        .arg("--config")
        .arg(&config)
        .arg("--cascade")
        .arg(&cascade)
        .arg("--eigen-model")
        .arg(&eigen)
        .arg("--fisher-model")
        .arg(&fisher)
        .output()?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "Training completed with 9 images.");
    assert!(eigen.is_file());
    assert!(fisher.is_file());
    Ok(())
}
