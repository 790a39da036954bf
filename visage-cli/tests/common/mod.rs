//! Shared helpers for the CLI integration tests.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{Rgb, RgbImage};

/// The synthetic cascade under `fixtures/`, or `None` when the fixtures are absent.
pub fn fixture_cascade() -> Option<PathBuf> {
    match visage_utils::fixture_path("cascades/center_box_haar.xml") {
        Ok(path) => Some(path),
        Err(err) => {
            eprintln!("Skipping test: {err}");
            None
        }
    }
}

#[allow(dead_code)]
/// A dark frame with one bright, textured square the fixture cascade fires on.
pub fn synthetic_face(identity: u32, variant: u32) -> RgbImage {
    let (ox, oy) = (108 + variant as i32 * 2, 68 + variant as i32);
    RgbImage::from_fn(320, 240, |x, y| {
        let (lx, ly) = (x as i32 - ox, y as i32 - oy);
        if !(0..100).contains(&lx) || !(0..100).contains(&ly) {
            return Rgb([30, 30, 30]);
        }
        let stripes = match identity {
            0 => (ly / 10) % 2,
            1 => (lx / 10) % 2,
            _ => (lx / 20 + ly / 20) % 2,
        };
        let mark = (lx - 20 - variant as i32 * 25).abs() < 6 && (ly - 75).abs() < 6;
        let v = (205 + stripes * 20 + variant as i32 - if mark { 60 } else { 0 }) as u8;
        Rgb([v, v, v])
    })
}

#[allow(dead_code)]
/// Write three identities with three photos each and return the CSV path.
pub fn write_dataset(dir: &Path) -> PathBuf {
    let mut list = String::new();
    for identity in 0..3u32 {
        for variant in 0..3u32 {
            let path = dir.join(format!("id{identity}_{variant}.png"));
            synthetic_face(identity, variant)
                .save(&path)
                .expect("save face");
            list.push_str(&format!("{};{}\n", path.display(), identity + 1));
        }
    }
    let csv = dir.join("faces.csv");
    fs::write(&csv, list).expect("write csv");
    csv
}
