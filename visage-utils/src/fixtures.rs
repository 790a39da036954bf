use anyhow::{Context, Result};
use image::DynamicImage;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

const FIXTURE_ENV: &str = "VISAGE_FIXTURE_ROOT";

/// Locate the `fixtures` directory.
///
/// `VISAGE_FIXTURE_ROOT` takes precedence; otherwise the ancestors of this crate's manifest
/// directory are searched.
pub fn fixtures_dir() -> Result<PathBuf> {
    if let Ok(value) = env::var(FIXTURE_ENV) {
        return Ok(PathBuf::from(value));
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .ancestors()
        .map(|ancestor| ancestor.join("fixtures"))
        .find(|candidate| candidate.is_dir())
        .with_context(|| {
            format!(
                "fixtures directory not found starting from {}",
                manifest_dir.display()
            )
        })
}

/// Resolve a fixture file, failing when it is absent.
pub fn fixture_path<P: AsRef<Path>>(relative: P) -> Result<PathBuf> {
    let relative = relative.as_ref();
    let root = fixtures_dir()?;
    let full = root.join(relative);
    anyhow::ensure!(
        full.exists(),
        "fixture {} does not exist under {}",
        relative.display(),
        root.display()
    );
    Ok(full)
}

pub fn load_fixture_image<P: AsRef<Path>>(relative: P) -> Result<DynamicImage> {
    let path = fixture_path(relative)?;
    image::open(&path).with_context(|| format!("failed to open fixture image {}", path.display()))
}

pub fn load_fixture_text<P: AsRef<Path>>(relative: P) -> Result<String> {
    let path = fixture_path(relative)?;
    fs::read_to_string(&path).with_context(|| format!("failed to read fixture {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_bundled_cascade() {
        let path = fixture_path("cascades/center_box_haar.xml").expect("cascade fixture");
        assert!(path.ends_with(Path::new("cascades/center_box_haar.xml")));
        let text = load_fixture_text("cascades/center_box_haar.xml").expect("read");
        assert!(text.contains("<opencv_storage>"));
    }

    #[test]
    fn missing_fixture_errors() {
        assert!(fixture_path("cascades/missing.xml").is_err());
        assert!(load_fixture_image("images/missing.png").is_err());
    }
}
