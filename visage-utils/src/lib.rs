//! Common helpers shared across the Visage crates.

/// Application configuration and settings management.
pub mod config;
/// Test fixture loading and path resolution.
pub mod fixtures;
/// Image loading, grayscale conversion, equalization and resizing.
pub mod image_utils;
/// Instrumentation helpers for optional performance tracing.
pub mod telemetry;
/// Webcam capture through `nokhwa`.
pub mod webcam;

use std::path::Path;

use anyhow::Result;
use log::LevelFilter;

pub use fixtures::{fixture_path, fixtures_dir, load_fixture_image, load_fixture_text};
pub use image_utils::{
    compute_resize_scales, equalize_histogram, gray_to_vector, load_image, resize_gray,
    rgb_to_bgr_chw, to_grayscale,
};
pub use telemetry::{
    TimingGuard, configure as configure_telemetry, telemetry_allows, telemetry_enabled,
    timing_guard, timing_guard_if,
};
pub use webcam::{FrameSource, WebcamCapture, list_webcam_devices};

/// Initialize logging once for both binaries.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` applies.
pub fn init_logging(default_filter: LevelFilter) -> Result<()> {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter.as_str()),
    );
    builder.filter_module(telemetry::TELEMETRY_TARGET, LevelFilter::Trace);

    if builder.try_init().is_err() {
        // Logger already initialized; nothing to do.
    }
    Ok(())
}

/// Validate that a path exists and resolve it to an absolute path.
pub fn normalize_path<P: AsRef<Path>>(path: P) -> Result<std::path::PathBuf> {
    let path = path.as_ref();
    anyhow::ensure!(path.exists(), "path does not exist: {}", path.display());
    Ok(path.canonicalize()?)
}
