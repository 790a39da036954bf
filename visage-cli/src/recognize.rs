//! The `visage-recognize` workflow: session setup, camera and the headless loop.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use log::{debug, info, warn};
use serde::Serialize;
use visage_core::{
    FaceDetector, FaceIdentifier, FaceObservation, FaceRegion, Identity, Rect, VisageError,
    analyze_frame, build_detector,
};
use visage_utils::{
    FrameSource, WebcamCapture,
    config::{AppSettings, FaceSettings, WebcamSettings},
    list_webcam_devices,
};

use crate::annotate::{draw_observations, save_annotated_frame};

/// Detector, trained models and sample geometry needed to process frames.
pub struct RecognitionSession {
    detector: Box<dyn FaceDetector>,
    identifier: FaceIdentifier,
    face: FaceSettings,
}

/// One processed frame.
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub observations: Vec<FaceObservation>,
}

impl RecognitionSession {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        identifier: FaceIdentifier,
        face: FaceSettings,
    ) -> Self {
        Self {
            detector,
            identifier,
            face,
        }
    }

    /// Load the detector and both models.
    ///
    /// The given thresholds replace the ones stored in the model files.
    pub fn from_settings(
        settings: &AppSettings,
        eigen_threshold: Option<f64>,
        fisher_threshold: Option<f64>,
    ) -> Result<Self> {
        let detector = build_detector(&settings.detector)?;
        let mut identifier = FaceIdentifier::load(
            Path::new(&settings.eigen.model_path),
            Path::new(&settings.fisher.model_path),
        )?;
        identifier.set_thresholds(eigen_threshold, fisher_threshold);
        Ok(Self::new(detector, identifier, settings.face))
    }

    /// Detect, identify and annotate one frame.
    pub fn process(&self, frame: &DynamicImage) -> Result<AnnotatedFrame> {
        let observations =
            analyze_frame(frame, self.detector.as_ref(), &self.identifier, &self.face)?;
        let mut image = frame.to_rgb8();
        draw_observations(&mut image, &observations);
        Ok(AnnotatedFrame {
            image,
            observations,
        })
    }
}

/// Open the configured camera, reporting failure as [`VisageError::CameraOpen`].
pub fn open_camera(webcam: &WebcamSettings) -> Result<WebcamCapture> {
    match list_webcam_devices() {
        Ok(devices) => {
            for (idx, name) in devices {
                debug!("camera [{idx}] {name}");
            }
        }
        Err(e) => warn!("Could not enumerate webcam devices: {e}"),
    }
    WebcamCapture::with_device_index(webcam.device_index, webcam.width, webcam.height, webcam.fps)
        .map_err(|e| {
            VisageError::CameraOpen {
                device: webcam.device_index,
                reason: format!("{e:#}"),
            }
            .into()
        })
}

/// Options of the window-less loop.
#[derive(Debug, Clone, Default)]
pub struct HeadlessOptions {
    /// Stop after this many frames; 0 runs until interrupted.
    pub frames: u32,
    pub annotate_dir: Option<PathBuf>,
    /// Write every identification to this JSON file when the loop ends.
    pub json: Option<PathBuf>,
    pub poll_interval: Duration,
}

#[derive(Debug, Serialize)]
struct FaceRecord {
    bbox: Rect,
    region: FaceRegion,
    identity: Identity,
    eigen_distance: f64,
    fisher_distance: f64,
}

#[derive(Debug, Serialize)]
struct FrameRecord {
    frame: u32,
    faces: Vec<FaceRecord>,
}

impl FrameRecord {
    fn new(frame: u32, observations: &[FaceObservation]) -> Self {
        Self {
            frame,
            faces: observations
                .iter()
                .map(|obs| FaceRecord {
                    bbox: obs.bbox,
                    region: obs.region,
                    identity: obs.identification.identity,
                    eigen_distance: obs.identification.eigen.distance,
                    fisher_distance: obs.identification.fisher.distance,
                })
                .collect(),
        }
    }
}

fn write_records(path: &Path, records: &[FrameRecord]) -> Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, records)
        .with_context(|| format!("failed to write identifications to {}", path.display()))?;
    info!("Wrote identifications to {}", path.display());
    Ok(())
}

/// Totals gathered by [`run_headless`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessSummary {
    pub frames: u32,
    pub faces: usize,
    pub known: usize,
}

/// Process frames from `source` without a window, logging every identification.
pub fn run_headless(
    session: &RecognitionSession,
    source: &mut dyn FrameSource,
    options: &HeadlessOptions,
) -> Result<HeadlessSummary> {
    let continuous = options.frames == 0;
    if continuous {
        info!("Starting recognition loop (continuous mode - press Ctrl+C to stop)");
    } else {
        info!("Starting recognition loop ({} frames)", options.frames);
    }

    let mut summary = HeadlessSummary::default();
    let mut records = Vec::new();
    while continuous || summary.frames < options.frames {
        let frame = source.next_frame().context("camera stopped delivering frames")?;
        summary.frames += 1;

        match session.process(&frame) {
            Ok(annotated) => {
                log_observations(summary.frames, &annotated.observations);
                if options.json.is_some() {
                    records.push(FrameRecord::new(summary.frames, &annotated.observations));
                }
                summary.faces += annotated.observations.len();
                summary.known += annotated
                    .observations
                    .iter()
                    .filter(|o| o.identification.identity.is_known())
                    .count();
                if let Some(dir) = options.annotate_dir.as_ref() {
                    match save_annotated_frame(&annotated.image, dir, summary.frames) {
                        Ok(path) => debug!("Saved annotated frame to {}", path.display()),
                        Err(e) => warn!("Failed to annotate frame {}: {e:#}", summary.frames),
                    }
                }
            }
            Err(e) => warn!("Recognition failed on frame {}: {e:#}", summary.frames),
        }

        if !options.poll_interval.is_zero() {
            thread::sleep(options.poll_interval);
        }
    }

    info!(
        "Processed {} frame(s): {} face(s), {} recognized",
        summary.frames, summary.faces, summary.known
    );
    if let Some(path) = options.json.as_ref() {
        write_records(path, &records)?;
    }
    Ok(summary)
}

fn log_observations(frame: u32, observations: &[FaceObservation]) {
    for obs in observations {
        let id = obs.identification;
        let verdict = match id.identity {
            Identity::Known(label) => format!("label {label}"),
            Identity::Unknown => "unknown".to_string(),
        };
        info!(
            "Frame {frame}: face at ({}, {}) r={} -> {verdict} (eigen {:.1}, fisher {:.1})",
            obs.region.center.0,
            obs.region.center.1,
            obs.region.radius,
            id.eigen.distance,
            id.fisher.distance
        );
    }
    if observations.is_empty() {
        debug!("Frame {frame}: no faces");
    }
}
