//! Drawing identified faces onto frames.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use visage_core::{FaceObservation, Identity};

/// Circle colour for a face either recognizer knows.
pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
/// Circle colour for an unknown face.
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Circle stroke width in pixels.
pub const STROKE: i32 = 3;

pub fn identity_color(identity: Identity) -> Rgb<u8> {
    if identity.is_known() {
        KNOWN_COLOR
    } else {
        UNKNOWN_COLOR
    }
}

/// Draw a circle around every observed face.
pub fn draw_observations(image: &mut RgbImage, observations: &[FaceObservation]) {
    let half = STROKE / 2;
    for observation in observations {
        let color = identity_color(observation.identification.identity);
        let region = observation.region;
        for radius in (region.radius - half)..=(region.radius + half) {
            if radius > 0 {
                draw_hollow_circle_mut(image, region.center, radius, color);
            }
        }
    }
}

/// Save an annotated frame as `frame_NNNNN.png` under `dir`.
pub fn save_annotated_frame(image: &RgbImage, dir: &Path, frame_number: u32) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("frame_{frame_number:05}.png"));
    image
        .save(&path)
        .with_context(|| format!("failed to save annotated frame {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use visage_core::{FaceRegion, Identification, Prediction, Rect};

    fn observation(identity: Identity) -> FaceObservation {
        let prediction = Prediction {
            label: None,
            distance: 1.0,
        };
        FaceObservation {
            bbox: Rect::new(20, 20, 40, 40),
            region: FaceRegion {
                center: (40, 40),
                radius: 20,
            },
            identification: Identification {
                identity,
                eigen: prediction,
                fisher: prediction,
            },
        }
    }

    #[test]
    fn known_faces_are_blue() {
        let mut image = RgbImage::new(80, 80);
        draw_observations(&mut image, &[observation(Identity::Known(3))]);
        assert_eq!(*image.get_pixel(60, 40), KNOWN_COLOR);
        assert_eq!(*image.get_pixel(40, 20), KNOWN_COLOR);
        // Stroke is three pixels wide and the inside stays untouched.
        assert_eq!(*image.get_pixel(59, 40), KNOWN_COLOR);
        assert_eq!(*image.get_pixel(61, 40), KNOWN_COLOR);
        assert_eq!(*image.get_pixel(40, 40), Rgb([0, 0, 0]));
    }

    #[test]
    fn unknown_faces_are_red() {
        let mut image = RgbImage::new(80, 80);
        draw_observations(&mut image, &[observation(Identity::Unknown)]);
        assert_eq!(*image.get_pixel(20, 40), UNKNOWN_COLOR);
    }

    #[test]
    fn circles_may_leave_the_frame() {
        let mut image = RgbImage::new(30, 30);
        draw_observations(&mut image, &[observation(Identity::Unknown)]);
        assert_eq!(*image.get_pixel(20, 29), Rgb([0, 0, 0]));
    }

    #[test]
    fn saves_numbered_frames() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = save_annotated_frame(&RgbImage::new(4, 4), &dir.path().join("out"), 7)
            .expect("save");
        assert!(path.ends_with("frame_00007.png"));
        assert!(path.is_file());
    }
}
