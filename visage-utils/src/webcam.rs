//! Camera capture for the live recognition loop.

use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, RgbImage};
use log::{debug, info, warn};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType, Resolution},
};

/// Anything that can hand out successive video frames.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<DynamicImage>;
}

/// An opened, streaming camera device.
pub struct WebcamCapture {
    camera: Camera,
    device_index: u32,
    streaming: bool,
}

impl WebcamCapture {
    /// Open camera `device_index` and start streaming.
    ///
    /// The requested resolution and frame rate are hints; drivers that refuse them keep their
    /// own defaults and a warning is logged.
    pub fn with_device_index(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
        debug!("opening camera {device_index} at {width}x{height} @ {fps} fps");

        let mut camera = Camera::new(CameraIndex::Index(device_index), requested)
            .with_context(|| format!("failed to open camera {device_index}"))?;
        camera
            .open_stream()
            .with_context(|| format!("failed to start stream on camera {device_index}"))?;

        if let Err(err) = camera.set_resolution(Resolution::new(width, height)) {
            warn!("camera {device_index} kept its resolution ({err})");
        }
        if let Err(err) = camera.set_frame_rate(fps) {
            warn!("camera {device_index} kept its frame rate ({err})");
        }

        let actual = camera.resolution();
        info!(
            "camera {} streaming at {}x{} @ {} fps",
            device_index,
            actual.width(),
            actual.height(),
            camera.frame_rate()
        );

        Ok(Self {
            camera,
            device_index,
            streaming: true,
        })
    }

    /// Grab and decode one RGB frame.
    pub fn capture_frame(&mut self) -> Result<DynamicImage> {
        let frame = self
            .camera
            .frame()
            .with_context(|| format!("failed to read a frame from camera {}", self.device_index))?;
        let resolution = frame.resolution();
        let decoded = frame
            .decode_image::<RgbFormat>()
            .context("failed to decode camera frame")?;

        let rgb = RgbImage::from_raw(resolution.width(), resolution.height(), decoded.to_vec())
            .ok_or_else(|| anyhow!("camera frame does not match its reported resolution"))?;
        Ok(DynamicImage::ImageRgb8(rgb))
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    pub fn resolution(&self) -> (u32, u32) {
        let res = self.camera.resolution();
        (res.width(), res.height())
    }

    /// Stop streaming and release the device.
    pub fn stop(mut self) -> Result<()> {
        self.streaming = false;
        self.camera
            .stop_stream()
            .with_context(|| format!("failed to stop camera {}", self.device_index))?;
        info!("camera {} stopped", self.device_index);
        Ok(())
    }
}

impl FrameSource for WebcamCapture {
    fn next_frame(&mut self) -> Result<DynamicImage> {
        self.capture_frame()
    }
}

impl Drop for WebcamCapture {
    fn drop(&mut self) {
        if self.streaming
            && let Err(err) = self.camera.stop_stream()
        {
            warn!("failed to stop camera {} on drop: {err}", self.device_index);
        }
    }
}

/// Enumerate cameras as `(index, human readable name)`.
pub fn list_webcam_devices() -> Result<Vec<(u32, String)>> {
    let devices = query(ApiBackend::Auto).context("failed to query camera devices")?;
    Ok(devices
        .iter()
        .enumerate()
        .map(|(idx, info)| (idx as u32, info.human_name()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // needs camera hardware
    fn lists_devices() {
        let devices = list_webcam_devices().expect("query devices");
        for (idx, name) in devices {
            println!("[{idx}] {name}");
        }
    }

    #[test]
    #[ignore] // needs camera hardware
    fn captures_one_frame() {
        let mut camera = WebcamCapture::with_device_index(0, 640, 480, 30).expect("open camera");
        let frame = camera.next_frame().expect("capture");
        assert!(frame.width() > 0 && frame.height() > 0);
        camera.stop().expect("stop");
    }
}
