//! Live recognition window.
//!
//! A capture thread owns the camera, processes frames and hands them to the UI through a
//! one-slot channel; frames arriving while the slot is full are dropped. Any key press closes
//! the window, which stops the capture thread.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use anyhow::{Result, anyhow};
use eframe::{App, Frame, NativeOptions, egui};
use image::RgbImage;
use log::{error, info, warn};
use visage_utils::config::WebcamSettings;

use crate::recognize::{RecognitionSession, open_camera};

/// A processed frame handed to the UI thread.
pub struct ViewerFrame {
    pub image: RgbImage,
    pub faces: usize,
    pub known: usize,
}

/// Open the camera on a capture thread and show annotated frames until a key is pressed.
pub fn run_window(session: RecognitionSession, webcam: WebcamSettings) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let (frame_tx, frame_rx) = mpsc::sync_channel::<ViewerFrame>(1);
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);

    let capture_stop = stop.clone();
    let handle = thread::spawn(move || {
        capture_loop(session, webcam, frame_tx, ready_tx, capture_stop);
    });

    match ready_rx.recv() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            let _ = handle.join();
            return Err(err);
        }
        Err(_) => {
            let _ = handle.join();
            return Err(anyhow!("capture thread exited before opening the camera"));
        }
    }

    let poll = Duration::from_millis(webcam.poll_interval_ms.max(1));
    let viewer = LiveViewer::new(frame_rx, stop.clone(), poll);
    let mut options = NativeOptions::default();
    options.viewport = options
        .viewport
        .with_inner_size([webcam.width as f32, webcam.height as f32]);

    let result = eframe::run_native("Visage", options, Box::new(|_cc| Ok(Box::new(viewer))));

    stop.store(true, Ordering::Relaxed);
    if handle.join().is_err() {
        warn!("capture thread panicked");
    }
    result.map_err(|e| anyhow!("viewer window failed: {e}"))
}

fn capture_loop(
    session: RecognitionSession,
    webcam: WebcamSettings,
    frames: mpsc::SyncSender<ViewerFrame>,
    ready: mpsc::SyncSender<Result<()>>,
    stop: Arc<AtomicBool>,
) {
    let mut camera = match open_camera(&webcam) {
        Ok(camera) => {
            let _ = ready.send(Ok(()));
            camera
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let poll = Duration::from_millis(webcam.poll_interval_ms);
    let mut frame_number = 0u32;
    while !stop.load(Ordering::Relaxed) {
        let frame = match camera.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Webcam capture error: {e:#}");
                break;
            }
        };
        frame_number += 1;

        match session.process(&frame) {
            Ok(annotated) => {
                let known = annotated
                    .observations
                    .iter()
                    .filter(|o| o.identification.identity.is_known())
                    .count();
                let message = ViewerFrame {
                    image: annotated.image,
                    faces: annotated.observations.len(),
                    known,
                };
                if !offer_frame(&frames, message) {
                    break;
                }
            }
            Err(e) => warn!("Recognition failed on frame {frame_number}: {e:#}"),
        }
        thread::sleep(poll);
    }

    if let Err(e) = camera.stop() {
        warn!("{e:#}");
    }
    info!("Capture stopped after {frame_number} frame(s)");
}

/// Pass a frame to the UI without blocking, dropping it while the previous one is still pending.
///
/// Returns `false` once the window has gone away.
fn offer_frame(frames: &mpsc::SyncSender<ViewerFrame>, frame: ViewerFrame) -> bool {
    match frames.try_send(frame) {
        Ok(()) | Err(mpsc::TrySendError::Full(_)) => true,
        Err(mpsc::TrySendError::Disconnected(_)) => false,
    }
}

/// Window state: the newest frame as a texture.
pub struct LiveViewer {
    frames: mpsc::Receiver<ViewerFrame>,
    stop: Arc<AtomicBool>,
    poll: Duration,
    texture: Option<egui::TextureHandle>,
    status: String,
}

impl LiveViewer {
    pub fn new(
        frames: mpsc::Receiver<ViewerFrame>,
        stop: Arc<AtomicBool>,
        poll: Duration,
    ) -> Self {
        Self {
            frames,
            stop,
            poll,
            texture: None,
            status: "Waiting for camera...".to_string(),
        }
    }

    fn drain_frames(&mut self, ctx: &egui::Context) {
        let Some(latest) = self.frames.try_iter().last() else {
            return;
        };
        let size = [latest.image.width() as usize, latest.image.height() as usize];
        let color = egui::ColorImage::from_rgb(size, latest.image.as_raw());
        match self.texture.as_mut() {
            Some(texture) => texture.set(color, egui::TextureOptions::LINEAR),
            None => {
                self.texture =
                    Some(ctx.load_texture("visage-frame", color, egui::TextureOptions::LINEAR))
            }
        }
        self.status = format!("{} face(s), {} recognized", latest.faces, latest.known);
    }
}

/// True when any key went down this frame.
pub fn key_pressed(input: &egui::InputState) -> bool {
    input
        .events
        .iter()
        .any(|event| matches!(event, egui::Event::Key { pressed: true, .. }))
}

impl App for LiveViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        if ctx.input(key_pressed) {
            self.stop.store(true, Ordering::Relaxed);
            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            return;
        }

        self.drain_frames(ctx);

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(format!("{} - press any key to quit", self.status));
        });
        egui::CentralPanel::default().show(ctx, |ui| match self.texture.as_ref() {
            Some(texture) => {
                ui.add(egui::Image::new(texture).shrink_to_fit());
            }
            None => {
                ui.centered_and_justified(|ui| ui.spinner());
            }
        });

        ctx.request_repaint_after(self.poll);
    }
}

impl Drop for LiveViewer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_key_presses_close() {
        let mut input = egui::RawInput::default();
        input.events.push(egui::Event::PointerMoved(egui::pos2(1.0, 1.0)));
        let ctx = egui::Context::default();
        let mut pressed = None;
        let _ = ctx.run(input, |ctx| pressed = Some(ctx.input(key_pressed)));
        assert_eq!(pressed, Some(false));

        let mut input = egui::RawInput::default();
        input.events.push(egui::Event::Key {
            key: egui::Key::Q,
            physical_key: None,
            pressed: true,
            repeat: false,
            modifiers: egui::Modifiers::NONE,
        });
        let mut pressed = None;
        let _ = ctx.run(input, |ctx| pressed = Some(ctx.input(key_pressed)));
        assert_eq!(pressed, Some(true));
    }

    fn frame(faces: usize) -> ViewerFrame {
        ViewerFrame {
            image: RgbImage::new(2, 2),
            faces,
            known: 0,
        }
    }

    #[test]
    fn pending_frame_slot_holds_one_frame() {
        let (tx, rx) = mpsc::sync_channel(1);
        assert!(offer_frame(&tx, frame(1)));
        assert!(offer_frame(&tx, frame(2)));
        let pending: Vec<usize> = rx.try_iter().map(|f| f.faces).collect();
        assert_eq!(pending, vec![1]);

        drop(rx);
        assert!(!offer_frame(&tx, frame(3)));
    }

    #[test]
    fn dropping_viewer_sets_stop() {
        let (_tx, rx) = mpsc::sync_channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        drop(LiveViewer::new(rx, stop.clone(), Duration::from_millis(10)));
        assert!(stop.load(Ordering::Relaxed));
    }
}
