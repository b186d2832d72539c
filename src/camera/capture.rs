use anyhow::{Context, Result};
use async_trait::async_trait;
use opencv::{
    core::{Mat, Vec3b},
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tokio::sync::mpsc;

use super::{Camera, CameraRequest, CameraStream, TrackControl, VideoFrame};
use crate::error::CameraError;

/// OpenCVを使用したカメラ（起動ごとにデバイスを開き直す）
pub struct OpenCvCamera {
    live: Arc<AtomicUsize>,
}

impl OpenCvCamera {
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn live_tracks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl Default for OpenCvCamera {
    fn default() -> Self {
        Self::new()
    }
}

/// 解像度とFPSを指定してデバイスを開く
fn open_capture(request: &CameraRequest) -> Result<(VideoCapture, u32, u32)> {
    let index = request.device.unwrap_or(0);
    let mut capture =
        VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).context("Failed to open camera")?;

    if !capture.is_opened()? {
        anyhow::bail!("Camera {} is not available", index);
    }

    if let Some(w) = request.width {
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
    }
    if let Some(h) = request.height {
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
    }
    if let Some(f) = request.fps {
        capture.set(videoio::CAP_PROP_FPS, f as f64)?;
    }
    capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

    let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
    let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
    log::info!(
        "Camera {} opened: {}x{} @ {} fps",
        index,
        width,
        height,
        capture.get(videoio::CAP_PROP_FPS)?
    );
    Ok((capture, width, height))
}

/// BGR Mat → XRGB u32
fn mat_to_pixels(frame: &Mat) -> Result<Vec<u32>> {
    let rows = frame.rows();
    let cols = frame.cols();
    let mut pixels = Vec::with_capacity((rows * cols).max(0) as usize);
    for y in 0..rows {
        for x in 0..cols {
            let pixel = frame.at_2d::<Vec3b>(y, x)?;
            let r = pixel[2] as u32;
            let g = pixel[1] as u32;
            let b = pixel[0] as u32;
            pixels.push((r << 16) | (g << 8) | b);
        }
    }
    Ok(pixels)
}

struct CaptureTrack {
    running: AtomicBool,
    live: Arc<AtomicUsize>,
}

impl TrackControl for CaptureTrack {
    fn stop_all(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
            log::debug!("Camera track stopped");
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.running.load(Ordering::SeqCst))
    }
}

/// 別スレッドでキャプチャし、最新フレームだけをチャネルに流す
struct CaptureStream {
    rx: mpsc::Receiver<VideoFrame>,
    track: Arc<CaptureTrack>,
    width: u32,
    height: u32,
}

#[async_trait]
impl CameraStream for CaptureStream {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn next_frame(&mut self) -> Option<VideoFrame> {
        if !self.track.running.load(Ordering::SeqCst) {
            return None;
        }
        self.rx.recv().await
    }

    fn tracks(&self) -> Arc<dyn TrackControl> {
        self.track.clone()
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.track.stop_all();
    }
}

#[async_trait]
impl Camera for OpenCvCamera {
    async fn start(&self, request: &CameraRequest) -> Result<Box<dyn CameraStream>, CameraError> {
        let req = request.clone();
        let opened = tokio::task::spawn_blocking(move || open_capture(&req))
            .await
            .map_err(|e| CameraError::Other(e.to_string()))?;
        let (mut capture, width, height) =
            opened.map_err(|e| CameraError::classify(&format!("{:#}", e)))?;

        let track = Arc::new(CaptureTrack {
            running: AtomicBool::new(true),
            live: self.live.clone(),
        });
        self.live.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(1);
        let thread_track = track.clone();
        thread::spawn(move || {
            let started = Instant::now();
            let mut frame = Mat::default();
            while thread_track.running.load(Ordering::SeqCst) {
                match capture.read(&mut frame) {
                    Ok(true) if !frame.empty() => {}
                    Ok(_) => continue,
                    Err(e) => {
                        log::warn!("Failed to read frame: {}", e);
                        break;
                    }
                }
                let pixels = match mat_to_pixels(&frame) {
                    Ok(p) => p,
                    Err(e) => {
                        log::warn!("Failed to convert frame: {:#}", e);
                        continue;
                    }
                };
                let timestamp_us = started.elapsed().as_micros() as u64;
                let video = VideoFrame::new(frame.cols() as u32, frame.rows() as u32, timestamp_us, Arc::new(pixels));
                // 受信側が追いつかないフレームは捨てる
                if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(video) {
                    break;
                }
            }
            thread_track.stop_all();
            if let Err(e) = capture.release() {
                log::warn!("Failed to release camera: {}", e);
            }
        });

        Ok(Box::new(CaptureStream {
            rx,
            track,
            width,
            height,
        }))
    }
}
