//! Test-pattern camera paced by a tokio interval.
//!
//! Used by the console binary and by tests. Every started stream registers its
//! track in a shared counter so callers can assert that nothing outlives a
//! teardown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Interval, MissedTickBehavior};

use super::{Camera, CameraRequest, CameraStream, TrackControl, VideoFrame};
use crate::error::CameraError;

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;

pub struct SyntheticCamera {
    width: u32,
    height: u32,
    fps: u32,
    start_delay: Option<Duration>,
    failure: Option<CameraError>,
    duplicate_frames: bool,
    live_tracks: Arc<AtomicUsize>,
    start_calls: AtomicUsize,
    streams: Mutex<Vec<Arc<SyntheticTrack>>>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps: fps.max(1),
            start_delay: None,
            failure: None,
            duplicate_frames: false,
            live_tracks: Arc::new(AtomicUsize::new(0)),
            start_calls: AtomicUsize::new(0),
            streams: Mutex::new(Vec::new()),
        }
    }

    /// 起動までの遅延（許可待ちの再現）
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// 起動を常に失敗させる
    pub fn with_failure(mut self, error: CameraError) -> Self {
        self.failure = Some(error);
        self
    }

    /// 各フレームを同じタイムスタンプで2回配信する
    pub fn with_duplicate_frames(mut self) -> Self {
        self.duplicate_frames = true;
        self
    }

    /// 全ストリーム合計の生存トラック数
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::Acquire)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::Acquire)
    }

    /// 発行済みトラックを全停止（デバイス切断の再現）
    pub fn disconnect_all(&self) {
        if let Ok(streams) = self.streams.lock() {
            for track in streams.iter() {
                track.stop_all();
            }
        }
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT, DEFAULT_FPS)
    }
}

#[async_trait]
impl Camera for SyntheticCamera {
    async fn start(&self, request: &CameraRequest) -> Result<Box<dyn CameraStream>, CameraError> {
        self.start_calls.fetch_add(1, Ordering::AcqRel);

        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let width = request.width.unwrap_or(self.width);
        let height = request.height.unwrap_or(self.height);
        let fps = request.fps.unwrap_or(self.fps).max(1);

        let track = Arc::new(SyntheticTrack {
            stopped: AtomicBool::new(false),
            registry: Arc::clone(&self.live_tracks),
        });
        self.live_tracks.fetch_add(1, Ordering::AcqRel);
        if let Ok(mut streams) = self.streams.lock() {
            streams.retain(|t| !t.stopped.load(Ordering::Acquire));
            streams.push(Arc::clone(&track));
        }

        let period = Duration::from_micros(1_000_000 / fps as u64);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Box::new(SyntheticStream {
            width,
            height,
            period_us: period.as_micros() as u64,
            interval,
            frame_index: 0,
            pending_duplicate: None,
            duplicate_frames: self.duplicate_frames,
            pattern: Arc::new(test_pattern(width, height)),
            track,
        }))
    }
}

struct SyntheticTrack {
    stopped: AtomicBool,
    registry: Arc<AtomicUsize>,
}

impl TrackControl for SyntheticTrack {
    fn stop_all(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.registry.fetch_sub(1, Ordering::AcqRel);
        }
    }

    fn live_tracks(&self) -> usize {
        if self.stopped.load(Ordering::Acquire) { 0 } else { 1 }
    }
}

struct SyntheticStream {
    width: u32,
    height: u32,
    period_us: u64,
    interval: Interval,
    frame_index: u64,
    pending_duplicate: Option<VideoFrame>,
    duplicate_frames: bool,
    pattern: Arc<Vec<u32>>,
    track: Arc<SyntheticTrack>,
}

#[async_trait]
impl CameraStream for SyntheticStream {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn next_frame(&mut self) -> Option<VideoFrame> {
        if self.track.stopped.load(Ordering::Acquire) {
            return None;
        }
        if let Some(frame) = self.pending_duplicate.take() {
            return Some(frame);
        }

        self.interval.tick().await;
        if self.track.stopped.load(Ordering::Acquire) {
            return None;
        }

        let frame = VideoFrame::new(
            self.width,
            self.height,
            self.frame_index * self.period_us,
            Arc::clone(&self.pattern),
        );
        self.frame_index += 1;
        if self.duplicate_frames {
            self.pending_duplicate = Some(frame.clone());
        }
        Some(frame)
    }

    fn tracks(&self) -> Arc<dyn TrackControl> {
        self.track.clone()
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        self.track.stop_all();
    }
}

/// 縦グラデーション
fn test_pattern(width: u32, height: u32) -> Vec<u32> {
    let mut pixels = vec![0u32; width as usize * height as usize];
    for y in 0..height as usize {
        let level = if height > 1 { (y * 96 / (height as usize - 1)) as u32 } else { 0 };
        let color = (level << 16) | (level << 8) | (level + 32).min(255);
        let row = &mut pixels[y * width as usize..(y + 1) * width as usize];
        row.fill(color);
    }
    pixels
}
