//! Replays landmark recordings as a detection model.
//!
//! A recording is JSON Lines, one `Detections` object per line:
//! `{"pose": {"landmarks": [{"x":0.4,"y":0.3,"visibility":0.9}, ...]}, "hands": []}`.
//! Blank lines and lines starting with `#` are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use super::detector::{Detections, LandmarkDetector, ModelLoader};
use crate::camera::VideoFrame;

/// 録画済みの検出結果を順番に返す検出器（末尾に達したら先頭に戻る）
pub struct RecordedDetector {
    frames: Vec<Detections>,
    cursor: usize,
    last_timestamp: Option<u64>,
}

impl RecordedDetector {
    pub fn new(frames: Vec<Detections>) -> Self {
        Self {
            frames,
            cursor: 0,
            last_timestamp: None,
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut frames = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let detections: Detections = serde_json::from_str(line)
                .with_context(|| format!("invalid recording line {}", lineno + 1))?;
            frames.push(detections);
        }
        Ok(Self::new(frames))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recording {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl LandmarkDetector for RecordedDetector {
    fn detect(&mut self, _frame: &VideoFrame, timestamp_ms: u64) -> Result<Detections> {
        if let Some(last) = self.last_timestamp {
            if timestamp_ms <= last {
                bail!("timestamp {} is not after previous {}", timestamp_ms, last);
            }
        }
        self.last_timestamp = Some(timestamp_ms);

        if self.frames.is_empty() {
            return Ok(Detections::empty());
        }
        let detections = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(detections)
    }
}

/// 録画ファイルを「モデル」として読み込むローダー
pub struct ReplayLoader {
    source: ReplaySource,
    load_delay: Duration,
}

enum ReplaySource {
    File(PathBuf),
    Frames(Vec<Detections>),
}

impl ReplayLoader {
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            source: ReplaySource::File(path.into()),
            load_delay: Duration::ZERO,
        }
    }

    pub fn from_frames(frames: Vec<Detections>) -> Self {
        Self {
            source: ReplaySource::Frames(frames),
            load_delay: Duration::ZERO,
        }
    }

    /// 読み込み時間の再現
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }
}

#[async_trait]
impl ModelLoader for ReplayLoader {
    async fn load(&self) -> Result<Box<dyn LandmarkDetector>> {
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        let detector = match &self.source {
            ReplaySource::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || RecordedDetector::load(path))
                    .await
                    .context("recording loader task failed")??
            }
            ReplaySource::Frames(frames) => RecordedDetector::new(frames.clone()),
        };
        log::info!("Replay detector ready ({} frames)", detector.len());
        Ok(Box::new(detector))
    }
}
