use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::time::{Duration, Instant};

/// FPS 計算に使う直近フレーム数
const FPS_WINDOW: usize = 30;

/// ループの統計（スナップショット）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineStats {
    pub frames_received: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub detection_failures: u64,
    pub deltas_emitted: u64,
    pub average_fps: f64,
    /// 最後にフレームを受け取ってからの時間
    pub last_frame_age: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    frames_received: u64,
    frames_processed: u64,
    frames_skipped: u64,
    detection_failures: u64,
    deltas_emitted: u64,
    processed_at: VecDeque<Instant>,
    last_frame: Option<Instant>,
}

#[derive(Default)]
pub struct StatsCollector {
    counters: Mutex<Counters>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut Counters)) {
        if let Ok(mut c) = self.counters.lock() {
            f(&mut c);
        }
    }

    pub fn frame_received(&self) {
        self.update(|c| {
            c.frames_received += 1;
            c.last_frame = Some(Instant::now());
        });
    }

    pub fn frame_skipped(&self) {
        self.update(|c| c.frames_skipped += 1);
    }

    pub fn frame_processed(&self) {
        self.update(|c| {
            c.frames_processed += 1;
            if c.processed_at.len() == FPS_WINDOW {
                c.processed_at.pop_front();
            }
            c.processed_at.push_back(Instant::now());
        });
    }

    pub fn detection_failed(&self) {
        self.update(|c| c.detection_failures += 1);
    }

    pub fn delta_emitted(&self) {
        self.update(|c| c.deltas_emitted += 1);
    }

    pub fn reset(&self) {
        self.update(|c| *c = Counters::default());
    }

    pub fn snapshot(&self) -> EngineStats {
        let Ok(c) = self.counters.lock() else {
            return EngineStats::default();
        };
        let average_fps = match (c.processed_at.front(), c.processed_at.back()) {
            (Some(first), Some(last)) if c.processed_at.len() > 1 => {
                let span = last.duration_since(*first).as_secs_f64();
                if span > 0.0 {
                    (c.processed_at.len() - 1) as f64 / span
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };
        EngineStats {
            frames_received: c.frames_received,
            frames_processed: c.frames_processed,
            frames_skipped: c.frames_skipped,
            detection_failures: c.detection_failures,
            deltas_emitted: c.deltas_emitted,
            average_fps,
            last_frame_age: c.last_frame.map(|t| t.elapsed()),
        }
    }
}
