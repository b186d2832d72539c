use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};

use super::landmark::{HandLandmarks, PoseLandmarks};
use crate::camera::VideoFrame;

/// 1フレーム分の検出結果。空なら「未検出」（エラーではない）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detections {
    #[serde(default)]
    pub pose: Option<PoseLandmarks>,
    #[serde(default)]
    pub hands: Vec<HandLandmarks>,
}

impl Detections {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pose.is_none() && self.hands.is_empty()
    }
}

/// 外部のポーズ/ハンド検出器
pub trait LandmarkDetector: Send {
    /// `timestamp_ms` は呼び出しごとに単調増加する
    fn detect(&mut self, frame: &VideoFrame, timestamp_ms: u64) -> Result<Detections>;
}

/// 検出モデルの読み込み（数秒かかることがある）
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Box<dyn LandmarkDetector>>;
}

/// 前回値以下のタイムスタンプは前回 + 1 に繰り上げる
pub fn next_detector_timestamp(previous_ms: Option<u64>, requested_ms: u64) -> u64 {
    match previous_ms {
        Some(previous) if requested_ms <= previous => previous + 1,
        _ => requested_ms,
    }
}

/// 検出器と、最後に渡したタイムスタンプ。
/// モデルはセッションをまたいで共有されるので、単調増加もここで保証する
pub struct TimedDetector {
    inner: Box<dyn LandmarkDetector>,
    last_timestamp_ms: Option<u64>,
}

impl TimedDetector {
    pub fn new(inner: Box<dyn LandmarkDetector>) -> Self {
        Self { inner, last_timestamp_ms: None }
    }

    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.last_timestamp_ms
    }

    /// 実際に渡したタイムスタンプと検出結果を返す。
    /// 検出器が panic してもタイムスタンプは消費済みになる
    pub fn detect(&mut self, frame: &VideoFrame, requested_ms: u64) -> (u64, Result<Detections>) {
        let timestamp_ms = next_detector_timestamp(self.last_timestamp_ms, requested_ms);
        self.last_timestamp_ms = Some(timestamp_ms);
        (timestamp_ms, self.inner.detect(frame, timestamp_ms))
    }
}

pub type SharedDetector = Arc<Mutex<TimedDetector>>;

type LoadFuture = Shared<BoxFuture<'static, Result<SharedDetector, String>>>;

enum Slot {
    Empty,
    Loading { id: u64, future: LoadFuture },
    Ready(SharedDetector),
}

/// 読み込みが終わったらスロットを確定する。別の読み込みに置き換わっていれば何もしない
fn settle(slot: &Mutex<Slot>, id: u64, result: &Result<SharedDetector, String>) {
    let Ok(mut slot) = slot.lock() else { return };
    if !matches!(&*slot, Slot::Loading { id: current, .. } if *current == id) {
        return;
    }
    match result {
        Ok(detector) => {
            log::info!("Detection model loaded");
            *slot = Slot::Ready(Arc::clone(detector));
        }
        Err(e) => {
            log::warn!("Detection model failed to load: {}", e);
            *slot = Slot::Empty;
        }
    }
}

/// 読み込み済みモデルのキャッシュ。
///
/// 読み込みは別タスクで走り、待機側が全員同じ Shared future を待つので、
/// 同時に開いても読み込みは1回だけ。待機側がキャンセルされても読み込みは続き、
/// 結果はタスク自身がスロットに書き戻す。
/// 成功したモデルはキャッシュの寿命まで保持し、失敗は保持しない（次の open で再試行）。
pub struct ModelCache {
    slot: Arc<Mutex<Slot>>,
    next_id: AtomicUsize,
    loads_started: AtomicUsize,
}

impl ModelCache {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Empty)),
            next_id: AtomicUsize::new(0),
            loads_started: AtomicUsize::new(0),
        }
    }

    /// プロセス全体で共有されるキャッシュ（初回アクセス時に生成、破棄しない）
    pub fn global() -> Arc<ModelCache> {
        static GLOBAL: OnceLock<Arc<ModelCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ModelCache::new())))
    }

    /// 読み込み済みならそのモデル
    pub fn get(&self) -> Option<SharedDetector> {
        match &*self.slot.lock().ok()? {
            Slot::Ready(detector) => Some(Arc::clone(detector)),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.slot.lock().as_deref(), Ok(Slot::Loading { .. }))
    }

    /// `loader.load()` を実際に開始した回数
    pub fn loads_started(&self) -> usize {
        self.loads_started.load(Ordering::Acquire)
    }

    pub async fn get_or_load(&self, loader: Arc<dyn ModelLoader>) -> Result<SharedDetector> {
        let (id, future) = {
            let mut slot = self.slot.lock().map_err(|_| anyhow!("model cache lock poisoned"))?;
            match &*slot {
                Slot::Ready(detector) => return Ok(Arc::clone(detector)),
                // 失敗済みの future は再利用しない
                Slot::Loading { id, future } if !matches!(future.peek(), Some(Err(_))) => {
                    (*id, future.clone())
                }
                _ => {
                    let (id, future) = self.start_load(loader);
                    *slot = Slot::Loading { id, future: future.clone() };
                    (id, future)
                }
            }
        };

        let result = future.await;
        // タスクが panic した場合はここで確定する
        settle(&self.slot, id, &result);
        result.map_err(|e| anyhow!(e))
    }

    fn start_load(&self, loader: Arc<dyn ModelLoader>) -> (u64, LoadFuture) {
        let id = self.next_id.fetch_add(1, Ordering::AcqRel) as u64;
        self.loads_started.fetch_add(1, Ordering::AcqRel);
        log::info!("Loading detection model...");

        let slot = Arc::clone(&self.slot);
        let handle = tokio::spawn(async move {
            let result = match loader.load().await {
                Ok(detector) => Ok(Arc::new(Mutex::new(TimedDetector::new(detector)))),
                Err(e) => Err(format!("{:#}", e)),
            };
            settle(&slot, id, &result);
            result
        });
        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(format!("model load task failed: {}", e)),
            }
        }
        .boxed()
        .shared();

        (id, future)
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct NullDetector;

    impl LandmarkDetector for NullDetector {
        fn detect(&mut self, _frame: &VideoFrame, _timestamp_ms: u64) -> Result<Detections> {
            Ok(Detections::empty())
        }
    }

    struct SlowLoader {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ModelLoader for SlowLoader {
        async fn load(&self) -> Result<Box<dyn LandmarkDetector>> {
            let n = self.calls.fetch_add(1, Ordering::AcqRel);
            tokio::time::sleep(Duration::from_millis(500)).await;
            if self.fail_first && n == 0 {
                anyhow::bail!("model file missing");
            }
            Ok(Box::new(NullDetector))
        }
    }

    /// 渡されたタイムスタンプを記録し、単調増加でなければ失敗する
    struct StrictDetector {
        seen: Arc<Mutex<Vec<u64>>>,
    }

    impl LandmarkDetector for StrictDetector {
        fn detect(&mut self, _frame: &VideoFrame, timestamp_ms: u64) -> Result<Detections> {
            let mut seen = self.seen.lock().unwrap();
            if seen.last().is_some_and(|&last| timestamp_ms <= last) {
                anyhow::bail!("timestamp {} not increasing", timestamp_ms);
            }
            seen.push(timestamp_ms);
            Ok(Detections::empty())
        }
    }

    struct PanicDetector;

    impl LandmarkDetector for PanicDetector {
        fn detect(&mut self, _frame: &VideoFrame, _timestamp_ms: u64) -> Result<Detections> {
            panic!("inference crashed");
        }
    }

    #[test]
    fn test_next_detector_timestamp() {
        assert_eq!(next_detector_timestamp(None, 0), 0);
        assert_eq!(next_detector_timestamp(Some(0), 33), 33);
        assert_eq!(next_detector_timestamp(Some(33), 33), 34);
        assert_eq!(next_detector_timestamp(Some(50), 10), 51);
    }

    #[test]
    fn test_timestamps_continue_after_restart_from_zero() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut detector = TimedDetector::new(Box::new(StrictDetector { seen: seen.clone() }));
        let frame = VideoFrame::blank(4, 4, 0);

        for ms in [0, 33, 66] {
            assert!(detector.detect(&frame, ms).1.is_ok());
        }
        // 2回目のセッションはフレーム時刻が 0 から始まる
        let (ts, result) = detector.detect(&frame, 0);
        assert!(result.is_ok());
        assert_eq!(ts, 67);
        assert_eq!(detector.last_timestamp_ms(), Some(67));
        assert_eq!(*seen.lock().unwrap(), vec![0, 33, 66, 67]);
    }

    #[test]
    fn test_panicking_detector_still_consumes_timestamp() {
        let mut detector = TimedDetector::new(Box::new(PanicDetector));
        let frame = VideoFrame::blank(4, 4, 0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| detector.detect(&frame, 10)));
        assert!(result.is_err());
        assert_eq!(detector.last_timestamp_ms(), Some(10));
    }

    #[test]
    fn test_detections_empty() {
        assert!(Detections::empty().is_empty());
        let d = Detections {
            pose: Some(PoseLandmarks::default()),
            hands: vec![],
        };
        assert!(!d.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_future() {
        let cache = Arc::new(ModelCache::new());
        let loader = Arc::new(SlowLoader { calls: AtomicUsize::new(0), fail_first: false });

        let a = {
            let cache = Arc::clone(&cache);
            let loader: Arc<dyn ModelLoader> = loader.clone();
            tokio::spawn(async move { cache.get_or_load(loader).await.map(|_| ()) })
        };
        let b = {
            let cache = Arc::clone(&cache);
            let loader: Arc<dyn ModelLoader> = loader.clone();
            tokio::spawn(async move { cache.get_or_load(loader).await.map(|_| ()) })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();
        assert_eq!(loader.calls.load(Ordering::Acquire), 1);
        assert_eq!(cache.loads_started(), 1);
        assert!(cache.get().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loaded_model_is_reused() {
        let cache = ModelCache::new();
        let loader = Arc::new(SlowLoader { calls: AtomicUsize::new(0), fail_first: false });

        let first = cache.get_or_load(loader.clone()).await.unwrap();
        let second = cache.get_or_load(loader.clone()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.calls.load(Ordering::Acquire), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let cache = ModelCache::new();
        let loader = Arc::new(SlowLoader { calls: AtomicUsize::new(0), fail_first: true });

        let err = cache.get_or_load(loader.clone()).await.err().unwrap();
        assert!(err.to_string().contains("model file missing"));
        assert!(cache.get().is_none());
        assert!(!cache.is_loading());

        cache.get_or_load(loader.clone()).await.unwrap();
        assert_eq!(loader.calls.load(Ordering::Acquire), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_does_not_cancel_load() {
        let cache = Arc::new(ModelCache::new());
        let loader = Arc::new(SlowLoader { calls: AtomicUsize::new(0), fail_first: false });

        let waiter = {
            let cache = Arc::clone(&cache);
            let loader: Arc<dyn ModelLoader> = loader.clone();
            tokio::spawn(async move { cache.get_or_load(loader).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        waiter.abort();

        cache.get_or_load(loader.clone()).await.unwrap();
        assert_eq!(loader.calls.load(Ordering::Acquire), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_load_after_abandoned_waiter_is_retried() {
        let cache = Arc::new(ModelCache::new());
        let loader = Arc::new(SlowLoader { calls: AtomicUsize::new(0), fail_first: true });

        let waiter = {
            let cache = Arc::clone(&cache);
            let loader: Arc<dyn ModelLoader> = loader.clone();
            tokio::spawn(async move { cache.get_or_load(loader).await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        waiter.abort();

        // 待機側がいないまま読み込みが失敗する
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!cache.is_loading());

        cache.get_or_load(loader.clone()).await.unwrap();
        assert_eq!(loader.calls.load(Ordering::Acquire), 2);
        assert_eq!(cache.loads_started(), 2);
    }
}
