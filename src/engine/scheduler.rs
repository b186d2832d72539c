//! Detection loop scheduler.
//!
//! One `GuideEngine` owns at most one camera stream and one loop task. `open`
//! starts a session task that loads the model through the shared `ModelCache`,
//! then acquires the camera, then runs the frame loop paced by frame arrival.
//! `close` and mode changes cancel the session synchronously: the token is
//! cancelled, the task aborted and every camera track stopped before the call
//! returns. Anything a cancelled session produces afterwards is discarded.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;

use super::host::GuideHost;
use super::lifecycle::{Lifecycle, Session};
use super::state::{EngineState, StateMachine, Transition};
use super::stats::{EngineStats, StatsCollector};
use crate::camera::{Camera, TrackControl, VideoFrame};
use crate::config::Config;
use crate::error::EngineError;
use crate::guide::{FrameProcessor, Mode, VisitedCell, VisitedState, VisitedUpdate};
use crate::pose::{Detections, ModelCache, ModelLoader, SharedDetector};
use crate::render::{Canvas, OverlayRenderer, RenderInput};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// セッションの先頭フレームに対応する検出器タイムスタンプ。
/// 検出器は前のセッションから引き継がれるので、その続きから数える
fn session_timestamp_base(last_detector_ms: Option<u64>) -> u64 {
    last_detector_ms.map_or(0, |last| last + 1)
}

struct Inner {
    config: Config,
    cache: Arc<ModelCache>,
    loader: Arc<dyn ModelLoader>,
    camera: Arc<dyn Camera>,
    host: Arc<dyn GuideHost>,
    visited: VisitedCell,
    mode: Mutex<Mode>,
    lifecycle: Mutex<Lifecycle>,
    state: Mutex<StateMachine>,
    stats: StatsCollector,
    last_error: Mutex<Option<EngineError>>,
}

impl Inner {
    fn is_current(&self, session: &Session) -> bool {
        lock(&self.lifecycle).is_current(session)
    }

    /// 現在のセッションなら状態を進める
    fn advance(&self, session: &Session, to: EngineState, reason: &str) -> bool {
        let lifecycle = lock(&self.lifecycle);
        if !lifecycle.is_current(session) {
            log::trace!("Ignoring {} from stale session {}", to, session.generation);
            return false;
        }
        lock(&self.state).transition(to, reason).is_ok()
    }

    fn attach(&self, session: &Session, tracks: Arc<dyn TrackControl>) -> bool {
        lock(&self.lifecycle).attach_tracks(session, tracks)
    }

    /// ストリームが終わった（デバイス切断、ループの異常終了など）
    fn finish(&self, session: &Session, reason: &str) {
        let mut lifecycle = lock(&self.lifecycle);
        if !lifecycle.is_current(session) {
            return;
        }
        lifecycle.release_tracks();
        if let Err(e) = lock(&self.state).transition(EngineState::Stopped, reason) {
            log::debug!("{}", e);
        }
    }

    fn fail(&self, session: &Session, error: EngineError) {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if !lifecycle.is_current(session) {
                log::trace!("Dropping error from stale session {}: {}", session.generation, error);
                return;
            }
            lifecycle.release_tracks();
            if let Err(e) = lock(&self.state).transition(EngineState::Error, &error.to_string()) {
                log::debug!("{}", e);
            }
        }
        log::error!("{}", error);
        *lock(&self.last_error) = Some(error.clone());
        self.host.on_error(&error);
    }
}

/// 1セッション分のフレーム処理
struct FrameLoop<'a> {
    inner: &'a Inner,
    session: &'a Session,
    mode: Mode,
    detector: SharedDetector,
    processor: FrameProcessor,
    renderer: OverlayRenderer,
    canvas: Canvas,
    last_frame_us: Option<u64>,
    timestamp_base_ms: Option<u64>,
    started: Instant,
    running: bool,
}

impl<'a> FrameLoop<'a> {
    fn new(inner: &'a Inner, session: &'a Session, mode: Mode, detector: SharedDetector, (width, height): (u32, u32)) -> Self {
        Self {
            inner,
            session,
            mode,
            detector,
            processor: FrameProcessor::new(mode, &inner.config.guide),
            renderer: OverlayRenderer::default(),
            canvas: Canvas::new(width, height),
            last_frame_us: None,
            timestamp_base_ms: None,
            started: Instant::now(),
            running: false,
        }
    }

    fn tick(&mut self, video: &VideoFrame) {
        let inner = self.inner;
        inner.stats.frame_received();

        if !self.running {
            self.running = inner.advance(self.session, EngineState::Running, "first frame");
        }

        // 同じフレームの再配信は処理しない
        if self.last_frame_us == Some(video.timestamp_us) {
            inner.stats.frame_skipped();
            return;
        }
        self.last_frame_us = Some(video.timestamp_us);

        let visited = inner.visited.snapshot();
        let (timestamp_ms, detections) = self.detect(video);
        let outcome = match detections {
            Ok(detections) => {
                let processor = &mut self.processor;
                let processed = catch_unwind(AssertUnwindSafe(|| {
                    processor.process(&detections, video.width, video.height, timestamp_ms, &visited)
                }));
                match processed {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        log::error!("Frame processing panicked at {} ms", timestamp_ms);
                        inner.stats.detection_failed();
                        self.processor.degraded(video.width, video.height, timestamp_ms, &visited)
                    }
                }
            }
            Err(e) => {
                log::warn!("Detection failed at {} ms: {:#}", timestamp_ms, e);
                inner.stats.detection_failed();
                self.processor.degraded(video.width, video.height, timestamp_ms, &visited)
            }
        };

        // 検出中に close / 再起動されていたら結果を捨てる
        if !inner.is_current(self.session) {
            log::trace!("Discarding result from stale session {}", self.session.generation);
            return;
        }

        if let Some(delta) = outcome.delta {
            log::debug!("Newly aligned: {:?}", delta.names().collect::<Vec<_>>());
            inner.stats.delta_emitted();
            inner.host.on_update(self.mode, VisitedUpdate::Delta(delta));
        }

        if self.render(video, &outcome.frame, &visited) && inner.is_current(self.session) {
            inner.host.on_frame(&self.canvas);
        }
        inner.stats.frame_processed();
    }

    /// 実際に渡したタイムスタンプと検出結果
    fn detect(&mut self, video: &VideoFrame) -> (u64, anyhow::Result<Detections>) {
        let detector = &self.detector;
        let base = *self
            .timestamp_base_ms
            .get_or_insert_with(|| session_timestamp_base(lock(detector).last_timestamp_ms()));
        let requested = base + video.timestamp_us / 1000;
        catch_unwind(AssertUnwindSafe(|| lock(detector).detect(video, requested)))
            .unwrap_or_else(|_| (requested, Err(anyhow!("detector panicked"))))
    }

    /// 描画に失敗したら false（そのフレームは表示しない）
    fn render(&mut self, video: &VideoFrame, frame: &crate::guide::DetectionFrame, visited: &VisitedState) -> bool {
        let input = RenderInput {
            video: Some(video),
            frame,
            visited,
            time_secs: self.started.elapsed().as_secs_f64(),
        };
        let (renderer, canvas) = (&self.renderer, &mut self.canvas);
        match catch_unwind(AssertUnwindSafe(|| renderer.render(canvas, &input))) {
            Ok(()) => true,
            Err(_) => {
                log::error!("Overlay rendering panicked at {} ms", frame.timestamp_ms);
                false
            }
        }
    }
}

async fn run_session(inner: Arc<Inner>, session: Session, mode: Mode) {
    let token = session.token.clone();
    tokio::select! {
        _ = token.cancelled() => {
            log::debug!("Session {} cancelled", session.generation);
        }
        result = AssertUnwindSafe(drive(&inner, &session, mode)).catch_unwind() => match result {
            Ok(Ok(())) => inner.finish(&session, "camera stream ended"),
            Ok(Err(e)) => inner.fail(&session, e),
            Err(_) => {
                log::error!("[{}] session {} panicked", mode, session.generation);
                inner.finish(&session, "detection loop panicked");
            }
        }
    }
}

async fn drive(inner: &Inner, session: &Session, mode: Mode) -> Result<(), EngineError> {
    let detector = inner
        .cache
        .get_or_load(Arc::clone(&inner.loader))
        .await
        .map_err(|e| EngineError::ModelLoad(format!("{:#}", e)))?;

    if !inner.advance(session, EngineState::ModelsReady, "model ready") {
        return Ok(());
    }
    // モデルの準備ができてからカメラを要求する
    if !inner.advance(session, EngineState::CameraStarting, "requesting camera") {
        return Ok(());
    }

    let mut stream = inner.camera.start(&inner.config.camera.request()).await?;
    if !inner.attach(session, stream.tracks()) {
        return Ok(());
    }
    let resolution = stream.resolution();
    log::info!("[{}] camera stream {}x{}", mode, resolution.0, resolution.1);

    let mut frames = FrameLoop::new(inner, session, mode, detector, resolution);
    while let Some(video) = stream.next_frame().await {
        if !inner.is_current(session) {
            log::trace!("Discarding frame from stale session {}", session.generation);
            return Ok(());
        }
        frames.tick(&video);
    }

    log::warn!("[{}] camera stream ended", mode);
    Ok(())
}

pub struct EngineBuilder {
    config: Config,
    cache: Option<Arc<ModelCache>>,
    visited: Option<VisitedCell>,
    mode: Mode,
}

impl EngineBuilder {
    /// 既定はプロセス全体の ModelCache::global()
    pub fn cache(mut self, cache: Arc<ModelCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// ホストが値を書き込む VisitedCell
    pub fn visited(mut self, cell: VisitedCell) -> Self {
        self.visited = Some(cell);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn build(
        self,
        loader: Arc<dyn ModelLoader>,
        camera: Arc<dyn Camera>,
        host: Arc<dyn GuideHost>,
    ) -> GuideEngine {
        GuideEngine {
            inner: Arc::new(Inner {
                config: self.config,
                cache: self.cache.unwrap_or_else(ModelCache::global),
                loader,
                camera,
                host,
                visited: self.visited.unwrap_or_default(),
                mode: Mutex::new(self.mode),
                lifecycle: Mutex::new(Lifecycle::new()),
                state: Mutex::new(StateMachine::new()),
                stats: StatsCollector::new(),
                last_error: Mutex::new(None),
            }),
        }
    }
}

/// ガイドエンジン（複製してもすべて同じインスタンスを指す）
#[derive(Clone)]
pub struct GuideEngine {
    inner: Arc<Inner>,
}

impl GuideEngine {
    pub fn builder(config: Config) -> EngineBuilder {
        EngineBuilder {
            config,
            cache: None,
            visited: None,
            mode: Mode::Heart,
        }
    }

    /// セッションを開始する（既存のセッションは先に片付ける）。
    /// tokio ランタイム内から呼ぶこと
    pub fn open(&self, mode: Mode) {
        let inner = &self.inner;
        inner.host.on_mode(mode);

        let session = {
            let mut lifecycle = lock(&inner.lifecycle);
            let mut state = lock(&inner.state);
            if lifecycle.teardown() && state.state().is_active() {
                if let Err(e) = state.transition(EngineState::Stopped, "restart") {
                    log::debug!("{}", e);
                }
            }
            *lock(&inner.mode) = mode;
            *lock(&inner.last_error) = None;
            inner.stats.reset();

            let session = lifecycle.begin();
            if let Err(e) = state.transition(EngineState::LoadingModels, "open") {
                log::warn!("{}", e);
            }
            session
        };

        log::info!("[{}] opening guide session {}", mode, session.generation);
        let task = tokio::spawn(run_session(Arc::clone(inner), session.clone(), mode));
        lock(&inner.lifecycle).set_task(&session, task);
    }

    /// ループ停止・全トラック停止を同期的に行い、ホストに通知する
    pub fn close(&self) {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            let mut state = lock(&self.inner.state);
            lifecycle.teardown();
            if let Err(e) = state.transition(EngineState::Stopped, "close") {
                log::debug!("{}", e);
            }
        }
        log::info!("Guide closed");
        self.inner.host.on_close();
    }

    /// 実行中なら完全に再起動する
    pub fn set_mode(&self, mode: Mode) {
        let current = self.mode();
        if self.state().is_active() {
            if current != mode {
                log::info!("Mode change {} -> {}: restarting", current, mode);
                self.open(mode);
            }
        } else {
            *lock(&self.inner.mode) = mode;
            self.inner.host.on_mode(mode);
        }
    }

    /// 現在モードの訪問状態のクリアをホストに要求する（明示的な操作のみ）
    pub fn reset(&self) {
        let mode = self.mode();
        log::info!("[{}] reset visited points", mode);
        self.inner.host.on_update(mode, VisitedUpdate::Reset);
    }

    /// ホスト側の最新値を反映する
    pub fn set_visited(&self, state: VisitedState) {
        self.inner.visited.set(state);
    }

    pub fn visited_cell(&self) -> VisitedCell {
        self.inner.visited.clone()
    }

    pub fn mode(&self) -> Mode {
        *lock(&self.inner.mode)
    }

    pub fn state(&self) -> EngineState {
        lock(&self.inner.state).state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        lock(&self.inner.state).subscribe()
    }

    /// 条件を満たす状態になるまで待つ
    pub async fn wait_for_state(&self, accept: impl Fn(EngineState) -> bool) -> EngineState {
        let mut rx = self.subscribe_state();
        loop {
            let state = *rx.borrow_and_update();
            if accept(state) {
                return state;
            }
            if rx.changed().await.is_err() {
                return state;
            }
        }
    }

    pub fn history(&self, limit: usize) -> Vec<Transition> {
        lock(&self.inner.state).history(limit)
    }

    pub fn last_error(&self) -> Option<EngineError> {
        lock(&self.inner.last_error).clone()
    }

    pub fn stats(&self) -> EngineStats {
        self.inner.stats.snapshot()
    }

    /// 実行中で、直近にフレームが届いている
    pub fn is_healthy(&self) -> bool {
        if self.state() != EngineState::Running {
            return false;
        }
        let stale_after = self.inner.config.health.stale_after();
        matches!(self.stats().last_frame_age, Some(age) if age <= stale_after)
    }

    pub fn active_tracks(&self) -> usize {
        lock(&self.inner.lifecycle).active_tracks()
    }

    pub fn scheduled_loops(&self) -> usize {
        lock(&self.inner.lifecycle).scheduled_loops()
    }
}
