use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::EngineError;
use crate::guide::{Mode, VisitedBook, VisitedCell, VisitedState, VisitedUpdate};
use crate::render::Canvas;

/// エンジンを組み込む側（訪問状態の持ち主）
pub trait GuideHost: Send + Sync {
    /// 訪問状態の更新要求。フレームごとに最大1回
    fn on_update(&self, mode: Mode, update: VisitedUpdate);

    fn on_close(&self) {}

    /// セッション開始時、ループより先に呼ばれる
    fn on_mode(&self, _mode: Mode) {}

    fn on_frame(&self, _canvas: &Canvas) {}

    fn on_error(&self, _error: &EngineError) {}
}

/// モードごとの訪問状態を持ち、現在モードの値を VisitedCell に公開するホスト
pub struct BookHost {
    book: Mutex<VisitedBook>,
    current: Mutex<Mode>,
    cell: VisitedCell,
    updates: AtomicUsize,
    frames: AtomicU64,
    closes: AtomicUsize,
    last_error: Mutex<Option<EngineError>>,
}

impl BookHost {
    pub fn new(cell: VisitedCell, mode: Mode) -> Self {
        Self {
            book: Mutex::new(VisitedBook::new()),
            current: Mutex::new(mode),
            cell,
            updates: AtomicUsize::new(0),
            frames: AtomicU64::new(0),
            closes: AtomicUsize::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn visited(&self, mode: Mode) -> VisitedState {
        self.book
            .lock()
            .map(|book| book.get(mode).clone())
            .unwrap_or_default()
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<EngineError> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    fn publish(&self, mode: Mode) {
        let current = self.current.lock().map(|m| *m).unwrap_or(mode);
        if current == mode {
            self.cell.set(self.visited(mode));
        }
    }
}

impl GuideHost for BookHost {
    fn on_update(&self, mode: Mode, update: VisitedUpdate) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut book) = self.book.lock() {
            let state = book.apply(mode, &update);
            log::info!("[{}] visited {}/{}", mode, state.len(), mode.targets().len());
        }
        self.publish(mode);
    }

    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_mode(&self, mode: Mode) {
        if let Ok(mut current) = self.current.lock() {
            *current = mode;
        }
        self.publish(mode);
    }

    fn on_frame(&self, _canvas: &Canvas) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, error: &EngineError) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guide::VisitedDelta;

    fn delta(names: &[&str]) -> VisitedUpdate {
        VisitedUpdate::Delta(VisitedDelta::compute(names, &VisitedState::new()).unwrap())
    }

    #[test]
    fn test_updates_publish_current_mode() {
        let cell = VisitedCell::default();
        let host = BookHost::new(cell.clone(), Mode::Heart);
        host.on_update(Mode::Heart, delta(&["Aortic"]));
        assert!(cell.snapshot().contains("Aortic"));
        assert_eq!(host.updates(), 1);
    }

    #[test]
    fn test_mode_switch_publishes_that_modes_state() {
        let cell = VisitedCell::default();
        let host = BookHost::new(cell.clone(), Mode::Lung);
        host.on_update(Mode::Lung, delta(&["Right Apex"]));

        host.on_mode(Mode::Heart);
        assert!(cell.snapshot().is_empty());
        host.on_update(Mode::Heart, VisitedUpdate::Reset);

        host.on_mode(Mode::Lung);
        assert!(cell.snapshot().contains("Right Apex"));
        assert!(host.visited(Mode::Heart).is_empty());
    }
}
