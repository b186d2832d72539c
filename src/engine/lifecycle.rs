use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::camera::TrackControl;

/// 1回の open に対応するセッション券
#[derive(Debug, Clone)]
pub struct Session {
    pub generation: u64,
    pub token: CancellationToken,
}

/// カメラトラックとループタスクの所有者。
/// インスタンスごとにストリーム1本・ループ1本まで
#[derive(Default)]
pub struct Lifecycle {
    generation: u64,
    token: Option<CancellationToken>,
    tracks: Option<Arc<dyn TrackControl>>,
    task: Option<JoinHandle<()>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// 既存のセッションを片付けてから新しいセッションを始める
    pub fn begin(&mut self) -> Session {
        self.teardown();
        self.generation += 1;
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        Session {
            generation: self.generation,
            token,
        }
    }

    pub fn is_current(&self, session: &Session) -> bool {
        session.generation == self.generation && !session.token.is_cancelled()
    }

    pub fn set_task(&mut self, session: &Session, task: JoinHandle<()>) {
        if self.is_current(session) {
            self.task = Some(task);
        } else {
            task.abort();
        }
    }

    /// 取得したストリームのトラックを登録する。
    /// 古いセッションのものなら即停止して false
    pub fn attach_tracks(&mut self, session: &Session, tracks: Arc<dyn TrackControl>) -> bool {
        if !self.is_current(session) {
            log::debug!("Discarding camera stream from stale session {}", session.generation);
            tracks.stop_all();
            return false;
        }
        if let Some(previous) = self.tracks.replace(tracks) {
            log::warn!("Replacing a camera stream that was still attached");
            previous.stop_all();
        }
        true
    }

    /// トラックだけ停止（ストリーム終了・エラー時）
    pub fn release_tracks(&mut self) {
        if let Some(tracks) = self.tracks.take() {
            tracks.stop_all();
        }
    }

    /// キャンセル → タスク中断 → 全トラック停止（同期的に完了する）
    pub fn teardown(&mut self) -> bool {
        let mut stopped = false;
        if let Some(token) = self.token.take() {
            token.cancel();
            stopped = true;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.release_tracks();
        stopped
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.as_ref().map(|t| t.live_tracks()).unwrap_or(0)
    }

    pub fn scheduled_loops(&self) -> usize {
        match &self.task {
            Some(task) if !task.is_finished() => 1,
            _ => 0,
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTracks {
        live: AtomicUsize,
    }

    impl CountingTracks {
        fn started() -> Arc<Self> {
            Arc::new(Self { live: AtomicUsize::new(1) })
        }
    }

    impl TrackControl for CountingTracks {
        fn stop_all(&self) {
            self.live.store(0, Ordering::SeqCst);
        }

        fn live_tracks(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_begin_cancels_previous_session() {
        let mut lc = Lifecycle::new();
        let first = lc.begin();
        let second = lc.begin();
        assert!(first.token.is_cancelled());
        assert!(!lc.is_current(&first));
        assert!(lc.is_current(&second));
        assert_eq!(lc.generation(), 2);
    }

    #[test]
    fn test_stale_tracks_are_stopped() {
        let mut lc = Lifecycle::new();
        let stale = lc.begin();
        lc.teardown();
        let tracks = CountingTracks::started();
        assert!(!lc.attach_tracks(&stale, tracks.clone()));
        assert_eq!(tracks.live_tracks(), 0);
        assert_eq!(lc.active_tracks(), 0);
    }

    #[test]
    fn test_teardown_stops_tracks() {
        let mut lc = Lifecycle::new();
        let session = lc.begin();
        let tracks = CountingTracks::started();
        assert!(lc.attach_tracks(&session, tracks.clone()));
        assert_eq!(lc.active_tracks(), 1);

        assert!(lc.teardown());
        assert_eq!(tracks.live_tracks(), 0);
        assert!(session.token.is_cancelled());
        assert!(!lc.teardown());
    }

    #[test]
    fn test_second_stream_replaces_first() {
        let mut lc = Lifecycle::new();
        let session = lc.begin();
        let a = CountingTracks::started();
        let b = CountingTracks::started();
        lc.attach_tracks(&session, a.clone());
        lc.attach_tracks(&session, b.clone());
        assert_eq!(a.live_tracks(), 0);
        assert_eq!(lc.active_tracks(), 1);
    }

    #[tokio::test]
    async fn test_teardown_aborts_task() {
        let mut lc = Lifecycle::new();
        let session = lc.begin();
        let task = tokio::spawn(std::future::pending::<()>());
        lc.set_task(&session, task);
        assert_eq!(lc.scheduled_loops(), 1);
        lc.teardown();
        assert_eq!(lc.scheduled_loops(), 0);
    }
}
