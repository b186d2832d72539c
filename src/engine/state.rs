use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local};
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

/// 検出ループのライフサイクル状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Uninitialized,
    LoadingModels,
    ModelsReady,
    CameraStarting,
    Running,
    Stopped,
    Error,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Uninitialized => "UNINITIALIZED",
            EngineState::LoadingModels => "LOADING_MODELS",
            EngineState::ModelsReady => "MODELS_READY",
            EngineState::CameraStarting => "CAMERA_STARTING",
            EngineState::Running => "RUNNING",
            EngineState::Stopped => "STOPPED",
            EngineState::Error => "ERROR",
        }
    }

    /// セッションが生きている（モデル読み込み〜実行中）
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            EngineState::LoadingModels
                | EngineState::ModelsReady
                | EngineState::CameraStarting
                | EngineState::Running
        )
    }

    pub fn can_transition_to(&self, to: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, to),
            (Uninitialized, LoadingModels)
                | (Uninitialized, Stopped)
                | (LoadingModels, ModelsReady)
                | (LoadingModels, Error)
                | (LoadingModels, Stopped)
                | (ModelsReady, CameraStarting)
                | (ModelsReady, Stopped)
                | (CameraStarting, Running)
                | (CameraStarting, Error)
                | (CameraStarting, Stopped)
                | (Running, Stopped)
                | (Stopped, LoadingModels)
                | (Error, LoadingModels)
                | (Error, Stopped)
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid state transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: EngineState,
    pub to: EngineState,
}

/// 遷移履歴の1件
#[derive(Debug, Clone)]
pub struct Transition {
    pub from: EngineState,
    pub to: EngineState,
    pub at: DateTime<Local>,
    pub reason: String,
}

const HISTORY_CAPACITY: usize = 100;

/// 遷移の検証と履歴、watch チャネルでの通知
pub struct StateMachine {
    tx: watch::Sender<EngineState>,
    history: VecDeque<Transition>,
    entered: Instant,
}

impl StateMachine {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(EngineState::Uninitialized);
        Self {
            tx,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            entered: Instant::now(),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.tx.subscribe()
    }

    /// 同じ状態への遷移は何もしない
    pub fn transition(&mut self, to: EngineState, reason: &str) -> Result<(), InvalidTransition> {
        let from = self.state();
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            log::warn!("Rejected state transition {} -> {} ({})", from, to, reason);
            return Err(InvalidTransition { from, to });
        }

        log::info!("State: {} -> {} ({})", from, to, reason);
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(Transition {
            from,
            to,
            at: Local::now(),
            reason: reason.to_string(),
        });
        self.entered = Instant::now();
        self.tx.send_replace(to);
        Ok(())
    }

    /// 新しいものから最大 limit 件（古い順に並べて返す）
    pub fn history(&self, limit: usize) -> Vec<Transition> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }

    pub fn time_in_state(&self) -> Duration {
        self.entered.elapsed()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
