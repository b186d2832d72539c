//! Visited-state update protocol.
//!
//! The engine never owns or mutates the visited set. Each frame it may emit one
//! `VisitedUpdate` to the host, which merges it into its own state and publishes
//! the result back through a `VisitedCell` that the frame loop reads every tick.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::Mode;

/// 訪問済み聴診点の集合（ホスト所有、モードごとに1つ）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitedState {
    names: BTreeSet<String>,
}

impl VisitedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// `state = {...state, ...delta}` 相当。true を足すだけなので何度適用しても同じ
    pub fn merge(&mut self, delta: &VisitedDelta) {
        self.names.extend(delta.names.iter().cloned());
    }

    pub fn apply(&mut self, update: &VisitedUpdate) {
        match update {
            VisitedUpdate::Delta(delta) => self.merge(delta),
            VisitedUpdate::Reset => self.names.clear(),
        }
    }
}

impl<'a> FromIterator<&'a str> for VisitedState {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(str::to_string).collect(),
        }
    }
}

impl FromIterator<String> for VisitedState {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

/// 1フレームで新たに位置が合った未訪問の聴診点（name → true）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitedDelta {
    names: BTreeSet<String>,
}

impl VisitedDelta {
    /// 遷移が無ければ None（冗長な通知をしない）
    pub fn compute(newly_aligned: &[&str], visited: &VisitedState) -> Option<Self> {
        let names: BTreeSet<String> = newly_aligned
            .iter()
            .filter(|name| !visited.contains(name))
            .map(|name| name.to_string())
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(Self { names })
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn to_map(&self) -> BTreeMap<String, bool> {
        self.names.iter().map(|n| (n.clone(), true)).collect()
    }
}

/// ホストへの更新要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitedUpdate {
    Delta(VisitedDelta),
    /// 明示的なユーザー操作でのみ発行
    Reset,
}

/// ホストの最新スナップショットへの間接参照。
/// フレームループはクロージャに値を閉じ込めず、毎フレームここから読む
#[derive(Debug, Clone)]
pub struct VisitedCell {
    tx: Arc<watch::Sender<VisitedState>>,
}

impl VisitedCell {
    pub fn new(initial: VisitedState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// ホスト側の値が変わるたびに同期的に呼ぶ
    pub fn set(&self, state: VisitedState) {
        self.tx.send_replace(state);
    }

    pub fn snapshot(&self) -> VisitedState {
        self.tx.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&VisitedState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<VisitedState> {
        self.tx.subscribe()
    }
}

impl Default for VisitedCell {
    fn default() -> Self {
        Self::new(VisitedState::new())
    }
}

/// ホスト側の訪問状態（モードごとに独立）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitedBook {
    heart: VisitedState,
    lung: VisitedState,
}

impl VisitedBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mode: Mode) -> &VisitedState {
        match mode {
            Mode::Heart => &self.heart,
            Mode::Lung => &self.lung,
        }
    }

    /// 指定モードの状態だけを更新し、更新後の値を返す
    pub fn apply(&mut self, mode: Mode, update: &VisitedUpdate) -> &VisitedState {
        let state = match mode {
            Mode::Heart => &mut self.heart,
            Mode::Lung => &mut self.lung,
        };
        state.apply(update);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(names: &[&str]) -> VisitedDelta {
        VisitedDelta::compute(names, &VisitedState::new()).unwrap()
    }

    #[test]
    fn test_delta_excludes_visited() {
        let visited: VisitedState = ["Aortic"].into_iter().collect();
        let d = VisitedDelta::compute(&["Aortic", "Pulmonic"], &visited).unwrap();
        assert_eq!(d.len(), 1);
        assert!(d.contains("Pulmonic"));
        assert_eq!(d.to_map().get("Pulmonic"), Some(&true));
    }

    #[test]
    fn test_no_delta_without_transition() {
        let visited: VisitedState = ["Aortic"].into_iter().collect();
        assert!(VisitedDelta::compute(&[], &visited).is_none());
        assert!(VisitedDelta::compute(&["Aortic"], &visited).is_none());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let d = delta(&["Aortic", "Mitral"]);
        let mut once = VisitedState::new();
        once.merge(&d);
        let mut twice = once.clone();
        twice.merge(&d);
        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn test_reset_clears_any_history() {
        let mut state = VisitedState::new();
        state.apply(&VisitedUpdate::Delta(delta(&["Aortic"])));
        state.apply(&VisitedUpdate::Delta(delta(&["Pulmonic", "Mitral"])));
        state.apply(&VisitedUpdate::Reset);
        assert!(state.is_empty());

        let mut empty = VisitedState::new();
        empty.apply(&VisitedUpdate::Reset);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_book_isolates_modes() {
        let mut book = VisitedBook::new();
        book.apply(Mode::Lung, &VisitedUpdate::Delta(delta(&["Right Apex"])));
        let lung_before = book.get(Mode::Lung).clone();

        book.apply(Mode::Heart, &VisitedUpdate::Delta(delta(&["Aortic"])));
        book.apply(Mode::Heart, &VisitedUpdate::Reset);

        assert_eq!(book.get(Mode::Lung), &lung_before);
        assert!(book.get(Mode::Heart).is_empty());
    }

    #[test]
    fn test_cell_reads_latest_value() {
        let cell = VisitedCell::default();
        let reader = cell.clone();
        assert!(reader.snapshot().is_empty());

        cell.set(["Aortic"].into_iter().collect());
        assert!(reader.with(|s| s.contains("Aortic")));
        assert!(reader.subscribe().borrow().contains("Aortic"));
    }
}
