use crate::pose::PixelPoint;

use super::anatomy::TargetPoint;
use super::visited::VisitedState;

/// 手と聴診点の位置合わせ結果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProximityResult {
    /// targets と同じ並びの位置合わせフラグ
    pub aligned: Vec<bool>,
    /// (手のインデックス, 聴診点のインデックス)
    pub links: Vec<(usize, usize)>,
    /// 位置が合っていて未訪問の聴診点（order 昇順）
    pub newly_aligned: Vec<&'static str>,
    /// 未訪問で最小の order。全て訪問済みなら None
    pub active_order: Option<u32>,
}

impl ProximityResult {
    pub fn any_aligned(&self) -> bool {
        self.aligned.iter().any(|a| *a)
    }
}

/// 距離が閾値未満の手があれば位置合わせ成立。
/// 複数の手は OR、聴診点ごとに独立（1つの手が複数点を同時に満たしてよい）
pub fn match_targets(
    targets: &[TargetPoint],
    hands: &[PixelPoint],
    threshold: f64,
    visited: &VisitedState,
) -> ProximityResult {
    let mut aligned = vec![false; targets.len()];
    let mut links = Vec::new();

    for (ti, target) in targets.iter().enumerate() {
        for (hi, hand) in hands.iter().enumerate() {
            if hand.distance(&target.position) < threshold {
                aligned[ti] = true;
                links.push((hi, ti));
            }
        }
    }

    let mut newly: Vec<&TargetPoint> = targets
        .iter()
        .zip(aligned.iter())
        .filter(|(t, a)| **a && !visited.contains(t.name))
        .map(|(t, _)| t)
        .collect();
    newly.sort_by_key(|t| t.order);

    ProximityResult {
        aligned,
        links,
        newly_aligned: newly.into_iter().map(|t| t.name).collect(),
        active_order: active_order(targets, visited),
    }
}

/// 未訪問の聴診点のうち order が最小のもの
pub fn active_target<'a>(targets: &'a [TargetPoint], visited: &VisitedState) -> Option<&'a TargetPoint> {
    targets
        .iter()
        .filter(|t| !visited.contains(t.name))
        .min_by_key(|t| t.order)
}

pub fn active_order(targets: &[TargetPoint], visited: &VisitedState) -> Option<u32> {
    active_target(targets, visited).map(|t| t.order)
}
