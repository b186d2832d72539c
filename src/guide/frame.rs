use crate::config::GuideConfig;
use crate::pose::{Detections, PixelPoint, PoseLandmarkIndex};

use super::anatomy::{compute_targets, AnchorSet, AnchorTracker, TargetPoint};
use super::proximity::{match_targets, ProximityResult};
use super::visited::{VisitedDelta, VisitedState};
use super::Mode;

/// 手の位置（固定ハンドランドマークのピクセル座標）
pub type HandPosition = PixelPoint;

/// 同時に扱う手の最大数
pub const MAX_HANDS: usize = 2;

/// 1フレーム分の計算結果（描画に渡す、保存しない）
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFrame {
    pub mode: Mode,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: u64,
    /// None なら「体が映っていない」
    pub anchors: Option<AnchorSet>,
    pub targets: Vec<TargetPoint>,
    pub hands: Vec<HandPosition>,
    pub active_order: Option<u32>,
    pub proximity: ProximityResult,
    /// ポーズ全点（可視度不足は None）。ポーズ未検出なら空
    pub pose_points: Vec<Option<PixelPoint>>,
    /// 手ごとの全ランドマーク（インデックスはハンドランドマーク番号）
    pub hand_points: Vec<Vec<Option<PixelPoint>>>,
}

impl DetectionFrame {
    /// 検出なしのフレーム（検出失敗時の縮退先）
    pub fn not_detected(mode: Mode, width: u32, height: u32, timestamp_ms: u64, visited: &VisitedState) -> Self {
        Self {
            mode,
            width,
            height,
            timestamp_ms,
            anchors: None,
            targets: Vec::new(),
            hands: Vec::new(),
            active_order: active_order_for(mode, visited),
            proximity: ProximityResult {
                active_order: active_order_for(mode, visited),
                ..ProximityResult::default()
            },
            pose_points: Vec::new(),
            hand_points: Vec::new(),
        }
    }

    pub fn body_detected(&self) -> bool {
        self.anchors.is_some()
    }

    pub fn is_aligned(&self, target_index: usize) -> bool {
        self.proximity.aligned.get(target_index).copied().unwrap_or(false)
    }
}

/// 位置に関係なくモード表から求めた次の聴診点
pub fn active_order_for(mode: Mode, visited: &VisitedState) -> Option<u32> {
    mode.targets()
        .iter()
        .filter(|spec| !visited.contains(spec.name))
        .map(|spec| spec.order)
        .min()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub frame: DetectionFrame,
    /// 遷移があったときだけ Some
    pub delta: Option<VisitedDelta>,
}

/// 検出結果 → アンカー → 聴診点 → 位置合わせ → 差分
pub struct FrameProcessor {
    mode: Mode,
    threshold: f64,
    min_visibility: f32,
    hand_landmark: usize,
    anchors: AnchorTracker,
}

impl FrameProcessor {
    pub fn new(mode: Mode, config: &GuideConfig) -> Self {
        Self {
            mode,
            threshold: config.threshold(mode),
            min_visibility: config.min_visibility,
            hand_landmark: config.hand_landmark,
            anchors: AnchorTracker::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn process(
        &mut self,
        detections: &Detections,
        width: u32,
        height: u32,
        timestamp_ms: u64,
        visited: &VisitedState,
    ) -> FrameOutcome {
        let anchors = self
            .anchors
            .update(detections.pose.as_ref(), width, height, self.min_visibility);

        let pose_points: Vec<Option<PixelPoint>> = match &detections.pose {
            Some(pose) => pose
                .landmarks
                .iter()
                .take(PoseLandmarkIndex::COUNT)
                .map(|lm| lm.is_valid(self.min_visibility).then(|| lm.to_pixel(width, height)))
                .collect(),
            None => Vec::new(),
        };

        let mut hands = Vec::new();
        let mut hand_points = Vec::new();
        for hand in detections.hands.iter().take(MAX_HANDS) {
            let points: Vec<Option<PixelPoint>> = hand
                .landmarks
                .iter()
                .map(|lm| lm.is_valid(0.0).then(|| lm.to_pixel(width, height)))
                .collect();
            if let Some(anchor) = hand.get(self.hand_landmark).filter(|lm| lm.is_valid(0.0)) {
                hands.push(anchor.to_pixel(width, height));
            }
            hand_points.push(points);
        }

        let Some(anchors) = anchors else {
            let mut frame = DetectionFrame::not_detected(self.mode, width, height, timestamp_ms, visited);
            frame.hands = hands;
            frame.hand_points = hand_points;
            frame.pose_points = pose_points;
            return FrameOutcome { frame, delta: None };
        };

        let targets = compute_targets(&anchors, self.mode);
        let proximity = match_targets(&targets, &hands, self.threshold, visited);
        let delta = VisitedDelta::compute(&proximity.newly_aligned, visited);

        let frame = DetectionFrame {
            mode: self.mode,
            width,
            height,
            timestamp_ms,
            anchors: Some(anchors),
            targets,
            hands,
            active_order: proximity.active_order,
            proximity,
            pose_points,
            hand_points,
        };
        FrameOutcome { frame, delta }
    }

    /// 検出器エラー時: このフレームだけ「未検出」にする
    pub fn degraded(&self, width: u32, height: u32, timestamp_ms: u64, visited: &VisitedState) -> FrameOutcome {
        FrameOutcome {
            frame: DetectionFrame::not_detected(self.mode, width, height, timestamp_ms, visited),
            delta: None,
        }
    }

    pub fn reset(&mut self) {
        self.anchors.reset();
    }
}
