use crate::pose::{PixelPoint, PoseLandmarkIndex, PoseLandmarks};

use super::Mode;

/// 肩と腰のピクセル座標（毎フレーム再計算、保存しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorSet {
    pub left_shoulder: PixelPoint,
    pub right_shoulder: PixelPoint,
    pub left_hip: PixelPoint,
    pub right_hip: PixelPoint,
}

impl AnchorSet {
    pub fn new(
        left_shoulder: PixelPoint,
        right_shoulder: PixelPoint,
        left_hip: PixelPoint,
        right_hip: PixelPoint,
    ) -> Self {
        Self {
            left_shoulder,
            right_shoulder,
            left_hip,
            right_hip,
        }
    }

    /// 左右の（腰 - 肩）の高さの平均
    pub fn torso_height(&self) -> f64 {
        let left = self.left_hip.y as f64 - self.left_shoulder.y as f64;
        let right = self.right_hip.y as f64 - self.right_shoulder.y as f64;
        (left + right) / 2.0
    }

    pub fn mid_x(&self) -> f64 {
        (self.left_shoulder.x as f64 + self.right_shoulder.x as f64) / 2.0
    }

    pub fn top_y(&self) -> f64 {
        (self.left_shoulder.y as f64 + self.right_shoulder.y as f64) / 2.0
    }

    pub fn shoulder_width(&self) -> f64 {
        (self.right_shoulder.x as f64 - self.left_shoulder.x as f64).abs()
    }

    /// 胴体の四角形（左肩 → 右肩 → 右腰 → 左腰）
    pub fn torso_quad(&self) -> [PixelPoint; 4] {
        [self.left_shoulder, self.right_shoulder, self.right_hip, self.left_hip]
    }
}

/// 聴診点（name と order はモードごとに固定、position は毎フレーム再計算）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPoint {
    pub name: &'static str,
    pub position: PixelPoint,
    pub order: u32,
}

/// ポーズから肩・腰のアンカーを求める。
/// 点数不足・可視度不足・非有限値なら None（panic しない）
pub fn compute_anchors(
    pose: &PoseLandmarks,
    width: u32,
    height: u32,
    min_visibility: f32,
) -> Option<AnchorSet> {
    let pixel = |index: PoseLandmarkIndex| {
        pose.get(index)
            .filter(|lm| lm.is_valid(min_visibility))
            .map(|lm| lm.to_pixel(width, height))
    };

    Some(AnchorSet::new(
        pixel(PoseLandmarkIndex::LeftShoulder)?,
        pixel(PoseLandmarkIndex::RightShoulder)?,
        pixel(PoseLandmarkIndex::LeftHip)?,
        pixel(PoseLandmarkIndex::RightHip)?,
    ))
}

/// アンカーとモード定数だけから聴診点を求める（純関数、order 昇順）
pub fn compute_targets(anchors: &AnchorSet, mode: Mode) -> Vec<TargetPoint> {
    let mid_x = anchors.mid_x();
    let top_y = anchors.top_y();
    let shoulder_width = anchors.shoulder_width();
    let torso_height = anchors.torso_height();

    mode.targets()
        .iter()
        .map(|spec| {
            // 小数比率の誤差で 1px ずれないよう丸める
            let x = (mid_x + spec.dx * shoulder_width).round() as i32;
            let y = (top_y + spec.dy * torso_height).round() as i32;
            TargetPoint {
                name: spec.name,
                position: PixelPoint::new(x, y),
                order: spec.order,
            }
        })
        .collect()
}

/// 直前に得られたアンカーを保持し、一時的な隠れを補う
#[derive(Debug, Default)]
pub struct AnchorTracker {
    last: Option<AnchorSet>,
}

impl AnchorTracker {
    pub fn new() -> Self {
        Self { last: None }
    }

    /// ポーズ未検出なら None（「未検出」）。
    /// ポーズはあるが肩・腰が隠れている場合は最後のアンカーを返す
    pub fn update(
        &mut self,
        pose: Option<&PoseLandmarks>,
        width: u32,
        height: u32,
        min_visibility: f32,
    ) -> Option<AnchorSet> {
        let pose = pose?;
        match compute_anchors(pose, width, height, min_visibility) {
            Some(anchors) => {
                self.last = Some(anchors);
                Some(anchors)
            }
            None => self.last,
        }
    }

    pub fn last(&self) -> Option<AnchorSet> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
