use serde::{Deserialize, Serialize};

/// MediaPipe Pose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseLandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl PoseLandmarkIndex {
    pub const COUNT: usize = 33;

    pub fn from_index(index: usize) -> Option<Self> {
        use PoseLandmarkIndex::*;
        const ALL: [PoseLandmarkIndex; PoseLandmarkIndex::COUNT] = [
            Nose, LeftEyeInner, LeftEye, LeftEyeOuter, RightEyeInner, RightEye, RightEyeOuter,
            LeftEar, RightEar, MouthLeft, MouthRight, LeftShoulder, RightShoulder, LeftElbow,
            RightElbow, LeftWrist, RightWrist, LeftPinky, RightPinky, LeftIndex, RightIndex,
            LeftThumb, RightThumb, LeftHip, RightHip, LeftKnee, RightKnee, LeftAnkle, RightAnkle,
            LeftHeel, RightHeel, LeftFootIndex, RightFootIndex,
        ];
        ALL.get(index).copied()
    }
}

/// MediaPipe Hands の 21 ランドマークインデックス
#[allow(dead_code)]
pub mod hand {
    pub const COUNT: usize = 21;

    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_PIP: usize = 6;
    pub const INDEX_DIP: usize = 7;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_PIP: usize = 10;
    pub const MIDDLE_DIP: usize = 11;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_MCP: usize = 13;
    pub const RING_PIP: usize = 14;
    pub const RING_DIP: usize = 15;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

/// ピクセル座標
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// ユークリッド距離（ピクセル）
    pub fn distance(&self, other: &PixelPoint) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// 単一ランドマーク（検出器の正規化座標）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 深度（腰中心基準、スケールは検出器依存）
    #[serde(default)]
    pub z: f32,
    /// 可視度 (0.0〜1.0)。ハンドランドマークには無いので 1.0 扱い
    #[serde(default = "default_visibility")]
    pub visibility: f32,
}

fn default_visibility() -> f32 { 1.0 }

/// 画面外の座標を許す範囲（画像サイズ比）
pub const PIXEL_MARGIN: f64 = 4.0;

fn to_axis(normalized: f32, size: u32) -> i32 {
    let size = size as f64;
    let limit = size * PIXEL_MARGIN;
    (normalized as f64 * size).floor().clamp(-limit, size + limit) as i32
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// 可視度が閾値以上で、座標が有限か
    pub fn is_valid(&self, min_visibility: f32) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.visibility >= min_visibility
    }

    /// ピクセル座標に変換（切り捨て）。
    /// 画面外は画像サイズの PIXEL_MARGIN 倍までに丸め込む
    pub fn to_pixel(&self, width: u32, height: u32) -> PixelPoint {
        PixelPoint::new(to_axis(self.x, width), to_axis(self.y, height))
    }
}

/// 1人分のポーズランドマーク
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoseLandmarks {
    pub landmarks: Vec<Landmark>,
}

impl PoseLandmarks {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    /// インデックスでランドマークを取得。検出器が返した点数が足りなければ None
    pub fn get(&self, index: PoseLandmarkIndex) -> Option<&Landmark> {
        self.landmarks.get(index as usize)
    }

    /// 全ランドマークの平均可視度
    pub fn average_visibility(&self) -> f32 {
        if self.landmarks.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.landmarks.iter().map(|l| l.visibility).sum();
        sum / self.landmarks.len() as f32
    }
}

/// 片手分のハンドランドマーク（21点）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub landmarks: Vec<Landmark>,
}

impl HandLandmarks {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_landmark_index_count() {
        assert_eq!(PoseLandmarkIndex::COUNT, 33);
        assert_eq!(PoseLandmarkIndex::RightFootIndex as usize, 32);
    }

    #[test]
    fn test_pose_landmark_index_from_index() {
        assert_eq!(PoseLandmarkIndex::from_index(0), Some(PoseLandmarkIndex::Nose));
        assert_eq!(PoseLandmarkIndex::from_index(11), Some(PoseLandmarkIndex::LeftShoulder));
        assert_eq!(PoseLandmarkIndex::from_index(24), Some(PoseLandmarkIndex::RightHip));
        assert_eq!(PoseLandmarkIndex::from_index(33), None);
    }

    #[test]
    fn test_landmark_is_valid() {
        let lm = Landmark::new(0.5, 0.5, 0.0, 0.7);
        assert!(lm.is_valid(0.5));
        assert!(!lm.is_valid(0.8));
        assert!(!Landmark::new(f32::NAN, 0.5, 0.0, 1.0).is_valid(0.0));
    }

    #[test]
    fn test_landmark_to_pixel_floors() {
        let lm = Landmark::new(0.5, 0.25, 0.0, 1.0);
        assert_eq!(lm.to_pixel(640, 480), PixelPoint::new(320, 120));

        let lm = Landmark::new(0.9999, 0.0015, 0.0, 1.0);
        assert_eq!(lm.to_pixel(640, 480), PixelPoint::new(639, 0));
    }

    #[test]
    fn test_landmark_to_pixel_clamps_far_outside() {
        let lm = Landmark::new(1.0e7, -1.0e7, 0.0, 1.0);
        assert_eq!(lm.to_pixel(640, 480), PixelPoint::new(640 * 5, -480 * 4));
    }

    #[test]
    fn test_pixel_distance_at_extremes() {
        let a = PixelPoint::new(i32::MIN, i32::MIN);
        let b = PixelPoint::new(i32::MAX, i32::MAX);
        assert!(a.distance(&b).is_finite());
    }

    #[test]
    fn test_pixel_distance() {
        let a = PixelPoint::new(0, 0);
        let b = PixelPoint::new(3, 4);
        assert!((a.distance(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_pose_get_short_detection() {
        let pose = PoseLandmarks::new(vec![Landmark::default(); 5]);
        assert!(pose.get(PoseLandmarkIndex::Nose).is_some());
        assert!(pose.get(PoseLandmarkIndex::LeftShoulder).is_none());
    }

    #[test]
    fn test_landmark_visibility_defaults_when_missing() {
        let lm: Landmark = serde_json::from_str(r#"{"x":0.1,"y":0.2}"#).unwrap();
        assert_eq!(lm.visibility, 1.0);
        assert_eq!(lm.z, 0.0);
    }
}
