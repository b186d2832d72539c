use crate::pose::hand::*;
use crate::pose::PoseLandmarkIndex;

/// 上半身の骨格接続 (開始ランドマーク, 終了ランドマーク)
pub const POSE_CONNECTIONS: [(PoseLandmarkIndex, PoseLandmarkIndex); 12] = [
    // 顔
    (PoseLandmarkIndex::LeftEar, PoseLandmarkIndex::LeftEye),
    (PoseLandmarkIndex::LeftEye, PoseLandmarkIndex::Nose),
    (PoseLandmarkIndex::Nose, PoseLandmarkIndex::RightEye),
    (PoseLandmarkIndex::RightEye, PoseLandmarkIndex::RightEar),
    // 腕
    (PoseLandmarkIndex::LeftShoulder, PoseLandmarkIndex::LeftElbow),
    (PoseLandmarkIndex::LeftElbow, PoseLandmarkIndex::LeftWrist),
    (PoseLandmarkIndex::RightShoulder, PoseLandmarkIndex::RightElbow),
    (PoseLandmarkIndex::RightElbow, PoseLandmarkIndex::RightWrist),
    // 胴体
    (PoseLandmarkIndex::LeftShoulder, PoseLandmarkIndex::RightShoulder),
    (PoseLandmarkIndex::LeftShoulder, PoseLandmarkIndex::LeftHip),
    (PoseLandmarkIndex::RightShoulder, PoseLandmarkIndex::RightHip),
    (PoseLandmarkIndex::LeftHip, PoseLandmarkIndex::RightHip),
];

/// 手の骨格接続
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (WRIST, THUMB_CMC), (THUMB_CMC, THUMB_MCP), (THUMB_MCP, THUMB_IP), (THUMB_IP, THUMB_TIP),
    (WRIST, INDEX_MCP), (INDEX_MCP, INDEX_PIP), (INDEX_PIP, INDEX_DIP), (INDEX_DIP, INDEX_TIP),
    (WRIST, MIDDLE_MCP), (MIDDLE_MCP, MIDDLE_PIP), (MIDDLE_PIP, MIDDLE_DIP), (MIDDLE_DIP, MIDDLE_TIP),
    (WRIST, RING_MCP), (RING_MCP, RING_PIP), (RING_PIP, RING_DIP), (RING_DIP, RING_TIP),
    (WRIST, PINKY_MCP), (PINKY_MCP, PINKY_PIP), (PINKY_PIP, PINKY_DIP), (PINKY_DIP, PINKY_TIP),
    (INDEX_MCP, MIDDLE_MCP),
];

/// 骨格線の色 (RGB)
pub const SKELETON_COLOR: u32 = 0xFFFFFF; // 白

/// ランドマークの色 (RGB)
pub const LANDMARK_COLOR: u32 = 0x00FF00; // 緑

/// 胴体領域の色 (RGB)
pub const TORSO_COLOR: u32 = 0x3C82F6; // 青

/// 手の骨格の色 (RGB)
pub const HAND_COLOR: u32 = 0x00E5FF; // シアン

/// 手の位置（固定ランドマーク）の色 (RGB)
pub const HAND_ANCHOR_COLOR: u32 = 0xFFFF00; // 黄色

/// 聴診点: 未訪問
pub const TARGET_DEFAULT_COLOR: u32 = 0x9CA3AF; // 灰色

/// 聴診点: 次に当てる点
pub const TARGET_ACTIVE_COLOR: u32 = 0xF59E0B; // 橙

/// 聴診点: 手の位置が合っている
pub const TARGET_ALIGNED_COLOR: u32 = 0x22C55E; // 緑

/// 聴診点: 訪問済み
pub const TARGET_DONE_COLOR: u32 = 0x3B82F6; // 青

/// メッセージの色 (RGB)
pub const TEXT_COLOR: u32 = 0xFFFFFF;

/// 次の点への誘導矢印
pub const GUIDE_ARROW_COLOR: u32 = 0xEF44D8; // 桃

/// エラー表示の色 (RGB)
pub const ERROR_COLOR: u32 = 0xEF4444; // 赤
