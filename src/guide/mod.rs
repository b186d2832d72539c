//! Auscultation target guidance: anatomy → proximity → visited-state delta.

pub mod anatomy;
pub mod frame;
pub mod proximity;
pub mod visited;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use anatomy::{compute_anchors, compute_targets, AnchorSet, AnchorTracker, TargetPoint};
pub use frame::{DetectionFrame, FrameOutcome, FrameProcessor, HandPosition};
pub use proximity::{match_targets, ProximityResult};
pub use visited::{VisitedBook, VisitedCell, VisitedDelta, VisitedState, VisitedUpdate};

/// 検査モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Heart,
    Lung,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Heart, Mode::Lung];

    /// 位置合わせ判定距離（ピクセル固定値）
    pub const fn default_threshold(&self) -> f64 {
        match self {
            Mode::Heart => 20.0,
            Mode::Lung => 25.0,
        }
    }

    /// モードの聴診点テーブル（order 昇順）
    pub fn targets(&self) -> &'static [TargetSpec] {
        match self {
            Mode::Heart => &HEART_TARGETS,
            Mode::Lung => &LUNG_TARGETS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Heart => "heart",
            Mode::Lung => "lung",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heart" | "h" => Ok(Mode::Heart),
            "lung" | "l" => Ok(Mode::Lung),
            other => anyhow::bail!("unknown mode: {}", other),
        }
    }
}

/// 胸骨縁（肩幅比）
pub const STERNAL_BORDER: f64 = 0.11;
/// 鎖骨中線（肩幅比）
pub const MIDCLAVICULAR: f64 = 0.32;

/// 聴診点の定義。dx は肩幅比（画像右が正）、dy は胴の高さ比（肩の高さから下が正）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetSpec {
    pub name: &'static str,
    pub order: u32,
    pub dx: f64,
    pub dy: f64,
}

static HEART_TARGETS: [TargetSpec; 5] = [
    TargetSpec { name: "Aortic", order: 1, dx: -STERNAL_BORDER, dy: 0.12 },
    TargetSpec { name: "Pulmonic", order: 2, dx: STERNAL_BORDER, dy: 0.12 },
    TargetSpec { name: "Erb's Point", order: 3, dx: STERNAL_BORDER, dy: 0.22 },
    TargetSpec { name: "Tricuspid", order: 4, dx: STERNAL_BORDER, dy: 0.34 },
    TargetSpec { name: "Mitral", order: 5, dx: MIDCLAVICULAR, dy: 0.44 },
];

static LUNG_TARGETS: [TargetSpec; 6] = [
    TargetSpec { name: "Right Apex", order: 1, dx: -0.20, dy: 0.04 },
    TargetSpec { name: "Left Apex", order: 2, dx: 0.20, dy: 0.04 },
    TargetSpec { name: "Right Upper", order: 3, dx: -MIDCLAVICULAR, dy: 0.22 },
    TargetSpec { name: "Left Upper", order: 4, dx: MIDCLAVICULAR, dy: 0.22 },
    TargetSpec { name: "Right Lower", order: 5, dx: -MIDCLAVICULAR, dy: 0.45 },
    TargetSpec { name: "Left Lower", order: 6, dx: MIDCLAVICULAR, dy: 0.45 },
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_orders_unique_and_sorted() {
        for mode in Mode::ALL {
            let targets = mode.targets();
            let orders: Vec<u32> = targets.iter().map(|t| t.order).collect();
            let mut sorted = orders.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(orders, sorted, "{} orders must be strictly increasing", mode);
        }
    }

    #[test]
    fn test_names_unique_per_mode() {
        for mode in Mode::ALL {
            let names: HashSet<&str> = mode.targets().iter().map(|t| t.name).collect();
            assert_eq!(names.len(), mode.targets().len());
        }
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("heart".parse::<Mode>().unwrap(), Mode::Heart);
        assert_eq!(" Lung ".parse::<Mode>().unwrap(), Mode::Lung);
        assert!("kidney".parse::<Mode>().is_err());
        assert_eq!(Mode::Lung.to_string(), "lung");
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(Mode::Heart.default_threshold(), 20.0);
        assert_eq!(Mode::Lung.default_threshold(), 25.0);
    }
}
