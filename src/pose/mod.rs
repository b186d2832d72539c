pub mod detector;
pub mod landmark;
pub mod replay;

pub use detector::{
    next_detector_timestamp, Detections, LandmarkDetector, ModelCache, ModelLoader, SharedDetector, TimedDetector,
};
pub use landmark::{hand, HandLandmarks, Landmark, PixelPoint, PoseLandmarkIndex, PoseLandmarks};
pub use replay::{RecordedDetector, ReplayLoader};
