//! Error taxonomy surfaced to the host.
//!
//! Transient detection misses are not errors (an empty `Detections` value), and
//! results that complete after teardown are dropped without being reported.

/// カメラ起動失敗の分類
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera not found")]
    NotFound,

    #[error("Camera is busy")]
    Busy,

    #[error("Camera error: {0}")]
    Other(String),
}

impl CameraError {
    /// ユーザー向けメッセージ
    pub fn user_message(&self) -> String {
        match self {
            CameraError::PermissionDenied => {
                "Camera access was denied. Allow camera access and reopen the guide.".to_string()
            }
            CameraError::NotFound => "No camera was found. Connect a camera and reopen the guide.".to_string(),
            CameraError::Busy => {
                "The camera is in use by another application. Close it and reopen the guide.".to_string()
            }
            CameraError::Other(msg) => format!("The camera could not be started: {}", msg),
        }
    }

    /// バックエンドのエラーメッセージから分類する
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("permission") || lower.contains("not authorized") || lower.contains("denied") {
            CameraError::PermissionDenied
        } else if lower.contains("busy") || lower.contains("in use") || lower.contains("resource") {
            CameraError::Busy
        } else if lower.contains("not found") || lower.contains("no such device") || lower.contains("not available") {
            CameraError::NotFound
        } else {
            CameraError::Other(message.to_string())
        }
    }
}

/// セッションを終了させるエラー（自動リトライなし）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error(transparent)]
    Camera(#[from] CameraError),
}

impl EngineError {
    pub fn user_message(&self) -> String {
        match self {
            EngineError::ModelLoad(_) => {
                "The detection model could not be loaded. Close and reopen the guide to try again.".to_string()
            }
            EngineError::Camera(e) => e.user_message(),
        }
    }
}
