#[cfg(feature = "desktop")]
pub mod capture;
pub mod synthetic;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CameraError;

#[cfg(feature = "desktop")]
pub use capture::OpenCvCamera;
pub use synthetic::SyntheticCamera;

/// カメラ1フレーム（XRGB u32、行優先）
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// フレーム到着時刻（ストリーム開始からのマイクロ秒）。同一フレームの再配信では変化しない
    pub timestamp_us: u64,
    pub pixels: Arc<Vec<u32>>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, timestamp_us: u64, pixels: Arc<Vec<u32>>) -> Self {
        Self {
            width,
            height,
            timestamp_us,
            pixels,
        }
    }

    /// 黒フレーム
    pub fn blank(width: u32, height: u32, timestamp_us: u64) -> Self {
        let pixels = vec![0u32; width as usize * height as usize];
        Self::new(width, height, timestamp_us, Arc::new(pixels))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get((y * self.width + x) as usize).copied()
    }
}

/// カメラ起動要求
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraRequest {
    /// デバイス指定。None ならデフォルトカメラ
    pub device: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
}

/// ストリームに属するトラック群の停止ハンドル。
/// フレームを読むタスクとは別に、同期的に全トラックを止められる必要がある。
pub trait TrackControl: Send + Sync {
    fn stop_all(&self);

    fn live_tracks(&self) -> usize;
}

/// 再生中のカメラストリーム
#[async_trait]
pub trait CameraStream: Send {
    fn resolution(&self) -> (u32, u32);

    /// 次のフレームが到着するまで待つ。停止済みなら None
    async fn next_frame(&mut self) -> Option<VideoFrame>;

    fn tracks(&self) -> Arc<dyn TrackControl>;
}

/// カメラ取得（許可ダイアログなどで無期限に待たされることがある）
#[async_trait]
pub trait Camera: Send + Sync {
    async fn start(&self, request: &CameraRequest) -> Result<Box<dyn CameraStream>, CameraError>;
}
