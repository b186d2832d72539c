use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::camera::CameraRequest;
use crate::guide::Mode;
use crate::pose::hand;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub guide: GuideConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    /// デバイス番号（未指定ならデフォルトカメラ）
    #[serde(default)]
    pub device: Option<i32>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_fps() -> u32 { 30 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

impl CameraConfig {
    pub fn request(&self) -> CameraRequest {
        CameraRequest {
            device: self.device,
            width: Some(self.width),
            height: Some(self.height),
            fps: Some(self.fps),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuideConfig {
    /// 心音モードの判定距離（ピクセル）
    #[serde(default = "default_heart_threshold")]
    pub heart_threshold: f64,
    /// 肺音モードの判定距離（ピクセル）
    #[serde(default = "default_lung_threshold")]
    pub lung_threshold: f64,
    /// 肩・腰ランドマークの最低可視度
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,
    /// 手の位置として使うハンドランドマーク番号
    #[serde(default = "default_hand_landmark")]
    pub hand_landmark: usize,
}

fn default_heart_threshold() -> f64 { Mode::Heart.default_threshold() }
fn default_lung_threshold() -> f64 { Mode::Lung.default_threshold() }
fn default_min_visibility() -> f32 { 0.5 }
fn default_hand_landmark() -> usize { hand::MIDDLE_MCP }

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            heart_threshold: default_heart_threshold(),
            lung_threshold: default_lung_threshold(),
            min_visibility: default_min_visibility(),
            hand_landmark: default_hand_landmark(),
        }
    }
}

impl GuideConfig {
    pub fn threshold(&self, mode: Mode) -> f64 {
        match mode {
            Mode::Heart => self.heart_threshold,
            Mode::Lung => self.lung_threshold,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// ランドマーク録画（JSON Lines）
    #[serde(default = "default_recording")]
    pub recording: String,
}

fn default_recording() -> String { "recordings/demo.jsonl".to_string() }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            recording: default_recording(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default)]
    pub verbose: bool,
}

fn default_log_dir() -> String { "logs".to_string() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            verbose: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    /// 最後のフレームからこの秒数を超えたら不健全
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: f64,
}

fn default_stale_after_secs() -> f64 { 5.0 }

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl HealthConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs_f64(self.stale_after_secs.max(0.0))
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        Ok(config)
    }

    /// 読めなければデフォルト設定
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{:#}; using default config", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.camera.device, None);
        assert_eq!(config.guide.threshold(Mode::Heart), 20.0);
        assert_eq!(config.guide.threshold(Mode::Lung), 25.0);
        assert_eq!(config.guide.hand_landmark, 9);
        assert_eq!(config.health.stale_after(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [camera]
            device = 2
            fps = 15

            [guide]
            heart_threshold = 30.0

            [log]
            verbose = true
            "#,
        )
        .unwrap();
        assert_eq!(config.camera.device, Some(2));
        assert_eq!(config.camera.fps, 15);
        assert_eq!(config.camera.height, 480);
        assert_eq!(config.guide.threshold(Mode::Heart), 30.0);
        assert_eq!(config.guide.threshold(Mode::Lung), 25.0);
        assert!(config.log.verbose);
        assert_eq!(config.log.dir, "logs");
    }

    #[test]
    fn test_camera_request() {
        let request = CameraConfig::default().request();
        assert_eq!(request.width, Some(640));
        assert_eq!(request.fps, Some(30));
        assert_eq!(request.device, None);
    }

    #[test]
    fn test_invalid_config_is_error() {
        assert!(Config::parse("[camera]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("no/such/guide.toml");
        assert_eq!(config.camera.width, 640);
    }
}
