pub mod camera;
pub mod config;
pub mod engine;
pub mod error;
pub mod guide;
pub mod logging;
pub mod pose;
pub mod render;
