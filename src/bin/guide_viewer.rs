//! デスクトップ用ビューア。カメラ映像は実機から取るが、
//! ランドマークは `model.recording` の記録を再生したもので、映像からは検出しない。

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use auscultation_tracker::camera::OpenCvCamera;
use auscultation_tracker::config::Config;
use auscultation_tracker::engine::{BookHost, EngineState, GuideEngine, GuideHost};
use auscultation_tracker::error::EngineError;
use auscultation_tracker::guide::{Mode, VisitedCell, VisitedUpdate};
use auscultation_tracker::logging;
use auscultation_tracker::pose::ReplayLoader;
use auscultation_tracker::render::{Canvas, Key, MinifbWindow, OverlayRenderer};

const CONFIG_PATH: &str = "guide.toml";

/// 描画済みフレームをウィンドウ側に渡すホスト
struct ViewerHost {
    book: BookHost,
    latest: Mutex<Option<Canvas>>,
    error: Mutex<Option<EngineError>>,
}

impl GuideHost for ViewerHost {
    fn on_update(&self, mode: Mode, update: VisitedUpdate) {
        self.book.on_update(mode, update);
    }

    fn on_close(&self) {
        self.book.on_close();
    }

    fn on_mode(&self, mode: Mode) {
        if let Ok(mut e) = self.error.lock() {
            *e = None;
        }
        self.book.on_mode(mode);
    }

    fn on_frame(&self, canvas: &Canvas) {
        if let Ok(mut latest) = self.latest.lock() {
            *latest = Some(canvas.clone());
        }
    }

    fn on_error(&self, error: &EngineError) {
        if let Ok(mut e) = self.error.lock() {
            *e = Some(error.clone());
        }
    }
}

fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    logging::init(&config.log)?;

    println!("Guide Viewer");
    println!("H: 心音  L: 肺音  R: リセット  C: 停止  O: 再開  ESC: 終了");

    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let cell = VisitedCell::default();
    let host = Arc::new(ViewerHost {
        book: BookHost::new(cell.clone(), Mode::Heart),
        latest: Mutex::new(None),
        error: Mutex::new(None),
    });
    // 検出器は記録の再生（ライブ映像の推論ではない）
    let engine = GuideEngine::builder(config.clone()).visited(cell).build(
        Arc::new(ReplayLoader::from_file(&config.model.recording)),
        Arc::new(OpenCvCamera::new()),
        host.clone(),
    );

    let (width, height) = (config.camera.width, config.camera.height);
    let mut window = MinifbWindow::new("Auscultation Guide", width as usize, height as usize)?;
    let renderer = OverlayRenderer::default();
    let mut status = Canvas::new(width, height);

    engine.open(Mode::Heart);

    while window.is_open() {
        if window.key_pressed(Key::H) {
            engine.set_mode(Mode::Heart);
        }
        if window.key_pressed(Key::L) {
            engine.set_mode(Mode::Lung);
        }
        if window.key_pressed(Key::R) {
            engine.reset();
        }
        if window.key_pressed(Key::C) {
            engine.close();
        }
        if window.key_pressed(Key::O) && !engine.state().is_active() {
            engine.open(engine.mode());
        }

        let error = host.error.lock().ok().and_then(|e| e.clone());
        let frame = host.latest.lock().ok().and_then(|mut f| f.take());
        match (engine.state(), error, frame) {
            (EngineState::Error, Some(err), _) => {
                renderer.render_error(&mut status, &err);
                window.present(&status)?;
            }
            (EngineState::Running, _, Some(canvas)) => window.present(&canvas)?,
            (EngineState::LoadingModels, _, _) => {
                renderer.render_status(&mut status, None, "LOADING MODEL...");
                window.present(&status)?;
            }
            (EngineState::ModelsReady | EngineState::CameraStarting, _, _) => {
                renderer.render_status(&mut status, None, "STARTING CAMERA...");
                window.present(&status)?;
            }
            (EngineState::Stopped, _, _) => {
                renderer.render_status(&mut status, None, "STOPPED - PRESS O");
                window.present(&status)?;
            }
            _ => window.update(),
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    engine.close();
    println!("Shutting down...");
    Ok(())
}
