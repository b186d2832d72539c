use anyhow::Result;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use auscultation_tracker::camera::SyntheticCamera;
use auscultation_tracker::config::Config;
use auscultation_tracker::engine::{BookHost, GuideEngine};
use auscultation_tracker::guide::{Mode, VisitedCell};
use auscultation_tracker::logging;
use auscultation_tracker::pose::ReplayLoader;

const CONFIG_PATH: &str = "guide.toml";

fn print_status(engine: &GuideEngine, host: &BookHost) {
    let mode = engine.mode();
    let stats = engine.stats();
    let visited = host.visited(mode);
    println!("状態: {} (mode: {})", engine.state(), mode);
    println!(
        "  フレーム: 受信 {} / 処理 {} / スキップ {} / 検出失敗 {}  ({:.1} fps)",
        stats.frames_received,
        stats.frames_processed,
        stats.frames_skipped,
        stats.detection_failures,
        stats.average_fps
    );
    println!("  健全: {}  トラック: {}", engine.is_healthy(), engine.active_tracks());
    println!(
        "  訪問済み {}/{}: {:?}",
        visited.len(),
        mode.targets().len(),
        visited.iter().collect::<Vec<_>>()
    );
    if let Some(err) = engine.last_error() {
        println!("  エラー: {}", err.user_message());
    }
    for t in engine.history(5) {
        println!("  {} {} -> {} ({})", t.at.format("%H:%M:%S"), t.from, t.to, t.reason);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    logging::init(&config.log)?;

    println!("=== Auscultation Guide {} ===", env!("CARGO_PKG_VERSION"));
    println!("録画: {}", config.model.recording);
    println!();
    println!("コマンド:");
    println!("  o [heart|lung] - ガイドを開始");
    println!("  m heart|lung   - モード切替（実行中なら再起動）");
    println!("  r              - 訪問済みをリセット");
    println!("  c              - ガイドを終了");
    println!("  s              - 状態を表示");
    println!("  q              - 終了");
    println!();

    let camera = Arc::new(SyntheticCamera::new(
        config.camera.width,
        config.camera.height,
        config.camera.fps,
    ));
    let loader = Arc::new(ReplayLoader::from_file(&config.model.recording));
    let cell = VisitedCell::default();
    let host = Arc::new(BookHost::new(cell.clone(), Mode::Heart));
    let engine = GuideEngine::builder(config.clone())
        .visited(cell)
        .build(loader, camera, host.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let parts: Vec<&str> = input.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }

        match parts[0] {
            "o" => {
                let mode = match parts.get(1) {
                    Some(s) => match s.parse::<Mode>() {
                        Ok(m) => m,
                        Err(e) => {
                            println!("{}", e);
                            continue;
                        }
                    },
                    None => engine.mode(),
                };
                engine.open(mode);
                println!("開始: {}", mode);
            }
            "m" if parts.len() == 2 => match parts[1].parse::<Mode>() {
                Ok(mode) => {
                    engine.set_mode(mode);
                    println!("モード: {}", mode);
                }
                Err(e) => println!("{}", e),
            },
            "r" => {
                engine.reset();
                println!("リセットしました");
            }
            "c" => {
                engine.close();
                println!("終了しました");
            }
            "s" => print_status(&engine, &host),
            "q" => {
                engine.close();
                println!("終了します");
                break;
            }
            _ => {
                println!("不明なコマンド: {}", parts[0]);
            }
        }
    }

    Ok(())
}
