use anyhow::{Context, Result};
use log::{LevelFilter, Record};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::LogConfig;

/// 標準エラー出力とログファイルの両方に書く（env_logger の出力先）
pub struct TeeWriter {
    file: Option<BufWriter<File>>,
}

impl TeeWriter {
    pub fn new(file: Option<File>) -> Self {
        Self { file: file.map(BufWriter::new) }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = &mut self.file {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

fn format_line(record: &Record) -> String {
    format!(
        "{} {:<5} {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        record.level(),
        record.args()
    )
}

/// `<dir>/guide_<日時>.log` を作る
pub fn open_log_file(dir: &Path) -> Result<(File, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create log dir {}", dir.display()))?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("guide_{}.log", ts));
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok((file, path))
}

/// ロガーを設定する。`RUST_LOG` があれば設定より優先。
/// ログファイルが作れなければ標準エラー出力のみ
pub fn init(config: &LogConfig) -> Result<Option<PathBuf>> {
    let level = if config.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let (file, path) = match open_log_file(Path::new(&config.dir)) {
        Ok((file, path)) => (Some(file), Some(path)),
        Err(e) => {
            eprintln!("{:#}; logging to stderr only", e);
            (None, None)
        }
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "{}", format_line(record)))
        .target(env_logger::Target::Pipe(Box::new(TeeWriter::new(file))))
        .try_init()
        .context("Logger already initialized")?;

    if let Some(path) = &path {
        log::info!("Log: {}", path.display());
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("guide_log_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_open_log_file_creates_dir() {
        let dir = temp_dir("open");
        let (_file, path) = open_log_file(&dir).unwrap();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("guide_") && name.ends_with(".log"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_format_line() {
        let msg = format_line(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("camera busy"))
                .build(),
        );
        assert!(msg.contains("WARN"));
        assert!(msg.ends_with("camera busy"));
    }

    #[test]
    fn test_tee_writer_copies_to_file() {
        let dir = temp_dir("tee");
        let (file, path) = open_log_file(&dir).unwrap();
        let mut tee = TeeWriter::new(Some(file));
        writeln!(tee, "model loaded").unwrap();
        tee.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "model loaded\n");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_tee_writer_without_file() {
        let mut tee = TeeWriter::new(None);
        assert_eq!(tee.write(b"stderr only\n").unwrap(), 12);
        tee.flush().unwrap();
    }
}
