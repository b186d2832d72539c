use anyhow::Result;
use minifb::{Key, KeyRepeat, Window, WindowOptions};

use super::canvas::Canvas;

/// minifbを使用したウィンドウ（Canvas をそのまま表示する）
pub struct MinifbWindow {
    window: Window,
    width: usize,
    height: usize,
}

impl MinifbWindow {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )?;

        Ok(Self {
            window,
            width,
            height,
        })
    }

    /// ウィンドウが開いているか
    pub fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    pub fn key_pressed(&self, key: Key) -> bool {
        self.window.is_key_pressed(key, KeyRepeat::No)
    }

    /// Canvas を表示。サイズが違う場合は黒で埋めて左上に合わせる
    pub fn present(&mut self, canvas: &Canvas) -> Result<()> {
        if canvas.width() as usize == self.width && canvas.height() as usize == self.height {
            self.window
                .update_with_buffer(canvas.buffer(), self.width, self.height)?;
            return Ok(());
        }

        let mut buffer = vec![0u32; self.width * self.height];
        let cols = self.width.min(canvas.width() as usize);
        let rows = self.height.min(canvas.height() as usize);
        let src_width = canvas.width() as usize;
        for y in 0..rows {
            buffer[y * self.width..y * self.width + cols]
                .copy_from_slice(&canvas.buffer()[y * src_width..y * src_width + cols]);
        }
        self.window.update_with_buffer(&buffer, self.width, self.height)?;
        Ok(())
    }

    /// イベント処理のみ（描画なし）
    pub fn update(&mut self) {
        self.window.update();
    }
}
