use std::f64::consts::{FRAC_PI_4, PI};

use crate::camera::VideoFrame;
use crate::pose::PixelPoint;

use super::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};

/// 描画先のメモリ上フレームバッファ（XRGB u32、ビデオと同サイズ）
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: usize,
    height: usize,
    buffer: Vec<u32>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        let width = width as usize;
        let height = height as usize;
        Self {
            width,
            height,
            buffer: vec![0u32; width * height],
        }
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    pub fn buffer(&self) -> &[u32] {
        &self.buffer
    }

    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        self.index(x, y).map(|i| self.buffer[i])
    }

    /// ビデオサイズが変わったら作り直す
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width != width as usize || self.height != height as usize {
            *self = Self::new(width, height);
        }
    }

    pub fn clear(&mut self, color: u32) {
        self.buffer.fill(color);
    }

    /// ビデオフレームをコピー（サイズが異なる場合は重なる範囲だけ）
    pub fn draw_frame(&mut self, frame: &VideoFrame) {
        let frame_width = frame.width as usize;
        let rows = self.height.min(frame.height as usize);
        let cols = self.width.min(frame_width);
        for y in 0..rows {
            let Some(src) = frame.pixels.get(y * frame_width..y * frame_width + cols) else {
                break;
            };
            self.buffer[y * self.width..y * self.width + cols].copy_from_slice(src);
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            Some(y as usize * self.width + x as usize)
        } else {
            None
        }
    }

    /// ピクセルをセット（境界チェック付き）
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if let Some(i) = self.index(x, y) {
            self.buffer[i] = color;
        }
    }

    /// アルファブレンド（alpha: 0.0〜1.0）
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: u32, alpha: f32) {
        if let Some(i) = self.index(x, y) {
            self.buffer[i] = blend(self.buffer[i], color, alpha);
        }
    }

    /// Bresenhamのアルゴリズムで線を描画（誤差項は i64）
    pub fn draw_line(&mut self, from: PixelPoint, to: PixelPoint, color: u32) {
        let (x0, y0, x1, y1) = (from.x as i64, from.y as i64, to.x as i64, to.y as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.set_pixel(x as i32, y as i32, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// 太線（線分の各点に小さな円を置く）
    pub fn draw_thick_line(&mut self, from: PixelPoint, to: PixelPoint, thickness: i32, color: u32) {
        if thickness <= 1 {
            self.draw_line(from, to, color);
            return;
        }
        let radius = thickness / 2;
        let dx = to.x as i64 - from.x as i64;
        let dy = to.y as i64 - from.y as i64;
        let steps = dx.abs().max(dy.abs()).max(1);
        for i in 0..=steps {
            let t = i as f64 / steps as f64;
            let x = from.x as f64 + dx as f64 * t;
            let y = from.y as f64 + dy as f64 * t;
            self.fill_circle(PixelPoint::new(x.round() as i32, y.round() as i32), radius, color);
        }
    }

    /// 矢印（先端の長さは全長の 0.3）
    pub fn draw_arrow(&mut self, from: PixelPoint, to: PixelPoint, thickness: i32, color: u32) {
        self.draw_thick_line(from, to, thickness, color);
        let dx = to.x as f64 - from.x as f64;
        let dy = to.y as f64 - from.y as f64;
        let length = dx.hypot(dy);
        if length < 1.0 {
            return;
        }
        let tip = length * 0.3;
        let back = dy.atan2(dx) + PI;
        for side in [FRAC_PI_4, -FRAC_PI_4] {
            let a = back + side;
            let end = PixelPoint::new(
                (to.x as f64 + tip * a.cos()).round() as i32,
                (to.y as f64 + tip * a.sin()).round() as i32,
            );
            self.draw_thick_line(to, end, thickness, color);
        }
    }

    /// 円を描画（塗りつぶし）
    pub fn fill_circle(&mut self, center: PixelPoint, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(center.x + dx, center.y + dy, color);
                }
            }
        }
    }

    pub fn fill_circle_alpha(&mut self, center: PixelPoint, radius: i32, color: u32, alpha: f32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.blend_pixel(center.x + dx, center.y + dy, color, alpha);
                }
            }
        }
    }

    /// 輪（外径 radius、太さ thickness）
    pub fn draw_ring(&mut self, center: PixelPoint, radius: i32, thickness: i32, color: u32) {
        let outer = radius * radius;
        let inner_radius = (radius - thickness).max(0);
        let inner = inner_radius * inner_radius;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let d = dx * dx + dy * dy;
                if d <= outer && d >= inner {
                    self.set_pixel(center.x + dx, center.y + dy, color);
                }
            }
        }
    }

    pub fn fill_rect_alpha(&mut self, x: i32, y: i32, w: i32, h: i32, color: u32, alpha: f32) {
        for py in y.max(0)..(y + h).min(self.height as i32) {
            for px in x.max(0)..(x + w).min(self.width as i32) {
                self.blend_pixel(px, py, color, alpha);
            }
        }
    }

    /// 多角形の塗りつぶし（偶奇規則のスキャンライン）
    pub fn fill_polygon(&mut self, points: &[PixelPoint], color: u32, alpha: f32) {
        if points.len() < 3 {
            return;
        }
        let min_y = points.iter().map(|p| p.y).min().unwrap_or(0).max(0);
        let max_y = points
            .iter()
            .map(|p| p.y)
            .max()
            .unwrap_or(0)
            .min(self.height as i32 - 1);

        let mut crossings = Vec::with_capacity(points.len());
        for y in min_y..=max_y {
            let scan = y as f64 + 0.5;
            crossings.clear();
            for (i, a) in points.iter().enumerate() {
                let b = points[(i + 1) % points.len()];
                let (ay, by) = (a.y as f64, b.y as f64);
                if (ay <= scan && by > scan) || (by <= scan && ay > scan) {
                    let t = (scan - ay) / (by - ay);
                    crossings.push(a.x as f64 + t * (b.x - a.x) as f64);
                }
            }
            crossings.sort_by(|a, b| a.total_cmp(b));
            for pair in crossings.chunks_exact(2) {
                let start = pair[0].round() as i32;
                let end = pair[1].round() as i32;
                for x in start.max(0)..end.min(self.width as i32) {
                    self.blend_pixel(x, y, color, alpha);
                }
            }
        }
    }

    /// 8x8 ビットマップフォントで文字列を描く
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, scale: i32, color: u32) {
        let scale = scale.max(1);
        let mut cursor = x;
        for c in text.chars() {
            if let Some(rows) = font::glyph(c) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..GLYPH_WIDTH {
                        if (bits >> col) & 1 == 0 {
                            continue;
                        }
                        let px = cursor + col as i32 * scale;
                        let py = y + row as i32 * scale;
                        for sy in 0..scale {
                            for sx in 0..scale {
                                self.set_pixel(px + sx, py + sy, color);
                            }
                        }
                    }
                }
            }
            cursor += font::advance(scale);
        }
    }

    /// 影付きの文字列
    pub fn draw_text_shadow(&mut self, x: i32, y: i32, text: &str, scale: i32, color: u32) {
        self.draw_text(x + 1, y + 1, text, scale, 0x000000);
        self.draw_text(x, y, text, scale, color);
    }

    pub fn draw_text_centered(&mut self, center_x: i32, y: i32, text: &str, scale: i32, color: u32) {
        let width = text_width(text, scale);
        self.draw_text_shadow(center_x - width / 2, y, text, scale, color);
    }
}

pub fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * font::advance(scale.max(1))
}

pub fn text_height(scale: i32) -> i32 {
    GLYPH_HEIGHT as i32 * scale.max(1)
}

pub fn blend(dst: u32, src: u32, alpha: f32) -> u32 {
    let a = alpha.clamp(0.0, 1.0);
    let mix = |shift: u32| {
        let d = ((dst >> shift) & 0xFF) as f32;
        let s = ((src >> shift) & 0xFF) as f32;
        ((d + (s - d) * a).round() as u32).min(255) << shift
    };
    mix(16) | mix(8) | mix(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_pixel_out_of_bounds_is_ignored() {
        let mut canvas = Canvas::new(4, 4);
        canvas.set_pixel(-1, 0, 0xFFFFFF);
        canvas.set_pixel(4, 4, 0xFFFFFF);
        assert!(canvas.buffer().iter().all(|p| *p == 0));
        canvas.set_pixel(3, 3, 0x123456);
        assert_eq!(canvas.pixel(3, 3), Some(0x123456));
    }

    #[test]
    fn test_line_endpoints() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line(PixelPoint::new(1, 1), PixelPoint::new(8, 5), 0xFF0000);
        assert_eq!(canvas.pixel(1, 1), Some(0xFF0000));
        assert_eq!(canvas.pixel(8, 5), Some(0xFF0000));
    }

    #[test]
    fn test_line_far_outside_does_not_panic() {
        let mut canvas = Canvas::new(10, 10);
        canvas.draw_line(PixelPoint::new(-50, -50), PixelPoint::new(60, 60), 0xFF0000);
        assert_eq!(canvas.pixel(5, 5), Some(0xFF0000));
    }

    #[test]
    fn test_arrow_has_shaft_and_head() {
        let mut canvas = Canvas::new(24, 20);
        canvas.draw_arrow(PixelPoint::new(0, 10), PixelPoint::new(20, 10), 1, 0xFF0000);
        assert_eq!(canvas.pixel(10, 10), Some(0xFF0000));
        // 先端から左上・左下に 6px * cos45
        assert_eq!(canvas.pixel(16, 6), Some(0xFF0000));
        assert_eq!(canvas.pixel(16, 14), Some(0xFF0000));
        assert_eq!(canvas.pixel(10, 4), Some(0));
    }

    #[test]
    fn test_blend() {
        assert_eq!(blend(0x000000, 0xFFFFFF, 1.0), 0xFFFFFF);
        assert_eq!(blend(0x000000, 0xFFFFFF, 0.0), 0x000000);
        assert_eq!(blend(0x000000, 0xC8C8C8, 0.5), 0x646464);
    }

    #[test]
    fn test_fill_polygon_inside_only() {
        let mut canvas = Canvas::new(20, 20);
        let quad = [
            PixelPoint::new(5, 5),
            PixelPoint::new(15, 5),
            PixelPoint::new(15, 15),
            PixelPoint::new(5, 15),
        ];
        canvas.fill_polygon(&quad, 0xFFFFFF, 1.0);
        assert_eq!(canvas.pixel(10, 10), Some(0xFFFFFF));
        assert_eq!(canvas.pixel(2, 2), Some(0));
        assert_eq!(canvas.pixel(17, 10), Some(0));
    }

    #[test]
    fn test_ring_has_hole() {
        let mut canvas = Canvas::new(30, 30);
        canvas.draw_ring(PixelPoint::new(15, 15), 10, 2, 0x00FF00);
        assert_eq!(canvas.pixel(15, 5), Some(0x00FF00));
        assert_eq!(canvas.pixel(15, 15), Some(0));
    }

    #[test]
    fn test_draw_frame_copies_pixels() {
        let pixels: Vec<u32> = (0..12).collect();
        let frame = VideoFrame::new(4, 3, 0, Arc::new(pixels));
        let mut canvas = Canvas::new(4, 3);
        canvas.draw_frame(&frame);
        assert_eq!(canvas.pixel(3, 2), Some(11));

        let mut small = Canvas::new(2, 2);
        small.draw_frame(&frame);
        assert_eq!(small.buffer(), &[0, 1, 4, 5]);
    }

    #[test]
    fn test_text_metrics() {
        assert_eq!(text_width("", 2), 0);
        assert_eq!(text_width("A", 1), 8);
        assert_eq!(text_width("AB", 2), 32);
        assert_eq!(text_height(3), 24);
    }

    #[test]
    fn test_draw_text_sets_pixels() {
        let mut canvas = Canvas::new(40, 10);
        canvas.draw_text(0, 0, "I", 1, 0xFFFFFF);
        let rows = font::glyph('I').unwrap();
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                let expected = if (bits >> col) & 1 == 1 { 0xFFFFFF } else { 0 };
                assert_eq!(canvas.pixel(col as i32, row as i32), Some(expected), "({col},{row})");
            }
        }
        // 2文字目は advance だけ右にずれる
        canvas.clear(0);
        canvas.draw_text(0, 0, " I", 1, 0xFFFFFF);
        assert!((0..8).all(|x| (0..8).all(|y| canvas.pixel(x, y) == Some(0))));
        assert!(canvas.buffer().iter().any(|p| *p == 0xFFFFFF));
    }
}
