use std::f64::consts::TAU;

use crate::camera::VideoFrame;
use crate::error::EngineError;
use crate::guide::{DetectionFrame, Mode, TargetPoint, VisitedState};
use crate::pose::PixelPoint;

use super::canvas::{text_height, Canvas};
use super::skeleton::*;

/// 聴診点マーカーの表示状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    Default,
    /// 次に当てる点
    Active,
    /// 手の位置が合っている
    Aligned,
    /// 訪問済み
    Done,
}

impl MarkerState {
    pub fn color(&self) -> u32 {
        match self {
            MarkerState::Default => TARGET_DEFAULT_COLOR,
            MarkerState::Active => TARGET_ACTIVE_COLOR,
            MarkerState::Aligned => TARGET_ALIGNED_COLOR,
            MarkerState::Done => TARGET_DONE_COLOR,
        }
    }

    /// 脈動の周波数 (Hz)。0 なら脈動しない
    pub fn pulse_hz(&self) -> f64 {
        match self {
            MarkerState::Active => 1.0,
            MarkerState::Aligned => 3.0,
            MarkerState::Default | MarkerState::Done => 0.0,
        }
    }
}

/// 訪問済み > 位置合わせ中 > 次の点 > 未訪問
pub fn marker_state(frame: &DetectionFrame, index: usize, visited: &VisitedState) -> MarkerState {
    let Some(target) = frame.targets.get(index) else {
        return MarkerState::Default;
    };
    if visited.contains(target.name) {
        MarkerState::Done
    } else if frame.is_aligned(index) {
        MarkerState::Aligned
    } else if frame.active_order == Some(target.order) {
        MarkerState::Active
    } else {
        MarkerState::Default
    }
}

/// ガイダンス表示の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuidanceStatus {
    NotDetected,
    Next(&'static str),
    /// 手は見えているが次の点から外れている
    AdjustPosition(&'static str),
    GoodPosition,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guidance {
    pub mode: Mode,
    pub visited: usize,
    pub total: usize,
    pub status: GuidanceStatus,
}

impl Guidance {
    pub fn from_frame(frame: &DetectionFrame, visited: &VisitedState) -> Self {
        let specs = frame.mode.targets();
        let done = specs.iter().filter(|t| visited.contains(t.name)).count();
        let next = frame
            .active_order
            .and_then(|order| specs.iter().find(|t| t.order == order))
            .map(|t| t.name);

        let good_position = frame
            .targets
            .iter()
            .enumerate()
            .any(|(i, t)| frame.is_aligned(i) && !visited.contains(t.name));

        let status = match next {
            None => GuidanceStatus::Complete,
            Some(_) if !frame.body_detected() => GuidanceStatus::NotDetected,
            Some(_) if good_position => GuidanceStatus::GoodPosition,
            Some(name) if !frame.hands.is_empty() => GuidanceStatus::AdjustPosition(name),
            Some(name) => GuidanceStatus::Next(name),
        };

        Self {
            mode: frame.mode,
            visited: done,
            total: specs.len(),
            status,
        }
    }

    pub fn progress_text(&self) -> String {
        format!("{} {}/{}", self.mode, self.visited, self.total)
    }

    pub fn status_text(&self) -> String {
        match &self.status {
            GuidanceStatus::NotDetected => "STEP INTO FRAME".to_string(),
            GuidanceStatus::Next(name) => format!("NEXT: {}", name),
            GuidanceStatus::AdjustPosition(name) => format!("ADJUST POSITION: {}", name),
            GuidanceStatus::GoodPosition => "GOOD POSITION".to_string(),
            GuidanceStatus::Complete => "ALL POINTS COMPLETE".to_string(),
        }
    }
}

/// 次の点に一番近い手から、その点への矢印。位置を直す必要があるときだけ
pub fn guidance_arrow(frame: &DetectionFrame, visited: &VisitedState) -> Option<(PixelPoint, PixelPoint)> {
    if !matches!(Guidance::from_frame(frame, visited).status, GuidanceStatus::AdjustPosition(_)) {
        return None;
    }
    let target = frame.targets.iter().find(|t| frame.active_order == Some(t.order))?;
    let hand = frame
        .hands
        .iter()
        .min_by(|a, b| a.distance(&target.position).total_cmp(&b.distance(&target.position)))?;
    Some((*hand, target.position))
}

/// 描画入力（1フレーム分、描画後は保持しない）
pub struct RenderInput<'a> {
    pub video: Option<&'a VideoFrame>,
    pub frame: &'a DetectionFrame,
    pub visited: &'a VisitedState,
    /// 脈動アニメーション用の経過秒
    pub time_secs: f64,
}

/// オーバーレイ描画。状態を持たない（入力だけで結果が決まる）
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    pub marker_radius: i32,
    pub pulse_amplitude: f64,
    pub torso_alpha: f32,
    pub label_scale: i32,
    pub header_scale: i32,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self {
            marker_radius: 12,
            pulse_amplitude: 4.0,
            torso_alpha: 0.18,
            label_scale: 1,
            header_scale: 2,
        }
    }
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker_radius(&self, state: MarkerState, time_secs: f64) -> i32 {
        let hz = state.pulse_hz();
        if hz == 0.0 {
            return self.marker_radius;
        }
        let wave = (TAU * hz * time_secs).sin();
        (self.marker_radius as f64 + self.pulse_amplitude * wave).round() as i32
    }

    pub fn render(&self, canvas: &mut Canvas, input: &RenderInput) {
        let frame = input.frame;
        self.draw_background(canvas, input.video, frame.width, frame.height);

        self.draw_pose(canvas, frame);
        self.draw_hands(canvas, frame);

        if frame.body_detected() {
            if let Some(anchors) = &frame.anchors {
                let quad = anchors.torso_quad();
                canvas.fill_polygon(&quad, TORSO_COLOR, self.torso_alpha);
                for i in 0..quad.len() {
                    canvas.draw_line(quad[i], quad[(i + 1) % quad.len()], TORSO_COLOR);
                }
            }
            self.draw_links(canvas, frame);
            if let Some((from, to)) = guidance_arrow(frame, input.visited) {
                canvas.draw_arrow(from, to, 3, GUIDE_ARROW_COLOR);
            }
            for (i, target) in frame.targets.iter().enumerate() {
                let state = marker_state(frame, i, input.visited);
                self.draw_marker(canvas, target, state, input.time_secs);
            }
        } else {
            let y = canvas.height() as i32 / 2 - text_height(self.header_scale) / 2;
            canvas.draw_text_centered(canvas.width() as i32 / 2, y, "STEP INTO FRAME", self.header_scale, TEXT_COLOR);
        }

        self.draw_header(canvas, &Guidance::from_frame(frame, input.visited));
    }

    /// モデル読み込み中などの表示
    pub fn render_status(&self, canvas: &mut Canvas, video: Option<&VideoFrame>, message: &str) {
        let (width, height) = (canvas.width(), canvas.height());
        self.draw_background(canvas, video, width, height);
        let h = canvas.height() as i32;
        canvas.fill_rect_alpha(0, 0, canvas.width() as i32, h, 0x000000, 0.5);
        let y = h / 2 - text_height(self.header_scale) / 2;
        canvas.draw_text_centered(canvas.width() as i32 / 2, y, message, self.header_scale, TEXT_COLOR);
    }

    /// エラーパネル
    pub fn render_error(&self, canvas: &mut Canvas, error: &EngineError) {
        canvas.clear(0x111111);
        let scale = self.label_scale.max(1);
        let width = canvas.width() as i32;
        let max_chars = ((width - 32) / super::font::advance(scale)).max(8) as usize;
        let lines = wrap_text(&error.user_message(), max_chars);

        let line_height = text_height(scale) + 4 * scale;
        let title_height = text_height(self.header_scale) + 12;
        let total = title_height + line_height * lines.len() as i32;
        let mut y = (canvas.height() as i32 - total) / 2;

        canvas.draw_text_centered(width / 2, y, "ERROR", self.header_scale, ERROR_COLOR);
        y += title_height;
        for line in &lines {
            canvas.draw_text_centered(width / 2, y, line, scale, TEXT_COLOR);
            y += line_height;
        }
    }

    fn draw_background(&self, canvas: &mut Canvas, video: Option<&VideoFrame>, width: u32, height: u32) {
        match video {
            Some(v) => {
                canvas.resize(v.width, v.height);
                canvas.draw_frame(v);
            }
            None => {
                canvas.resize(width, height);
                canvas.clear(0x000000);
            }
        }
    }

    fn draw_pose(&self, canvas: &mut Canvas, frame: &DetectionFrame) {
        let point = |idx: crate::pose::PoseLandmarkIndex| frame.pose_points.get(idx as usize).copied().flatten();
        for (start, end) in POSE_CONNECTIONS.iter() {
            if let (Some(a), Some(b)) = (point(*start), point(*end)) {
                canvas.draw_line(a, b, SKELETON_COLOR);
            }
        }
        for (start, end) in POSE_CONNECTIONS.iter() {
            for idx in [start, end] {
                if let Some(p) = point(*idx) {
                    canvas.fill_circle(p, 3, LANDMARK_COLOR);
                }
            }
        }
    }

    fn draw_hands(&self, canvas: &mut Canvas, frame: &DetectionFrame) {
        for points in &frame.hand_points {
            let point = |i: usize| points.get(i).copied().flatten();
            for (start, end) in HAND_CONNECTIONS.iter() {
                if let (Some(a), Some(b)) = (point(*start), point(*end)) {
                    canvas.draw_line(a, b, HAND_COLOR);
                }
            }
            for p in points.iter().flatten() {
                canvas.fill_circle(*p, 2, HAND_COLOR);
            }
        }
        for hand in &frame.hands {
            canvas.fill_circle(*hand, 6, HAND_ANCHOR_COLOR);
            canvas.draw_ring(*hand, 8, 1, 0x000000);
        }
    }

    fn draw_links(&self, canvas: &mut Canvas, frame: &DetectionFrame) {
        for &(hi, ti) in &frame.proximity.links {
            if let (Some(hand), Some(target)) = (frame.hands.get(hi), frame.targets.get(ti)) {
                canvas.draw_thick_line(*hand, target.position, 2, TARGET_ALIGNED_COLOR);
            }
        }
    }

    fn draw_marker(&self, canvas: &mut Canvas, target: &TargetPoint, state: MarkerState, time_secs: f64) {
        let color = state.color();
        let radius = self.marker_radius(state, time_secs).max(2);
        let center = target.position;

        match state {
            MarkerState::Done => {
                canvas.fill_circle(center, radius, color);
                draw_check(canvas, center, radius);
            }
            MarkerState::Aligned | MarkerState::Active => {
                canvas.fill_circle_alpha(center, radius + 4, color, 0.3);
                canvas.draw_ring(center, radius, 3, color);
                canvas.fill_circle(center, 3, color);
            }
            MarkerState::Default => {
                canvas.draw_ring(center, radius, 2, color);
            }
        }

        let label = format!("{} {}", target.order, target.name);
        let x = center.x + self.marker_radius + 6;
        let y = center.y - text_height(self.label_scale) / 2;
        canvas.draw_text_shadow(x, y, &label, self.label_scale, TEXT_COLOR);
    }

    fn draw_header(&self, canvas: &mut Canvas, guidance: &Guidance) {
        let scale = self.header_scale;
        let height = text_height(scale) * 2 + 6 * scale + 8;
        canvas.fill_rect_alpha(0, 0, canvas.width() as i32, height, 0x000000, 0.55);

        canvas.draw_text_shadow(8, 6, &guidance.progress_text(), scale, TEXT_COLOR);
        let color = match guidance.status {
            GuidanceStatus::GoodPosition => TARGET_ALIGNED_COLOR,
            GuidanceStatus::Complete => TARGET_DONE_COLOR,
            GuidanceStatus::Next(_) => TARGET_ACTIVE_COLOR,
            GuidanceStatus::AdjustPosition(_) => GUIDE_ARROW_COLOR,
            GuidanceStatus::NotDetected => TEXT_COLOR,
        };
        let status = guidance.status_text();
        let y = 6 + text_height(scale) + 6 * scale;
        canvas.draw_text_shadow(8, y, &status, scale, color);
    }
}

fn draw_check(canvas: &mut Canvas, center: PixelPoint, radius: i32) {
    let r = radius / 2;
    let a = PixelPoint::new(center.x - r, center.y);
    let b = PixelPoint::new(center.x - r / 3, center.y + r * 2 / 3);
    let c = PixelPoint::new(center.x + r, center.y - r * 2 / 3);
    canvas.draw_thick_line(a, b, 2, TEXT_COLOR);
    canvas.draw_thick_line(b, c, 2, TEXT_COLOR);
}

/// 単語単位で折り返す
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
