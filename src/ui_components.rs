use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
};

use crate::app_state::{House, SessionState};

/// Ticks a screen takes to fade in after a phase change.
pub const TRANSITION_TICKS: u64 = 6;
/// Ticks the bubble bounces and the hat wobbles after a new reply.
pub const REPLY_TICKS: u64 = 8;

/// Remembers the tick each animation epoch was first seen so it can play once.
#[derive(Debug, Default, Clone)]
pub struct AnimationClock {
    screen_epoch: u64,
    screen_started: u64,
    reply_epoch: u64,
    reply_started: Option<u64>,
}

impl AnimationClock {
    pub fn observe(&mut self, state: &SessionState, tick: u64) {
        if state.screen_epoch != self.screen_epoch {
            self.screen_epoch = state.screen_epoch;
            self.screen_started = tick;
        }
        if state.reply_epoch != self.reply_epoch {
            self.reply_epoch = state.reply_epoch;
            self.reply_started = Some(tick);
        }
    }

    /// 0.0 right after a phase change, 1.0 once the transition is over.
    pub fn screen_progress(&self, tick: u64) -> f32 {
        let elapsed = tick.saturating_sub(self.screen_started);
        (elapsed as f32 / TRANSITION_TICKS as f32).min(1.0)
    }

    /// Ticks since the latest reply landed, while its animation is still playing.
    pub fn reply_phase(&self, tick: u64) -> Option<u64> {
        let started = self.reply_started?;
        let elapsed = tick.saturating_sub(started);
        (elapsed < REPLY_TICKS).then_some(elapsed)
    }
}

/// Presentation-only state: the frame counter, the pointer and running animations.
#[derive(Debug, Default, Clone)]
pub struct ViewState {
    pub tick: u64,
    pub pointer: Option<(u16, u16)>,
    pub clock: AnimationClock,
    pub history_scroll: u16,
    /// Largest useful `history_scroll` for the current terminal size.
    pub history_limit: u16,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, state: &SessionState) {
        self.tick += 1;
        self.clock.observe(state, self.tick);
        if !state.show_history {
            self.history_scroll = 0;
        }
    }

    pub fn scroll_history(&mut self, delta: i16) {
        self.history_scroll = self
            .history_scroll
            .saturating_add_signed(delta)
            .min(self.history_limit);
    }

    pub fn set_history_limit(&mut self, limit: u16) {
        self.history_limit = limit;
        self.history_scroll = self.history_scroll.min(limit);
    }
}

/// Where the pupil sits inside `eye`, as an offset from its centre cell.
///
/// The pupil leans towards the pointer, covering at most 90% of the eye's
/// radius, and rests in the middle when there is no pointer.
pub fn pupil_offset(eye: Rect, pointer: Option<(u16, u16)>) -> (i16, i16) {
    let Some((px, py)) = pointer else {
        return (0, 0);
    };
    if eye.width == 0 || eye.height == 0 {
        return (0, 0);
    }
    let width = f32::from(eye.width);
    let height = f32::from(eye.height);
    let centre_x = f32::from(eye.x) + width / 2.0;
    let centre_y = f32::from(eye.y) + height / 2.0;

    let dx = (f32::from(px) + 0.5 - centre_x) / width;
    let dy = (f32::from(py) + 0.5 - centre_y) / height;
    let distance = (dx * dx + dy * dy).sqrt();
    let clamped = distance.min(0.9);
    let angle = dy.atan2(dx);

    let reach_x = width / 2.0 - 0.5;
    let reach_y = height / 2.0 - 0.5;
    let x = (angle.cos() * clamped * reach_x).round() as i16;
    let y = (angle.sin() * clamped * reach_y).round() as i16;
    (x, y)
}

/// Word-wraps bubble text, honouring double-width characters.
pub fn bubble_lines(text: &str, max_width: usize) -> Vec<String> {
    let width = max_width.max(1);
    textwrap::wrap(text, width)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

pub fn loader_frame(tick: u64) -> &'static str {
    const FRAMES: [&str; 4] = ["●  ○  ○", "○  ●  ○", "○  ○  ●", "○  ●  ○"];
    FRAMES[(tick / 2 % 4) as usize]
}

pub const CONE_ROWS: u16 = 9;
pub const BRIM_ROWS: u16 = 2;
pub const HAT_WIDTH: u16 = 46;
pub const HAT_HEIGHT: u16 = CONE_ROWS + BRIM_ROWS + 1;

/// The hat, drawn as a cone on a brim, each row `HAT_WIDTH` cells wide.
pub fn hat_lines() -> Vec<String> {
    let width = HAT_WIDTH as usize;
    let mut lines = Vec::with_capacity(HAT_HEIGHT as usize);
    for row in 0..CONE_ROWS as usize {
        let inner = 2 + row * 4;
        let body = format!("▟{}▙", "█".repeat(inner.saturating_sub(2)));
        lines.push(format!("{:^width$}", body, width = width));
    }
    lines.push(format!("{:^width$}", format!("▄▄▄▄{}▄▄▄▄", "█".repeat(38 - 8)), width = width));
    lines.push(format!("▟{}▙", "█".repeat(width - 2)));
    lines.push(format!(" {} ", "▀".repeat(width - 2)));
    lines
}

pub const EYE_WIDTH: u16 = 7;
pub const EYE_HEIGHT: u16 = 5;

/// The two eye boxes for a hat drawn with its top-left corner at `hat`.
pub fn eye_rects(hat: Rect) -> [Rect; 2] {
    let centre = hat.x + HAT_WIDTH / 2;
    let top = hat.y + 4;
    [
        Rect::new(centre.saturating_sub(EYE_WIDTH + 1), top, EYE_WIDTH, EYE_HEIGHT),
        Rect::new(centre + 1, top, EYE_WIDTH, EYE_HEIGHT),
    ]
}

/// Star positions around the hat as fractions of its box, like the sparkles on the page.
pub const TWINKLE_SPOTS: [(f32, f32); 3] = [(0.10, 0.10), (0.95, 0.30), (0.0, 0.85)];

pub fn twinkle_glyph(tick: u64, index: usize) -> &'static str {
    match (tick / 3 + index as u64) % 3 {
        0 => "✦",
        1 => "✧",
        _ => "·",
    }
}

pub fn house_color(house: House) -> Color {
    match house {
        House::Gryffindor => Color::Red,
        House::Hufflepuff => Color::Yellow,
        House::Ravenclaw => Color::Blue,
        House::Slytherin => Color::Green,
    }
}

/// A crest for the result screen.
pub fn badge_lines(house: House) -> Vec<String> {
    let (emblem, name) = match house {
        House::Gryffindor => ("LION", "GRYFFINDOR"),
        House::Hufflepuff => ("BADGER", "HUFFLEPUFF"),
        House::Ravenclaw => ("EAGLE", "RAVENCLAW"),
        House::Slytherin => ("SERPENT", "SLYTHERIN"),
    };
    vec![
        "╔═════════════╗".to_string(),
        "║  ▲   ▲   ▲  ║".to_string(),
        format!("║{:^13}║", emblem),
        "║─────────────║".to_string(),
        format!("║{:^13}║", name),
        "╚╗           ╔╝".to_string(),
        " ╚╗         ╔╝ ".to_string(),
        "  ╚═════════╝  ".to_string(),
    ]
}

/// Text style for a screen that is `progress` of the way through fading in.
pub fn fade_style(progress: f32) -> Style {
    let color = if progress < 0.34 {
        Color::DarkGray
    } else if progress < 0.67 {
        Color::Gray
    } else {
        Color::White
    };
    Style::default().fg(color)
}

pub fn button_style(progress: f32) -> Style {
    fade_style(progress).add_modifier(Modifier::REVERSED | Modifier::BOLD)
}

/// A `width` x `height` rect centred in `area`, shrunk to fit.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

/// Spreads CJK titles out the way the page letter-spaces them.
pub fn spaced(text: &str) -> String {
    text.chars()
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::Phase;

    #[test]
    fn test_history_scroll_stays_within_limit() {
        let mut view = ViewState::new();
        view.scroll_history(5);
        assert_eq!(view.history_scroll, 0);

        view.set_history_limit(3);
        view.scroll_history(5);
        assert_eq!(view.history_scroll, 3);
        view.scroll_history(-1);
        assert_eq!(view.history_scroll, 2);

        view.set_history_limit(1);
        assert_eq!(view.history_scroll, 1);
        view.scroll_history(-5);
        assert_eq!(view.history_scroll, 0);
    }

    #[test]
    fn test_pupil_rests_without_pointer() {
        let eye = Rect::new(10, 10, 7, 5);
        assert_eq!(pupil_offset(eye, None), (0, 0));
        assert_eq!(pupil_offset(Rect::new(0, 0, 0, 0), Some((3, 3))), (0, 0));
    }

    #[test]
    fn test_pupil_follows_pointer_direction() {
        let eye = Rect::new(10, 10, 7, 5);
        let (x, y) = pupil_offset(eye, Some((60, 12)));
        assert!(x > 0, "pointer on the right should pull right, got {}", x);
        assert_eq!(y, 0);

        let (x, _) = pupil_offset(eye, Some((0, 12)));
        assert!(x < 0);

        let (_, y) = pupil_offset(eye, Some((13, 0)));
        assert!(y < 0);
    }

    #[test]
    fn test_pupil_stays_inside_eye() {
        let eye = Rect::new(10, 10, 7, 5);
        for pointer in [(0, 0), (200, 0), (0, 200), (200, 200), (13, 12)] {
            let (x, y) = pupil_offset(eye, Some(pointer));
            assert!(x.abs() <= 3, "{:?} -> {}", pointer, x);
            assert!(y.abs() <= 2, "{:?} -> {}", pointer, y);
        }
    }

    #[test]
    fn test_bubble_lines_wrap_wide_characters() {
        let lines = bubble_lines("哦，我感受到你的能量了！来吧，让我看看你属于哪一类巫师。", 20);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(textwrap::core::display_width(line) <= 20, "{}", line);
        }
    }

    #[test]
    fn test_hat_lines_have_fixed_width() {
        let lines = hat_lines();
        assert_eq!(lines.len(), HAT_HEIGHT as usize);
        for line in &lines {
            assert_eq!(line.chars().count(), HAT_WIDTH as usize, "{:?}", line);
        }
    }

    #[test]
    fn test_eyes_sit_inside_hat() {
        let hat = Rect::new(0, 0, HAT_WIDTH, HAT_HEIGHT);
        let [left, right] = eye_rects(hat);
        assert!(left.right() <= right.left());
        assert!(hat.contains(left.as_position()));
        assert!(right.bottom() <= hat.bottom());
    }

    #[test]
    fn test_badges_are_rectangular() {
        for house in House::ALL {
            let lines = badge_lines(house);
            let width = lines[0].chars().count();
            assert!(lines.iter().all(|l| l.chars().count() == width), "{:?}", house);
        }
    }

    #[test]
    fn test_clock_plays_animations_once() {
        let mut state = SessionState::new();
        let mut clock = AnimationClock::default();
        clock.observe(&state, 1);
        assert!(clock.reply_phase(1).is_none());

        state.set_phase(Phase::Game);
        state.reply_epoch += 1;
        clock.observe(&state, 10);
        assert_eq!(clock.screen_progress(10), 0.0);
        assert_eq!(clock.screen_progress(10 + TRANSITION_TICKS), 1.0);
        assert_eq!(clock.reply_phase(12), Some(2));
        assert!(clock.reply_phase(10 + REPLY_TICKS).is_none());

        clock.observe(&state, 40);
        assert!(clock.reply_phase(40).is_none());
    }

    #[test]
    fn test_centered_rect_fits_small_areas() {
        let area = Rect::new(0, 0, 10, 4);
        let rect = centered_rect(50, 20, area);
        assert_eq!(rect, area);
        let rect = centered_rect(4, 2, area);
        assert_eq!(rect, Rect::new(3, 1, 4, 2));
    }
}
