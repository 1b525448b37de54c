use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Wrap},
    Frame,
};
use tui_textarea::TextArea;

use crate::app_state::{Phase, SessionState};
use crate::conversation::{Message, Role};
use crate::ui_components::{
    badge_lines, bubble_lines, button_style, centered_rect, eye_rects, fade_style, hat_lines,
    house_color, loader_frame, pupil_offset, spaced, twinkle_glyph, ViewState, HAT_HEIGHT,
    HAT_WIDTH, TWINKLE_SPOTS,
};

const BUBBLE_MAX_WIDTH: u16 = 56;
const HAT_BROWN: Color = Color::Rgb(150, 105, 60);

/// Draws whichever screen the session is on.
pub fn draw_ui(f: &mut Frame, state: &SessionState, view: &ViewState, textarea: &TextArea) {
    let area = f.area();
    f.render_widget(Block::default().style(Style::default().bg(Color::Black)), area);

    match state.phase {
        Phase::Start => render_start(f, view, area),
        Phase::Game => {
            render_game(f, state, view, textarea, area);
            if state.show_history {
                render_history_overlay(f, state, view, area);
            }
        }
        Phase::Result => render_result(f, state, view, area),
    }
}

/// Title for the input box.
pub fn input_title(state: &SessionState) -> &'static str {
    if state.in_flight {
        " 分院帽思考中… "
    } else {
        " Enter → 发送 │ Ctrl+S × 分院 │ F2 历史 │ Esc 退出 "
    }
}

fn render_start(f: &mut Frame, view: &ViewState, area: Rect) {
    let progress = view.clock.screen_progress(view.tick);
    let style = fade_style(progress);
    let hint_style = if (view.tick / 5) % 2 == 0 {
        style
    } else {
        style.fg(Color::DarkGray)
    };

    let lines = vec![
        Line::from(Span::styled("✦  HARRY POTTER  ✦", style.add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(Span::styled(spaced("分院帽测试"), style.add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled("[  E N T E R  ]", button_style(progress))),
        Line::from(""),
        Line::from(Span::styled("PRESS ENTER TO START", hint_style)),
    ];
    let height = lines.len() as u16;
    let paragraph = Paragraph::new(lines).alignment(Alignment::Center);
    f.render_widget(paragraph, centered_rect(area.width, height, area));
}

fn render_game(
    f: &mut Frame,
    state: &SessionState,
    view: &ViewState,
    textarea: &TextArea,
    area: Rect,
) {
    let [stage, input] = Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(area);
    let reply_phase = view.clock.reply_phase(view.tick);

    // Bubble contents
    let bubble = state.conversation.latest_assistant().map(|message| {
        if message.is_pending() {
            (vec![loader_frame(view.tick).to_string()], true)
        } else {
            let max_width = stage.width.saturating_sub(8).min(BUBBLE_MAX_WIDTH);
            (bubble_lines(&message.content, max_width as usize), false)
        }
    });
    let bubble_height = bubble.as_ref().map_or(0, |(lines, _)| lines.len() as u16 + 3);

    let total = bubble_height + 1 + HAT_HEIGHT;
    let mut y = stage.y + stage.height.saturating_sub(total) / 2;

    if let Some((lines, pending)) = bubble {
        let bounce = match reply_phase {
            Some(p) if p < 4 && p % 2 == 0 => 1,
            _ => 0,
        };
        let text_width = lines
            .iter()
            .map(|l| Line::from(l.as_str()).width() as u16)
            .max()
            .unwrap_or(0);
        let bubble_area = centered_rect(text_width + 4, lines.len() as u16 + 2, stage);
        let bubble_area = Rect {
            y: y + bounce,
            ..bubble_area
        }
        .intersection(stage);

        let text_style = if pending {
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC)
        } else {
            Style::default().fg(Color::Black)
        };
        let paragraph = Paragraph::new(lines.into_iter().map(Line::from).collect::<Vec<_>>())
            .style(text_style)
            .alignment(Alignment::Center)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .style(Style::default().bg(Color::White).fg(Color::White)),
            );
        f.render_widget(Clear, bubble_area);
        f.render_widget(paragraph, bubble_area);

        let tail = Rect::new(
            bubble_area.x + bubble_area.width / 2,
            bubble_area.bottom(),
            1,
            1,
        )
        .intersection(stage);
        f.render_widget(Paragraph::new("▼").style(Style::default().fg(Color::White)), tail);
        y += bubble_height;
    }

    render_hat(f, state, view, stage, y + 1, reply_phase);

    let style = if state.in_flight {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::White)
    };
    f.render_widget(Clear, input);
    f.render_widget(textarea, input);
    if state.in_flight {
        f.buffer_mut().set_style(input, style);
    }
}

fn render_hat(
    f: &mut Frame,
    state: &SessionState,
    view: &ViewState,
    stage: Rect,
    y: u16,
    reply_phase: Option<u64>,
) {
    let wobble: i32 = if state.in_flight {
        if (view.tick / 2) % 2 == 0 { -1 } else { 1 }
    } else {
        match reply_phase {
            Some(p) if p < 6 => [1, -1, 1, -1, 0, 0][p as usize],
            _ => 0,
        }
    };
    let x = i32::from(stage.x) + i32::from(stage.width.saturating_sub(HAT_WIDTH) / 2) + wobble;
    let x = x.max(i32::from(stage.x)) as u16;
    let unclipped = Rect::new(x, y, HAT_WIDTH, HAT_HEIGHT);
    let hat = unclipped.intersection(stage);
    if hat.is_empty() {
        return;
    }

    let color = if state.in_flight { Color::Magenta } else { HAT_BROWN };
    let lines: Vec<Line> = hat_lines().into_iter().map(Line::from).collect();
    f.render_widget(Paragraph::new(lines).style(Style::default().fg(color)), hat);

    // Eyes only when the whole hat is on screen
    if hat == unclipped {
        for eye in eye_rects(hat) {
            render_eye(f, view, eye);
        }
    }

    if state.in_flight {
        for (i, (fx, fy)) in TWINKLE_SPOTS.iter().enumerate() {
            let sx = hat.x + (fx * f32::from(hat.width.saturating_sub(1))) as u16;
            let sy = hat.y + (fy * f32::from(hat.height.saturating_sub(1))) as u16;
            let spot = Rect::new(sx, sy, 1, 1).intersection(stage);
            f.render_widget(
                Paragraph::new(twinkle_glyph(view.tick, i)).style(Style::default().fg(Color::Yellow)),
                spot,
            );
        }
    }
}

fn render_eye(f: &mut Frame, view: &ViewState, eye: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .style(Style::default().fg(Color::White).bg(Color::Black));
    let inner = block.inner(eye);
    f.render_widget(Clear, eye);
    f.render_widget(block, eye);
    if inner.is_empty() {
        return;
    }

    let (dx, dy) = pupil_offset(inner, view.pointer);
    let cx = i32::from(inner.x + inner.width / 2) + i32::from(dx);
    let cy = i32::from(inner.y + inner.height / 2) + i32::from(dy);
    let px = cx.clamp(i32::from(inner.x), i32::from(inner.right()) - 1) as u16;
    let py = cy.clamp(i32::from(inner.y), i32::from(inner.bottom()) - 1) as u16;
    f.render_widget(
        Paragraph::new("●").style(Style::default().fg(Color::White)),
        Rect::new(px, py, 1, 1),
    );
}

fn history_overlay_area(area: Rect) -> Rect {
    Rect {
        x: area.x + 2,
        y: area.y + 1,
        width: area.width.saturating_sub(4),
        height: area.height.saturating_sub(2),
    }
}

fn history_content(message: &Message) -> &str {
    if message.is_pending() {
        "…"
    } else {
        &message.content
    }
}

/// Furthest the history overlay can scroll before the text runs out.
pub fn history_max_scroll(state: &SessionState, area: Rect) -> u16 {
    let overlay = history_overlay_area(area);
    let inner_width = overlay.width.saturating_sub(2);
    let inner_height = overlay.height.saturating_sub(2);
    if inner_width == 0 {
        return 0;
    }
    // Each message is followed by a blank line
    let lines: usize = state
        .conversation
        .iter()
        .map(|m| bubble_lines(history_content(m), inner_width as usize).len() + 1)
        .sum();
    u16::try_from(lines)
        .unwrap_or(u16::MAX)
        .saturating_sub(inner_height)
}

fn render_history_overlay(f: &mut Frame, state: &SessionState, view: &ViewState, area: Rect) {
    let overlay = history_overlay_area(area);
    if overlay.is_empty() {
        return;
    }

    let mut lines = Vec::new();
    for message in state.conversation.iter() {
        let content = history_content(message).to_string();
        let line = match message.role {
            Role::User => Line::from(Span::styled(
                content,
                Style::default().fg(Color::Cyan),
            ))
            .alignment(Alignment::Right),
            Role::Assistant => Line::from(Span::styled(
                content,
                Style::default().fg(Color::White),
            ))
            .alignment(Alignment::Left),
        };
        lines.push(line);
        lines.push(Line::from(""));
    }

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Gray))
                .title(" 对话历史 (F2 关闭) ")
                .style(Style::default().bg(Color::Black)),
        )
        .wrap(Wrap { trim: true })
        .scroll((view.history_scroll.min(history_max_scroll(state, area)), 0));

    f.render_widget(Clear, overlay);
    f.render_widget(paragraph, overlay);
}

fn render_result(f: &mut Frame, state: &SessionState, view: &ViewState, area: Rect) {
    let progress = view.clock.screen_progress(view.tick);
    let style = fade_style(progress);

    let mut lines = vec![
        Line::from(Span::styled(spaced("分院结果"), style.add_modifier(Modifier::BOLD))),
        Line::from(""),
    ];

    if let Some(outcome) = &state.outcome {
        let outcome_style = match outcome.house() {
            Some(house) if progress >= 1.0 => Style::default()
                .fg(house_color(house))
                .add_modifier(Modifier::BOLD),
            _ => style.add_modifier(Modifier::BOLD),
        };
        lines.push(Line::from(Span::styled(
            outcome.display_name().to_string(),
            outcome_style,
        )));
        lines.push(Line::from(""));

        if let Some(house) = outcome.house() {
            let badge_style = if progress >= 1.0 {
                Style::default().fg(house_color(house))
            } else {
                style
            };
            lines.extend(
                badge_lines(house)
                    .into_iter()
                    .map(|l| Line::from(Span::styled(l, badge_style))),
            );
            lines.push(Line::from(""));
        }
    }

    lines.push(Line::from(Span::styled("[  R E S T A R T  ]", button_style(progress))));
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "PRESS ENTER TO RESTART",
        style.fg(Color::DarkGray),
    )));

    let height = lines.len() as u16;
    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, centered_rect(area.width, height, area));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::{House, SortingOutcome};
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};

    fn render(state: &SessionState, view: &ViewState, width: u16, height: u16) -> Buffer {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        let textarea = TextArea::default();
        terminal
            .draw(|f| draw_ui(f, state, view, &textarea))
            .unwrap();
        terminal.backend().buffer().clone()
    }

    // Wide characters leave a blank cell behind them, so compare without spaces.
    fn screen_text(buffer: &Buffer) -> String {
        buffer
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect::<String>()
            .replace(' ', "")
    }

    fn settled_view(state: &SessionState) -> ViewState {
        let mut view = ViewState::new();
        for _ in 0..20 {
            view.advance(state);
        }
        view
    }

    #[test]
    fn test_start_screen() {
        let state = SessionState::new();
        let text = screen_text(&render(&state, &settled_view(&state), 80, 30));
        assert!(text.contains("分院帽测试"));
        assert!(text.contains("[ENTER]"));
    }

    #[test]
    fn test_game_screen_shows_latest_reply() {
        let mut state = SessionState::new();
        state.set_phase(Phase::Game);
        state.conversation.push_assistant("哦，我感受到你的能量了！");
        let text = screen_text(&render(&state, &settled_view(&state), 100, 40));
        assert!(text.contains("哦，我感受到你的能量了！"));
        assert!(text.contains("●"));
    }

    #[test]
    fn test_game_screen_shows_loader_while_pending() {
        let mut state = SessionState::new();
        state.set_phase(Phase::Game);
        state.in_flight = true;
        state.conversation.push_pending();
        let text = screen_text(&render(&state, &settled_view(&state), 100, 40));
        assert!(!text.contains("loading"));
        assert!(text.contains("○"));
    }

    #[test]
    fn test_history_overlay_lists_every_message() {
        let mut state = SessionState::new();
        state.set_phase(Phase::Game);
        state.conversation.push_assistant("welcome");
        state.conversation.push_user("I like chess");
        state.conversation.push_assistant("clever");
        state.show_history = true;

        let text = screen_text(&render(&state, &settled_view(&state), 80, 30));
        assert!(text.contains("对话历史"));
        assert!(text.contains("welcome"));
        assert!(text.contains("Ilikechess"));
        assert!(text.contains("clever"));
    }

    #[test]
    fn test_history_scroll_limit_tracks_text() {
        let area = Rect::new(0, 0, 40, 12);
        let mut state = SessionState::new();
        state.set_phase(Phase::Game);
        state.conversation.push_assistant("welcome");
        assert_eq!(history_max_scroll(&state, area), 0);

        for i in 0..10 {
            state.conversation.push_user(format!("line {}", i));
        }
        // 11 messages plus blank separators in an 8-row inner area
        assert_eq!(history_max_scroll(&state, area), 22 - 8);
    }

    #[test]
    fn test_history_overlay_never_scrolls_past_the_end() {
        let mut state = SessionState::new();
        state.set_phase(Phase::Game);
        state.conversation.push_assistant("welcome");
        state.conversation.push_user("only line");
        state.show_history = true;

        let mut view = settled_view(&state);
        view.history_scroll = 50;
        let text = screen_text(&render(&state, &view, 80, 30));
        assert!(text.contains("welcome"));
        assert!(text.contains("onlyline"));
    }

    #[test]
    fn test_result_screen_shows_house_and_badge() {
        let mut state = SessionState::new();
        state.set_phase(Phase::Result);
        state.outcome = Some(SortingOutcome::House(House::Ravenclaw));
        let text = screen_text(&render(&state, &settled_view(&state), 80, 40));
        assert!(text.contains("分院结果"));
        assert!(text.contains("拉文克劳"));
        assert!(text.contains("RAVENCLAW"));
        assert!(text.contains("[RESTART]"));
    }

    #[test]
    fn test_result_screen_verbatim_has_no_badge() {
        let mut state = SessionState::new();
        state.set_phase(Phase::Result);
        state.outcome = Some(SortingOutcome::Verbatim("我无法判断。".to_string()));
        let text = screen_text(&render(&state, &settled_view(&state), 80, 30));
        assert!(text.contains("我无法判断。"));
        assert!(!text.contains("╔"));
    }

    #[test]
    fn test_tiny_terminal_does_not_panic() {
        let mut state = SessionState::new();
        state.set_phase(Phase::Game);
        state.in_flight = true;
        state.conversation.push_pending();
        state.show_history = true;
        let view = settled_view(&state);
        render(&state, &view, 12, 6);

        state.set_phase(Phase::Result);
        state.outcome = Some(SortingOutcome::House(House::Gryffindor));
        render(&state, &view, 12, 6);
    }
}
