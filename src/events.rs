use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};

use crate::app_state::{Phase, SessionState};
use crate::flow::Action;

/// What a terminal event means for the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Flow(Action),
    /// Goes to the input box.
    Edit(KeyEvent),
    Paste(String),
    Pointer(Option<(u16, u16)>),
    ScrollHistory(i16),
    Ignore,
}

pub fn map_event(event: &Event, state: &SessionState) -> Command {
    match event {
        Event::Key(key) if key.kind != KeyEventKind::Release => map_key(*key, state),
        Event::Paste(data) if state.phase == Phase::Game && !state.in_flight => {
            // Single-line input: newlines become spaces
            Command::Paste(data.replace(['\r', '\n'], " "))
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                Command::Pointer(Some((mouse.column, mouse.row)))
            }
            MouseEventKind::ScrollUp if state.show_history => Command::ScrollHistory(-1),
            MouseEventKind::ScrollDown if state.show_history => Command::ScrollHistory(1),
            _ => Command::Ignore,
        },
        Event::FocusLost => Command::Pointer(None),
        _ => Command::Ignore,
    }
}

fn map_key(key: KeyEvent, state: &SessionState) -> Command {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Command::Quit;
    }

    match state.phase {
        Phase::Start => match key.code {
            KeyCode::Enter => Command::Flow(Action::Enter),
            KeyCode::Esc | KeyCode::Char('q') => Command::Quit,
            _ => Command::Ignore,
        },
        Phase::Game => {
            if state.show_history {
                return match key.code {
                    KeyCode::F(2) | KeyCode::Esc => Command::Flow(Action::ToggleHistory),
                    KeyCode::Up => Command::ScrollHistory(-1),
                    KeyCode::Down => Command::ScrollHistory(1),
                    KeyCode::PageUp => Command::ScrollHistory(-5),
                    KeyCode::PageDown => Command::ScrollHistory(5),
                    _ => Command::Ignore,
                };
            }
            match (key.modifiers, key.code) {
                (_, KeyCode::Esc) => Command::Quit,
                (_, KeyCode::F(2)) => Command::Flow(Action::ToggleHistory),
                (KeyModifiers::CONTROL, KeyCode::Char('s')) => Command::Flow(Action::Classify),
                (_, KeyCode::Enter) => Command::Flow(Action::Submit),
                _ if state.in_flight => Command::Ignore,
                _ => Command::Edit(key),
            }
        }
        Phase::Result => match key.code {
            KeyCode::Enter | KeyCode::Char('r') => Command::Flow(Action::Restart),
            KeyCode::Esc | KeyCode::Char('q') => Command::Quit,
            _ => Command::Ignore,
        },
    }
}
