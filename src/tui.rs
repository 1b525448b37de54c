use std::{io, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
        EnableFocusChange, EnableMouseCapture,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::Rect,
    widgets::{Block, Borders},
    Terminal,
};
use tokio::sync::mpsc;
use tui_textarea::TextArea;

use crate::events::{map_event, Command};
use crate::flow::{Action, ChatRequest, Completion, FlowController};
use crate::llm_interaction::ChatTransport;
use crate::ui;
use crate::ui_components::ViewState;

const FRAME_INTERVAL: Duration = Duration::from_millis(80);

fn new_textarea() -> TextArea<'static> {
    let mut textarea = TextArea::default();
    textarea.set_placeholder_text("和分院帽进行对话");
    textarea.set_cursor_line_style(ratatui::style::Style::default());
    textarea
}

/// Terminal front end: owns the controller, the input box and outstanding requests.
pub struct App {
    flow: FlowController,
    transport: Arc<dyn ChatTransport>,
    textarea: TextArea<'static>,
    view: ViewState,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
}

impl App {
    pub fn new(flow: FlowController, transport: Arc<dyn ChatTransport>) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            flow,
            transport,
            textarea: new_textarea(),
            view: ViewState::new(),
            completion_tx,
            completion_rx,
        }
    }

    pub fn flow(&self) -> &FlowController {
        &self.flow
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn input_text(&self) -> String {
        self.textarea.lines().join(" ")
    }

    /// Applies one command. Returns `false` when the app should exit.
    pub fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Quit => return false,
            Command::Flow(action) => self.dispatch(action),
            Command::Edit(key) => {
                self.textarea.input(key);
                self.flow.set_input(self.input_text());
            }
            Command::Paste(data) => {
                self.textarea.insert_str(data);
                self.flow.set_input(self.input_text());
            }
            Command::Pointer(pointer) => self.view.pointer = pointer,
            Command::ScrollHistory(delta) => self.view.scroll_history(delta),
            Command::Ignore => {}
        }
        true
    }

    fn dispatch(&mut self, action: Action) {
        if let Some(request) = self.flow.dispatch(action) {
            self.spawn_request(request);
        }
        let textarea_has_text = self.textarea.lines().iter().any(|l| !l.is_empty());
        if self.flow.state().input.is_empty() && textarea_has_text {
            self.textarea = new_textarea();
        }
    }

    fn spawn_request(&self, request: ChatRequest) {
        let transport = self.transport.clone();
        let tx = self.completion_tx.clone();
        tracing::debug!(kind = ?request.kind, session_id = request.session_id, "Spawning chat request");
        tokio::spawn(async move {
            let result = transport.complete(&request.messages).await;
            if tx.send(request.into_completion(result)).is_err() {
                tracing::debug!("App closed before the chat request finished");
            }
        });
    }

    /// Applies every completion that has arrived so far.
    pub fn process_completions(&mut self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.flow.complete(completion);
        }
    }

    /// Waits for the next completion and applies it.
    pub async fn wait_for_completion(&mut self) {
        if let Some(completion) = self.completion_rx.recv().await {
            self.flow.complete(completion);
        }
    }

    fn prepare_frame(&mut self, area: Rect) {
        self.view.advance(self.flow.state());
        self.view
            .set_history_limit(ui::history_max_scroll(self.flow.state(), area));
        self.textarea.set_block(
            Block::default()
                .borders(Borders::ALL)
                .title(ui::input_title(self.flow.state())),
        );
    }
}

/// Takes over the terminal and runs until the user quits.
pub async fn run(flow: FlowController, transport: Arc<dyn ChatTransport>) -> Result<()> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste,
        EnableFocusChange
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(flow, transport);
    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste,
        DisableFocusChange
    )?;
    terminal.show_cursor()?;

    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        app.process_completions();
        let size = terminal.size()?;
        app.prepare_frame(Rect::new(0, 0, size.width, size.height));

        terminal.draw(|f| ui::draw_ui(f, app.flow.state(), &app.view, &app.textarea))?;

        if event::poll(FRAME_INTERVAL)? {
            let event = event::read()?;
            let command = map_event(&event, app.flow.state());
            tracing::trace!(?command, "Terminal event");
            if !app.apply(command) {
                tracing::info!("Quitting");
                return Ok(());
            }
        }
    }
}
