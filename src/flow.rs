//! The start → game → result state machine.
//!
//! Actions that need the model return a [`ChatRequest`] instead of calling it.
//! The front end runs the request on a [`ChatTransport`] however suits it and
//! hands the outcome back through [`FlowController::complete`].

use tracing::{debug, info, warn};

use crate::app_state::{Phase, SessionState, SortingOutcome};
use crate::constants;
use crate::conversation::Message;
use crate::llm_interaction::{ChatMessage, ChatTransport, TransportError};

/// Fixed text the hat works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HatScript {
    pub system_prompt: String,
    pub opening_line: String,
    pub classification_instruction: String,
    pub welcome_fallback: String,
    pub apology: String,
    pub scolding: String,
}

impl Default for HatScript {
    fn default() -> Self {
        Self {
            system_prompt: constants::SYSTEM_PROMPT.to_string(),
            opening_line: constants::OPENING_LINE.to_string(),
            classification_instruction: constants::CLASSIFICATION_INSTRUCTION.to_string(),
            welcome_fallback: constants::WELCOME_FALLBACK.to_string(),
            apology: constants::APOLOGY.to_string(),
            scolding: constants::SCOLDING.to_string(),
        }
    }
}

/// User-facing controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Enter,
    Submit,
    Classify,
    ToggleHistory,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Opening,
    Turn,
    Classification,
}

/// A call the controller wants made.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub kind: RequestKind,
    pub session_id: u64,
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn into_completion(self, result: Result<String, TransportError>) -> Completion {
        Completion {
            kind: self.kind,
            session_id: self.session_id,
            result,
        }
    }
}

/// The answer to a [`ChatRequest`].
#[derive(Debug)]
pub struct Completion {
    pub kind: RequestKind,
    pub session_id: u64,
    pub result: Result<String, TransportError>,
}

pub struct FlowController {
    script: HatScript,
    state: SessionState,
}

impl FlowController {
    pub fn new(script: HatScript) -> Self {
        Self {
            script,
            state: SessionState::new(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn script(&self) -> &HatScript {
        &self.script
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.input = text.into();
    }

    pub fn dispatch(&mut self, action: Action) -> Option<ChatRequest> {
        match action {
            Action::Enter => self.enter_game(),
            Action::Submit => self.submit(),
            Action::Classify => self.classify(),
            Action::ToggleHistory => {
                self.toggle_history();
                None
            }
            Action::Restart => {
                self.restart();
                None
            }
        }
    }

    /// Leaves the start screen and asks the hat for its opening line.
    pub fn enter_game(&mut self) -> Option<ChatRequest> {
        if self.state.phase != Phase::Start {
            debug!(phase = ?self.state.phase, "Ignoring enter outside the start screen");
            return None;
        }
        info!("Entering game");
        self.state.set_phase(Phase::Game);
        self.state.session_id += 1;
        self.state.show_history = false;
        self.state.input.clear();
        self.state.conversation.reset_to(Message::pending());
        self.state.in_flight = true;

        Some(self.request(
            RequestKind::Opening,
            vec![
                ChatMessage::system(&self.script.system_prompt),
                ChatMessage::user(&self.script.opening_line),
            ],
        ))
    }

    /// Sends the input buffer as the user's next turn.
    pub fn submit(&mut self) -> Option<ChatRequest> {
        if self.state.phase != Phase::Game {
            return None;
        }
        let text = self.state.input.trim();
        if text.is_empty() || self.state.in_flight {
            debug!(in_flight = self.state.in_flight, "Ignoring submit");
            return None;
        }
        let text = text.to_string();
        info!(chars = text.chars().count(), "Submitting turn");

        self.state.input.clear();
        self.state.conversation.push_user(text);
        let messages = self.context(None);
        self.state.conversation.push_pending();
        self.state.in_flight = true;

        Some(self.request(RequestKind::Turn, messages))
    }

    /// Asks the hat to commit to a house.
    pub fn classify(&mut self) -> Option<ChatRequest> {
        if self.state.phase != Phase::Game || self.state.in_flight {
            debug!(phase = ?self.state.phase, in_flight = self.state.in_flight, "Ignoring classify");
            return None;
        }
        let already_scolded = self
            .state
            .conversation
            .latest_assistant()
            .is_some_and(|m| m.content == self.script.scolding);
        if already_scolded {
            return None;
        }
        if !self.state.conversation.has_user_messages() {
            info!("Classification requested before the user said anything");
            self.state.conversation.push_assistant(self.script.scolding.clone());
            self.state.reply_epoch += 1;
            return None;
        }

        info!("Requesting classification");
        let instruction = ChatMessage::user(&self.script.classification_instruction);
        let messages = self.context(Some(instruction));
        self.state.conversation.push_pending();
        self.state.in_flight = true;

        Some(self.request(RequestKind::Classification, messages))
    }

    pub fn toggle_history(&mut self) {
        if self.state.phase == Phase::Game {
            self.state.show_history = !self.state.show_history;
        }
    }

    /// Throws the session away and goes back to the start screen.
    pub fn restart(&mut self) {
        if self.state.phase != Phase::Result {
            debug!(phase = ?self.state.phase, "Ignoring restart outside the result screen");
            return;
        }
        info!("Restarting");
        let session_id = self.state.session_id + 1;
        let screen_epoch = self.state.screen_epoch;
        let reply_epoch = self.state.reply_epoch;
        self.state = SessionState {
            session_id,
            screen_epoch,
            reply_epoch,
            ..SessionState::default()
        };
        self.state.screen_epoch += 1;
    }

    /// Applies the outcome of a request issued earlier.
    pub fn complete(&mut self, completion: Completion) {
        let Completion {
            kind,
            session_id,
            result,
        } = completion;

        if session_id != self.state.session_id || !self.state.in_flight {
            debug!(?kind, session_id, current = self.state.session_id, "Dropping stale completion");
            return;
        }
        self.state.in_flight = false;

        if let Err(e) = &result {
            warn!(?kind, error = %e, "Assistant request failed");
        }

        match kind {
            RequestKind::Opening => {
                let text = result.unwrap_or_else(|_| self.script.welcome_fallback.clone());
                self.resolve_reply(text);
            }
            RequestKind::Turn => {
                let text = result.unwrap_or_else(|_| self.script.apology.clone());
                self.resolve_reply(text);
            }
            RequestKind::Classification => {
                self.state.conversation.remove_pending();
                let outcome = match result {
                    Ok(reply) => SortingOutcome::from_reply(reply),
                    Err(_) => SortingOutcome::Undecided,
                };
                info!(house = outcome.display_name(), "Sorting decided");
                if self.state.outcome.is_none() {
                    self.state.outcome = Some(outcome);
                }
                self.state.show_history = false;
                self.state.set_phase(Phase::Result);
            }
        }
    }

    /// Runs `request` on `transport` and applies the result.
    pub async fn run<T: ChatTransport + ?Sized>(&mut self, transport: &T, request: ChatRequest) {
        let result = transport.complete(&request.messages).await;
        self.complete(request.into_completion(result));
    }

    fn resolve_reply(&mut self, text: String) {
        let message = Message::assistant(text);
        if self.state.conversation.has_pending() {
            self.state.conversation.resolve_pending(message);
        } else {
            self.state.conversation.push_assistant(message.content);
        }
        self.state.reply_epoch += 1;
    }

    fn context(&self, trailing: Option<ChatMessage>) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(&self.script.system_prompt)];
        messages.extend(self.state.conversation.to_context());
        messages.extend(trailing);
        messages
    }

    fn request(&self, kind: RequestKind, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            kind,
            session_id: self.state.session_id,
            messages,
        }
    }
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new(HatScript::default())
    }
}
