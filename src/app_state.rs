use serde::Serialize;

use crate::constants;
use crate::conversation::{Conversation, Message};

/// Which screen is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Start,
    Game,
    Result,
}

/// The four houses, in the order a reply is scanned for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum House {
    Gryffindor,
    Hufflepuff,
    Ravenclaw,
    Slytherin,
}

impl House {
    pub const ALL: [House; 4] = [
        House::Gryffindor,
        House::Hufflepuff,
        House::Ravenclaw,
        House::Slytherin,
    ];

    pub fn name(self) -> &'static str {
        match self {
            House::Gryffindor => "格兰芬多",
            House::Hufflepuff => "赫奇帕奇",
            House::Ravenclaw => "拉文克劳",
            House::Slytherin => "斯莱特林",
        }
    }

    /// First house whose name appears anywhere in `text`.
    pub fn find_in(text: &str) -> Option<House> {
        House::ALL.into_iter().find(|house| text.contains(house.name()))
    }
}

/// What the hat decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortingOutcome {
    House(House),
    /// The reply named no known house; shown as-is.
    Verbatim(String),
    /// The classification request failed.
    Undecided,
}

impl SortingOutcome {
    pub fn from_reply(reply: String) -> Self {
        match House::find_in(&reply) {
            Some(house) => SortingOutcome::House(house),
            None => SortingOutcome::Verbatim(reply),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            SortingOutcome::House(house) => house.name(),
            SortingOutcome::Verbatim(text) => text,
            SortingOutcome::Undecided => constants::UNDECIDED,
        }
    }

    pub fn house(&self) -> Option<House> {
        match self {
            SortingOutcome::House(house) => Some(*house),
            _ => None,
        }
    }
}

/// Everything about the current session. Dropped wholesale on restart.
#[derive(Debug, Default)]
pub struct SessionState {
    pub phase: Phase,
    pub conversation: Conversation,
    pub in_flight: bool,
    pub input: String,
    pub outcome: Option<SortingOutcome>,
    pub show_history: bool,
    /// Bumped on restart and on every game entry; requests carry it.
    pub session_id: u64,
    /// Bumped on every phase change to restart the screen transition.
    pub screen_epoch: u64,
    /// Bumped every time a real hat message lands.
    pub reply_epoch: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.screen_epoch += 1;
        }
    }

    /// True while the speech bubble should show the loader.
    pub fn is_thinking(&self) -> bool {
        self.in_flight && self.conversation.has_pending()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            messages: self.conversation.messages().to_vec(),
            bubble: self
                .conversation
                .latest_assistant()
                .filter(|m| !m.is_pending())
                .map(|m| m.content.clone()),
            thinking: self.is_thinking(),
            in_flight: self.in_flight,
            outcome: self.outcome.as_ref().map(|o| o.display_name().to_string()),
            badge: self.outcome.as_ref().and_then(SortingOutcome::house),
            show_history: self.show_history,
            screen_epoch: self.screen_epoch,
            reply_epoch: self.reply_epoch,
        }
    }
}

/// Serializable view of a session for the web front end.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub messages: Vec<Message>,
    pub bubble: Option<String>,
    pub thinking: bool,
    pub in_flight: bool,
    pub outcome: Option<String>,
    pub badge: Option<House>,
    pub show_history: bool,
    pub screen_epoch: u64,
    pub reply_epoch: u64,
}
