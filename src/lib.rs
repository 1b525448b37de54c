pub mod app_state;
pub mod chat;
pub mod constants;
pub mod conversation;
pub mod events;
pub mod flow;
pub mod llm_interaction;
pub mod tui;
pub mod ui;
pub mod ui_components;
pub mod web_server;

pub use app_state::{House, Phase, SessionState, Snapshot, SortingOutcome};
pub use flow::{Action, FlowController, HatScript};
pub use llm_interaction::{ApiConfig, ChatTransport, HttpChatTransport, TransportError};
