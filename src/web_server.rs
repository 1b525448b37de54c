use std::{
    convert::Infallible,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Form, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    serve, Json, Router,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use tokio::sync::{broadcast, Mutex};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::app_state::Snapshot;
use crate::flow::{Action, ChatRequest, FlowController};
use crate::llm_interaction::ChatTransport;

/// Where the web front end finds its files and which port it binds.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

// Shared application state
#[derive(Clone)]
struct AppState {
    templates: Arc<AutoReloader>,
    flow: Arc<Mutex<FlowController>>,
    transport: Arc<dyn ChatTransport>,
    // Every state change is pushed to connected pages
    broadcast_tx: broadcast::Sender<Snapshot>,
}

impl AppState {
    fn publish(&self, snapshot: Snapshot) {
        if self.broadcast_tx.send(snapshot).is_err() {
            debug!("No WebSocket clients to notify");
        }
    }
}

#[derive(Debug, Deserialize)]
struct SayForm {
    message: String,
}

/// Template environment that reloads when files under `dir` change.
pub fn create_minijinja_env(dir: impl AsRef<Path>) -> Result<AutoReloader> {
    let dir = dir.as_ref().to_path_buf();
    if !dir.is_dir() {
        anyhow::bail!("Template directory {} does not exist", dir.display());
    }
    let reloader = AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&dir));
        notifier.watch_path(&dir, true);
        Ok(env)
    });
    Ok(reloader)
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let snapshot = state.flow.lock().await.state().snapshot();

    state
        .templates
        .acquire_env()
        .and_then(|env| {
            env.get_template("index.html").and_then(|tmpl| {
                tmpl.render(minijinja::context! {
                    title => "分院帽测试",
                    state => snapshot,
                })
            })
        })
        .map(Html)
        .map_err(|e| {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
        })
}

async fn state_handler(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.flow.lock().await.state().snapshot())
}

async fn enter_handler(State(state): State<AppState>) -> Redirect {
    apply(&state, Action::Enter, None).await
}

async fn say_handler(State(state): State<AppState>, Form(form): Form<SayForm>) -> Redirect {
    apply(&state, Action::Submit, Some(form.message)).await
}

async fn sort_handler(State(state): State<AppState>) -> Redirect {
    apply(&state, Action::Classify, None).await
}

async fn history_handler(State(state): State<AppState>) -> Redirect {
    apply(&state, Action::ToggleHistory, None).await
}

async fn restart_handler(State(state): State<AppState>) -> Redirect {
    apply(&state, Action::Restart, None).await
}

/// Runs an action against the session, kicks off any request it issues and
/// sends the browser back to the page.
async fn apply(state: &AppState, action: Action, input: Option<String>) -> Redirect {
    let (request, snapshot) = {
        let mut flow = state.flow.lock().await;
        if let Some(text) = input {
            flow.set_input(text);
        }
        let request = flow.dispatch(action);
        (request, flow.state().snapshot())
    };
    debug!(?action, issued = request.is_some(), "Applied web action");
    state.publish(snapshot);

    if let Some(request) = request {
        spawn_request(state.clone(), request);
    }
    Redirect::to("/")
}

fn spawn_request(state: AppState, request: ChatRequest) {
    tokio::spawn(async move {
        let result = state.transport.complete(&request.messages).await;
        let snapshot = {
            let mut flow = state.flow.lock().await;
            flow.complete(request.into_completion(result));
            flow.state().snapshot()
        };
        state.publish(snapshot);
    });
}

// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    debug!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    snapshot: &Snapshot,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(snapshot).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}

// Pushes a snapshot on connect and after every change until the page goes away
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.broadcast_tx.subscribe();

    let initial = state.flow.lock().await.state().snapshot();
    if send_snapshot(&mut sender, &initial).await.is_err() {
        warn!("Failed to send initial snapshot to new WebSocket client");
        return;
    }

    loop {
        tokio::select! {
            update = broadcast_rx.recv() => match update {
                Ok(snapshot) => {
                    if send_snapshot(&mut sender, &snapshot).await.is_err() {
                        debug!("WebSocket client disconnected or send error");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            },
        }
    }
    debug!("WebSocket connection closed");
}

/// Routes for one shared session.
pub fn build_router(
    flow: FlowController,
    transport: Arc<dyn ChatTransport>,
    templates_dir: &Path,
    static_dir: &Path,
) -> Result<Router> {
    let templates = create_minijinja_env(templates_dir).context("Failed to initialize template engine")?;
    let (broadcast_tx, _) = broadcast::channel::<Snapshot>(32);

    let state = AppState {
        templates: Arc::new(templates),
        flow: Arc::new(Mutex::new(flow)),
        transport,
        broadcast_tx,
    };

    let static_files_service = ServeDir::new(static_dir).not_found_service(tower::service_fn(
        |_req: axum::extract::Request| async {
            Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        },
    ));

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/api/state", get(state_handler))
        .route("/ws", get(ws_handler))
        .route("/enter", post(enter_handler))
        .route("/say", post(say_handler))
        .route("/sort", post(sort_handler))
        .route("/history", post(history_handler))
        .route("/restart", post(restart_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn start_web_server(
    config: WebConfig,
    flow: FlowController,
    transport: Arc<dyn ChatTransport>,
) -> Result<()> {
    let app = build_router(flow, transport, &config.templates_dir, &config.static_dir)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
