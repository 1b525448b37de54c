use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use sorting_hat::{
    constants, llm_interaction::ChatMessage, web_server, ChatTransport, FlowController,
    TransportError,
};

/// Greets, chats, and sorts everyone into Ravenclaw.
#[derive(Default)]
struct RavenclawTransport {
    calls: AtomicUsize,
}

#[async_trait]
impl ChatTransport for RavenclawTransport {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        let reply = if last == constants::OPENING_LINE {
            "欢迎来到霍格沃茨，孩子。".to_string()
        } else if last == constants::CLASSIFICATION_INSTRUCTION {
            "拉文克劳".to_string()
        } else {
            format!("你说: {}", last)
        };
        Ok(reply)
    }
}

fn asset_dir(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(name)
}

fn server_with(transport: Arc<RavenclawTransport>) -> TestServer {
    let router = web_server::build_router(
        FlowController::default(),
        transport,
        &asset_dir("templates"),
        &asset_dir("static"),
    )
    .unwrap();
    TestServer::new(router).unwrap()
}

async fn settled_state(server: &TestServer) -> Value {
    for _ in 0..100 {
        let state: Value = server.get("/api/state").await.json();
        if state["in_flight"] == json!(false) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request never completed");
}

#[tokio::test]
async fn test_start_screen_renders() {
    let server = server_with(Arc::default());
    let response = server.get("/").await;
    response.assert_status_ok();
    let html = response.text();
    assert!(html.contains("分院帽测试"));
    assert!(html.contains("action=\"/enter\""));
    // Enter works without clicking first
    assert!(html.contains("id=\"enter-form\""));
    assert!(html.contains("class=\"primary\" autofocus"));
}

#[test_log::test(tokio::test)]
async fn test_full_session_over_http() {
    let transport = Arc::new(RavenclawTransport::default());
    let server = server_with(transport.clone());

    server.post("/enter").await.assert_status(StatusCode::SEE_OTHER);
    let state = settled_state(&server).await;
    assert_eq!(state["phase"], "game");
    assert_eq!(state["bubble"], "欢迎来到霍格沃茨，孩子。");
    assert!(server.get("/").await.text().contains("欢迎来到霍格沃茨，孩子。"));

    server
        .post("/say")
        .form(&json!({ "message": "我喜欢读书" }))
        .await
        .assert_status(StatusCode::SEE_OTHER);
    let state = settled_state(&server).await;
    assert_eq!(state["messages"].as_array().unwrap().len(), 3);
    assert_eq!(state["bubble"], "你说: 我喜欢读书");
    assert_eq!(state["messages"][2]["pending"], false);

    server.post("/history").await;
    let state = settled_state(&server).await;
    assert_eq!(state["show_history"], true);
    assert!(server.get("/").await.text().contains("对话历史"));
    server.post("/history").await;

    server.post("/sort").await.assert_status(StatusCode::SEE_OTHER);
    let state = settled_state(&server).await;
    assert_eq!(state["phase"], "result");
    assert_eq!(state["outcome"], "拉文克劳");
    assert_eq!(state["badge"], "Ravenclaw");
    assert!(server.get("/").await.text().contains("badge-ravenclaw"));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

    server.post("/restart").await.assert_status(StatusCode::SEE_OTHER);
    let state = settled_state(&server).await;
    assert_eq!(state["phase"], "start");
    assert_eq!(state["messages"], json!([]));
    assert_eq!(state["outcome"], Value::Null);
}

#[tokio::test]
async fn test_sort_without_talking_scolds_once() {
    let transport = Arc::new(RavenclawTransport::default());
    let server = server_with(transport.clone());

    server.post("/enter").await;
    settled_state(&server).await;
    server.post("/sort").await;
    server.post("/sort").await;

    let state = settled_state(&server).await;
    assert_eq!(state["phase"], "game");
    let messages = state["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["content"], constants::SCOLDING);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_blank_message_is_ignored() {
    let transport = Arc::new(RavenclawTransport::default());
    let server = server_with(transport.clone());

    server.post("/enter").await;
    settled_state(&server).await;
    server.post("/say").form(&json!({ "message": "   " })).await;

    let state = settled_state(&server).await;
    assert_eq!(state["messages"].as_array().unwrap().len(), 1);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_actions_outside_their_screen_do_nothing() {
    let transport = Arc::new(RavenclawTransport::default());
    let server = server_with(transport.clone());

    server.post("/restart").await;
    server.post("/sort").await;
    server.post("/say").form(&json!({ "message": "hello" })).await;

    let state = settled_state(&server).await;
    assert_eq!(state["phase"], "start");
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_static_files() {
    let server = server_with(Arc::default());
    server.get("/static/style.css").await.assert_status_ok();
    server
        .get("/static/missing.css")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[test]
fn test_missing_templates_fail_router_setup() {
    let dir = tempfile::TempDir::new().unwrap();
    let result = web_server::build_router(
        FlowController::default(),
        Arc::new(RavenclawTransport::default()),
        &dir.path().join("templates"),
        dir.path(),
    );
    assert!(result.is_err());
}
