use std::sync::Arc;
use std::time::Duration;

use automation_chat_console::AppState;
use automation_chat_console::backend::{ChatBackend, PushChannel, PushStream};
use automation_chat_console::controller::{ControllerSettings, UNEXPECTED_ERROR_MESSAGE, UiController};
use automation_chat_console::error::{ConsoleError, Result};
use automation_chat_console::pages::PageRegistry;
use automation_chat_console::protocol::{AutomationSnapshot, ChatRequest, ChatResponse, PushEvent};
use automation_chat_console::server::build_router;
use automation_chat_console::session::SessionId;
use automation_chat_console::view::ConnectionState;
use axum::http::StatusCode;
use axum_test::TestServer;
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Answers every message with a fixed reply, failing on `fail`. Its push
/// channel opens and stays silent.
struct EchoBackend;

#[async_trait::async_trait]
impl ChatBackend for EchoBackend {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        if request.message == "fail" {
            return Err(ConsoleError::Api {
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(ChatResponse {
            kind: Some("gmail_request".to_string()),
            response: format!("You said **{}**", request.message),
        })
    }

    async fn automation_status(&self) -> Result<AutomationSnapshot> {
        Ok(AutomationSnapshot::default())
    }
}

#[async_trait::async_trait]
impl PushChannel for EchoBackend {
    async fn connect(&self, _session_id: &SessionId) -> Result<PushStream> {
        Ok(Box::pin(futures::stream::pending::<Result<PushEvent>>()))
    }
}

fn registry() -> PageRegistry {
    let backend = Arc::new(EchoBackend);
    PageRegistry::new(
        Arc::clone(&backend) as Arc<dyn ChatBackend>,
        backend as Arc<dyn PushChannel>,
        ControllerSettings::default(),
        Duration::from_secs(30),
        CancellationToken::new(),
    )
}

fn server() -> (TestServer, PageRegistry) {
    let pages = registry();
    let app = build_router(AppState { pages: pages.clone() });
    (TestServer::new(app).expect("test server"), pages)
}

fn session_of(html: &str) -> String {
    html.split(r#"data-session=""#)
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .expect("page carries its session id")
        .to_string()
}

/// Load the page and return its session id and controller.
async fn open_page(server: &TestServer, pages: &PageRegistry) -> (String, UiController) {
    let session = session_of(&server.get("/").await.text());
    let controller = pages.get(&session).expect("page session registered");
    (session, controller)
}

#[tokio::test]
async fn test_index_renders_every_region() {
    let (server, _) = server();
    let response = server.get("/").await;
    response.assert_status_ok();
    let html = response.text();
    for id in [
        "chatContainer",
        "inputBar",
        "connectionStatus",
        "agentStatus",
        "automationStatus",
        "progressSection",
        "screenshotContainer",
        "screenshotInfo",
        "emailPreviewSection",
    ] {
        assert!(html.contains(&format!(r#"id="{id}""#)), "missing region {id}");
    }
    assert!(html.contains("Connecting..."));
}

#[tokio::test]
async fn test_every_page_load_gets_its_own_session() {
    let (server, pages) = server();
    let (first, first_controller) = open_page(&server, &pages).await;
    let (second, _) = open_page(&server, &pages).await;

    assert_ne!(first, second);
    assert_eq!(pages.len(), 2);
    assert_eq!(first_controller.session_id().as_str(), first);

    server
        .post("/ui/send")
        .add_query_param("session", &first)
        .form(&[("message", "Hello")])
        .await
        .assert_status_ok();

    let mine: Value = server.get("/ui/state").add_query_param("session", &first).await.json();
    let theirs: Value = server.get("/ui/state").add_query_param("session", &second).await.json();
    assert_eq!(mine["chat"].as_array().unwrap().len(), 2);
    assert_eq!(theirs["chat"], json!([]));
    assert_eq!(theirs["session_id"], second);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (server, _) = server();
    server
        .post("/ui/send")
        .add_query_param("session", "session_missing_1")
        .form(&[("message", "Hello")])
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/ui/state")
        .add_query_param("session", "session_missing_1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .get("/ui/stream")
        .add_query_param("session", "session_missing_1")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_close_discards_the_session() {
    let (server, pages) = server();
    let (session, _) = open_page(&server, &pages).await;

    server
        .post("/ui/close")
        .add_query_param("session", &session)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    assert!(pages.is_empty());
    server
        .get("/ui/state")
        .add_query_param("session", &session)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .post("/ui/close")
        .add_query_param("session", &session)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_send_delivers_and_updates_state() {
    let (server, pages) = server();
    let (session, _) = open_page(&server, &pages).await;

    let response = server
        .post("/ui/send")
        .add_query_param("session", &session)
        .form(&[("message", "  Hello  ")])
        .await;
    response.assert_status_ok();
    let outcome: Value = response.json();
    assert_eq!(outcome, json!({"outcome": "delivered", "kind": "gmail_request"}));

    let state: Value = server.get("/ui/state").add_query_param("session", &session).await.json();
    assert_eq!(state["chat"][0]["kind"], "user");
    assert_eq!(state["chat"][0]["text"], "Hello");
    assert_eq!(state["chat"][1]["kind"], "gmail_request");
    assert_eq!(state["agent_status"]["text"], "Waiting for Gmail address");
    assert_eq!(state["input"]["enabled"], true);
    assert_eq!(state["waiting_for_response"], false);
}

#[tokio::test]
async fn test_send_empty_is_ignored() {
    let (server, pages) = server();
    let (session, controller) = open_page(&server, &pages).await;
    let outcome: Value = server
        .post("/ui/send")
        .add_query_param("session", &session)
        .form(&[("message", "   ")])
        .await
        .json();
    assert_eq!(outcome, json!({"outcome": "ignored", "reason": "empty_input"}));
    assert!(controller.snapshot().chat.is_empty());
}

#[tokio::test]
async fn test_send_failure_reports_and_reenables() {
    let (server, pages) = server();
    let (session, controller) = open_page(&server, &pages).await;
    let outcome: Value = server
        .post("/ui/send")
        .add_query_param("session", &session)
        .form(&[("message", "fail")])
        .await
        .json();
    assert_eq!(outcome["outcome"], "failed");

    let state = controller.snapshot();
    assert!(state.input.enabled);
    assert_eq!(state.chat.last().unwrap().kind.as_str(), "error");
}

#[tokio::test]
async fn test_visibility_requests_reconnect_when_disconnected() {
    let (server, pages) = server();
    let (session, controller) = open_page(&server, &pages).await;

    let body: Value = server
        .post("/ui/visibility")
        .add_query_param("session", &session)
        .json(&json!({"visible": true}))
        .await
        .json();
    assert_eq!(body, json!({"reconnect_requested": false}));

    tokio::time::timeout(Duration::from_secs(1), async {
        while controller.connection() != ConnectionState::Connected {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("push channel should connect");
    controller.on_disconnect();
    assert_eq!(controller.connection(), ConnectionState::Disconnected);
    let body: Value = server
        .post("/ui/visibility")
        .add_query_param("session", &session)
        .json(&json!({"visible": true}))
        .await
        .json();
    assert_eq!(body, json!({"reconnect_requested": true}));
}

#[tokio::test]
async fn test_client_error_appends_generic_entry() {
    let (server, pages) = server();
    let (session, controller) = open_page(&server, &pages).await;
    server
        .post("/ui/error")
        .add_query_param("session", &session)
        .json(&json!({"message": "TypeError: x is undefined"}))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let state = controller.snapshot();
    assert_eq!(state.chat.len(), 1);
    assert_eq!(state.chat[0].text, UNEXPECTED_ERROR_MESSAGE);
}

#[tokio::test]
async fn test_clear_keeps_system_entries() {
    let (server, pages) = server();
    let (session, controller) = open_page(&server, &pages).await;
    controller.append_chat("system", "Welcome", None);
    server
        .post("/ui/send")
        .add_query_param("session", &session)
        .form(&[("message", "Hello")])
        .await;

    server
        .post("/ui/clear")
        .add_query_param("session", &session)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let state = controller.snapshot();
    assert_eq!(state.chat.len(), 1);
    assert_eq!(state.chat[0].text, "Welcome");
}

#[tokio::test]
async fn test_rendered_messages_are_escaped() {
    let (server, pages) = server();
    let (session, controller) = open_page(&server, &pages).await;
    server
        .post("/ui/send")
        .add_query_param("session", &session)
        .form(&[("message", "<script>alert(1)</script>")])
        .await;
    let html = controller.render_page();
    assert!(!html.contains("<script>alert(1)</script>"));
    assert!(html.contains("&lt;script&gt;"));
}

/// Read SSE bytes into `received` until `done` holds.
async fn read_until<S, B>(body: &mut S, received: &mut String, done: impl Fn(&str) -> bool)
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(received) {
            let chunk = body
                .next()
                .await
                .expect("stream ended early")
                .expect("stream failed");
            received.push_str(&String::from_utf8_lossy(chunk.as_ref()));
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected patches did not arrive; got:\n{received}"));
}

#[tokio::test]
async fn test_stream_resyncs_then_delivers_patches() {
    let pages = registry();
    let app = build_router(AppState { pages: pages.clone() });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let html = client.get(&base).send().await.unwrap().text().await.unwrap();
    let session = session_of(&html);

    let response = client
        .get(format!("{base}/ui/stream"))
        .query(&[("session", &session)])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let content_type = response.headers()[reqwest::header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));

    let mut body = Box::pin(response.bytes_stream());
    let mut received = String::new();
    read_until(&mut body, &mut received, |text| {
        text.matches("event: patch").count() >= 9
    })
    .await;
    for id in ["chatContainer", "inputBar", "connectionStatus", "emailPreviewSection"] {
        assert!(received.contains(&format!(r#"id="{id}""#)), "resync missing {id}");
    }
    assert!(received.contains(r#"hx-swap-oob="true""#));

    let outcome: Value = client
        .post(format!("{base}/ui/send"))
        .query(&[("session", &session)])
        .form(&[("message", "Hello")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["outcome"], "delivered");

    read_until(&mut body, &mut received, |text| {
        text.contains("beforeend:#chatContainer") && text.contains("You said <strong>Hello</strong>")
    })
    .await;

    // Closing the page ends its stream.
    client
        .post(format!("{base}/ui/close"))
        .query(&[("session", &session)])
        .send()
        .await
        .unwrap();
    let rest = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = body.next().await {
            if chunk.is_err() {
                break;
            }
        }
    })
    .await;
    assert!(rest.is_ok(), "stream should end once the page is closed");
}
