//! In-process stand-in for a ComfyUI server.
//!
//! Serves the endpoints the worker talks to (`/system_stats`, `/prompt`,
//! `/ws`, `/history/{id}`, `/view`) on an ephemeral port. Each test
//! describes the server's behaviour with a [`MockBehavior`] and inspects
//! what the client did through [`MockEngine`].
//!
//! WebSocket frames are held back until a workflow has been submitted,
//! the way a real server only reports execution after queueing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;

/// Prompt id the mock assigns to every accepted submission.
pub const PROMPT_ID: &str = "mock-prompt-1";

/// Minimal PNG signature, enough to tell fetched bytes apart.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitMode {
    /// 200 with a prompt id.
    Accept,
    /// 400 with an error body.
    Reject,
    /// 200 whose body carries an `error` field.
    EmbeddedError,
}

#[derive(Debug, Clone)]
pub struct MockBehavior {
    pub healthy: bool,
    pub submit: SubmitMode,
    /// Text frames sent once a workflow is submitted.
    pub events: Vec<String>,
    /// Keep the socket open after `events` instead of closing it.
    pub hold_open: bool,
    /// Raw `/history/{id}` body. Served verbatim so key order survives.
    pub history: String,
    /// `/view` contents by filename.
    pub files: HashMap<String, Vec<u8>>,
}

impl MockBehavior {
    /// A healthy server that runs the job to completion and produces one
    /// image.
    pub fn completing() -> Self {
        Self {
            healthy: true,
            submit: SubmitMode::Accept,
            events: vec![
                frame("execution_start", json!({ "prompt_id": PROMPT_ID })),
                executing(Some("1")),
                progress(5, 20),
                executing(Some("9")),
                executing(None),
            ],
            hold_open: true,
            history: history_with(&[("9", &["AIEGO_00001_.png"])]),
            files: HashMap::from([("AIEGO_00001_.png".to_string(), PNG_BYTES.to_vec())]),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::completing()
        }
    }

    pub fn with_events(mut self, events: Vec<String>) -> Self {
        self.events = events;
        self
    }

    pub fn with_history(mut self, history: impl Into<String>) -> Self {
        self.history = history.into();
        self
    }

    pub fn closing(mut self) -> Self {
        self.hold_open = false;
        self
    }

    pub fn with_submit(mut self, submit: SubmitMode) -> Self {
        self.submit = submit;
        self
    }

    pub fn with_file(mut self, name: &str, bytes: &[u8]) -> Self {
        self.files.insert(name.to_string(), bytes.to_vec());
        self
    }

    pub fn without_files(mut self) -> Self {
        self.files.clear();
        self
    }
}

// ---------------------------------------------------------------------------
// Frame and history builders
// ---------------------------------------------------------------------------

pub fn frame(kind: &str, data: Value) -> String {
    json!({ "type": kind, "data": data }).to_string()
}

pub fn executing(node: Option<&str>) -> String {
    frame("executing", json!({ "node": node, "prompt_id": PROMPT_ID }))
}

pub fn progress(value: i64, max: i64) -> String {
    frame(
        "progress",
        json!({ "value": value, "max": max, "prompt_id": PROMPT_ID, "node": "7" }),
    )
}

pub fn execution_error(message: &str) -> String {
    frame(
        "execution_error",
        json!({
            "prompt_id": PROMPT_ID,
            "node_id": "7",
            "node_type": "KSampler",
            "exception_message": message,
            "exception_type": "RuntimeError",
        }),
    )
}

/// History body for [`PROMPT_ID`] with the given `(node, filenames)` in
/// order.
pub fn history_with(nodes: &[(&str, &[&str])]) -> String {
    let outputs: Vec<String> = nodes
        .iter()
        .map(|(node, files)| {
            let images: Vec<String> = files
                .iter()
                .map(|f| json!({ "filename": f, "subfolder": "", "type": "output" }).to_string())
                .collect();
            format!(r#""{node}":{{"images":[{}]}}"#, images.join(","))
        })
        .collect();
    format!(
        r#"{{"{PROMPT_ID}":{{"prompt":[],"outputs":{{{}}},"status":{{"completed":true}}}}}}"#,
        outputs.join(",")
    )
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

struct MockState {
    behavior: MockBehavior,
    submitted: watch::Sender<Option<Value>>,
    health_probes: AtomicU32,
    submissions: AtomicU32,
    ws_client_ids: Mutex<Vec<String>>,
    client_closed: AtomicBool,
    views: Mutex<Vec<String>>,
}

/// Handle to a running mock server.
pub struct MockEngine {
    addr: std::net::SocketAddr,
    state: Arc<MockState>,
}

impl MockEngine {
    pub async fn start(behavior: MockBehavior) -> Self {
        let (submitted, _) = watch::channel(None);
        let state = Arc::new(MockState {
            behavior,
            submitted,
            health_probes: AtomicU32::new(0),
            submissions: AtomicU32::new(0),
            ws_client_ids: Mutex::new(Vec::new()),
            client_closed: AtomicBool::new(false),
            views: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/system_stats", get(system_stats))
            .route("/prompt", post(submit))
            .route("/ws", get(ws_upgrade))
            .route("/history/{prompt_id}", get(history))
            .route("/view", get(view))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock engine");
        let addr = listener.local_addr().expect("mock engine address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock engine server");
        });

        Self { addr, state }
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn health_probes(&self) -> u32 {
        self.state.health_probes.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> u32 {
        self.state.submissions.load(Ordering::SeqCst)
    }

    /// Body of the accepted `/prompt` request, if any.
    pub fn submitted(&self) -> Option<Value> {
        self.state.submitted.borrow().clone()
    }

    /// `clientId` query values seen on WebSocket handshakes.
    pub fn ws_client_ids(&self) -> Vec<String> {
        self.state.ws_client_ids.lock().unwrap().clone()
    }

    /// Filenames requested from `/view`, in request order.
    pub fn views(&self) -> Vec<String> {
        self.state.views.lock().unwrap().clone()
    }

    /// Whether the client closed its WebSocket within `within`.
    pub async fn client_closed_within(&self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if self.state.client_closed.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.state.client_closed.load(Ordering::SeqCst)
    }
}

async fn system_stats(State(state): State<Arc<MockState>>) -> Response {
    state.health_probes.fetch_add(1, Ordering::SeqCst);
    if state.behavior.healthy {
        Json(json!({ "system": { "os": "posix" }, "devices": [] })).into_response()
    } else {
        StatusCode::SERVICE_UNAVAILABLE.into_response()
    }
}

async fn submit(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.submissions.fetch_add(1, Ordering::SeqCst);
    match state.behavior.submit {
        SubmitMode::Accept => {
            state.submitted.send_replace(Some(body));
            Json(json!({ "prompt_id": PROMPT_ID, "number": 1, "node_errors": {} })).into_response()
        }
        SubmitMode::Reject => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": { "type": "prompt_outputs_failed_validation", "message": "Prompt outputs failed validation" },
                "node_errors": {}
            })),
        )
            .into_response(),
        SubmitMode::EmbeddedError => Json(json!({
            "error": { "type": "invalid_prompt", "message": "Cannot execute because node X does not exist." },
            "node_errors": {}
        }))
        .into_response(),
    }
}

#[derive(Deserialize)]
struct WsQuery {
    #[serde(rename = "clientId")]
    client_id: String,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<MockState>>,
) -> Response {
    state.ws_client_ids.lock().unwrap().push(query.client_id);
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

async fn stream_events(mut socket: WebSocket, state: Arc<MockState>) {
    let _ = socket
        .send(Message::Text(
            frame("status", json!({ "status": { "exec_info": { "queue_remaining": 0 } } })).into(),
        ))
        .await;

    let mut submitted = state.submitted.subscribe();
    tokio::select! {
        accepted = async { submitted.wait_for(|body| body.is_some()).await.is_ok() } => {
            if !accepted {
                return;
            }
        }
        // A client that gives up before submitting closes the socket here.
        _ = wait_for_close(&mut socket) => {
            state.client_closed.store(true, Ordering::SeqCst);
            return;
        }
    }

    for text in &state.behavior.events {
        if socket.send(Message::Text(text.clone().into())).await.is_err() {
            return;
        }
    }

    if !state.behavior.hold_open {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    wait_for_close(&mut socket).await;
    state.client_closed.store(true, Ordering::SeqCst);
}

async fn wait_for_close(socket: &mut WebSocket) {
    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

async fn history(Path(prompt_id): Path<String>, State(state): State<Arc<MockState>>) -> Response {
    let body = if prompt_id == PROMPT_ID {
        state.behavior.history.clone()
    } else {
        "{}".to_string()
    };
    ([(header::CONTENT_TYPE, "application/json")], body).into_response()
}

#[derive(Deserialize)]
struct ViewQuery {
    filename: String,
}

async fn view(Query(query): Query<ViewQuery>, State(state): State<Arc<MockState>>) -> Response {
    state.views.lock().unwrap().push(query.filename.clone());
    match state.behavior.files.get(&query.filename) {
        Some(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "file not found").into_response(),
    }
}
