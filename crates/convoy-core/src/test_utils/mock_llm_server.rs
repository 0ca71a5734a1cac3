//! Local chat-completions server answering from a queue of canned JSON bodies.
//!
//! Serves both the OpenAI path and the Azure deployment path so either client
//! flavour can be pointed at it.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::{routing::post, Json, Router};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// One request as seen by the server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockServerState {
    responses: Arc<Mutex<VecDeque<Value>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn respond(state: &MockServerState, request: RecordedRequest) -> Result<Json<Value>, StatusCode> {
    log::debug!("Mock LLM server received: {}", request.body);
    state.requests.lock().unwrap().push(request);

    match state.responses.lock().unwrap().pop_front() {
        Some(body) => Ok(Json(body)),
        None => {
            log::error!("Mock LLM server ran out of responses");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn openai_handler(
    State(state): State<MockServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let request = RecordedRequest {
        authorization: header(&headers, "authorization"),
        api_key: header(&headers, "api-key"),
        deployment: None,
        body,
    };
    respond(&state, request)
}

async fn azure_handler(
    State(state): State<MockServerState>,
    Path(deployment): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let request = RecordedRequest {
        authorization: header(&headers, "authorization"),
        api_key: header(&headers, "api-key"),
        deployment: Some(deployment),
        body,
    };
    respond(&state, request)
}

pub struct MockLLMServer {
    addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    recorded_requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockLLMServer {
    pub async fn start(responses: Vec<Value>) -> Self {
        let state = MockServerState {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let recorded_requests = state.requests.clone();

        let app = Router::new()
            .route("/v1/chat/completions", post(openai_handler))
            .route("/openai/deployments/{deployment}/chat/completions", post(azure_handler))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("Failed to bind mock server: {}", e));
        let addr = listener.local_addr().unwrap();
        log::info!("Mock LLM server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap_or_else(|e| log::error!("Mock LLM server error: {}", e));
        });

        MockLLMServer {
            addr,
            shutdown_tx,
            recorded_requests,
        }
    }

    pub fn address(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get_requests(&self) -> Vec<RecordedRequest> {
        self.recorded_requests.lock().unwrap().clone()
    }

    pub async fn shutdown(self) {
        if self.shutdown_tx.send(()).is_err() {
            log::warn!("Mock LLM server already stopped");
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}
