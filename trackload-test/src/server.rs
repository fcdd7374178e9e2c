//! Exposes an in-process tracking service for use in integration tests.
//!
//! The server answers the endpoints a load test uses, assigns sequential ids, and records every
//! request so tests can assert on what was sent.
//!
//! ```
//! use trackload_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/");
//!    // point the load generator at the URL...
//!    assert!(server.requests().is_empty());
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

/// A request received by the [`TestServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The namespace segment of the path.
    pub namespace: String,
    /// The endpoint below `api/2.0/mlflow/`, such as `runs/log-batch`.
    pub endpoint: String,
    /// The decoded JSON body.
    pub body: Value,
}

impl RecordedRequest {
    /// The metrics of a `log-batch` request, empty for all other requests.
    pub fn metrics(&self) -> &[Value] {
        self.list("metrics")
    }

    /// The params of a `log-batch` request, empty for all other requests.
    pub fn params(&self) -> &[Value] {
        self.list("params")
    }

    /// Returns `true` for `log-batch` requests carrying params.
    pub fn is_param_batch(&self) -> bool {
        self.endpoint == "runs/log-batch" && self.body.get("params").is_some()
    }

    /// Returns `true` for `log-batch` requests carrying metrics.
    pub fn is_metric_batch(&self) -> bool {
        self.endpoint == "runs/log-batch" && self.body.get("metrics").is_some()
    }

    /// The `run_id` the request refers to, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.body.get("run_id").and_then(Value::as_str)
    }

    fn list(&self, key: &str) -> &[Value] {
        self.body
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Deviations from a well-behaved tracking service.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// Answer `experiments/create` without an `experiment_id`.
    pub omit_experiment_id: bool,
    /// Endpoints answered with `500 Internal Server Error`.
    pub failing_endpoints: Vec<String>,
    /// Holds back every response for this long after recording the request.
    pub delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct ServerState {
    behavior: Behavior,
    requests: Mutex<Vec<RecordedRequest>>,
    last_id: AtomicU64,
}

impl ServerState {
    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// An in-process tracking service for use in integration tests.
///
/// It listens on a random available port on localhost and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    /// Starts a well-behaved server.
    pub async fn new() -> Self {
        Self::with_behavior(Behavior::default()).await
    }

    /// Starts a server with the given deviations.
    pub async fn with_behavior(behavior: Behavior) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(ServerState {
            behavior,
            ..Default::default()
        });
        let app = Router::new()
            .route("/ns/{namespace}/api/2.0/mlflow/{*endpoint}", post(handle))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns all requests received so far, in order of arrival.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle(
    State(state): State<Arc<ServerState>>,
    Path((namespace, endpoint)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let endpoint = endpoint.trim_start_matches('/').to_owned();
    let experiment_id = body.get("experiment_id").cloned();
    state.requests.lock().unwrap().push(RecordedRequest {
        namespace,
        endpoint: endpoint.clone(),
        body,
    });

    if let Some(delay) = state.behavior.delay {
        tokio::time::sleep(delay).await;
    }

    if state.behavior.failing_endpoints.contains(&endpoint) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match endpoint.as_str() {
        "experiments/create" => {
            let id = state.next_id();
            if state.behavior.omit_experiment_id {
                Json(json!({})).into_response()
            } else {
                Json(json!({"experiment_id": id.to_string()})).into_response()
            }
        }
        "runs/create" => {
            let id = state.next_id();
            Json(json!({
                "run": {
                    "info": {
                        "run_id": format!("run-{id}"),
                        "experiment_id": experiment_id,
                        "status": "RUNNING",
                    },
                    "data": {},
                }
            }))
            .into_response()
        }
        "runs/log-batch" | "runs/log-artifact" | "runs/update" => Json(json!({})).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
