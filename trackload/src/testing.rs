//! In-memory transport for unit tests.
//!
//! [`RecordingTransport`] answers every call the way the tracking service would, assigning
//! sequential ids, and records all requests. It is [`Clone`] so tests can hold a handle for
//! inspection while a [`TrackingClient`](crate::TrackingClient) owns another.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use serde_json::{Value, json};

use crate::api::Call;
use crate::error::TransportFailure;
use crate::http::{Response, Transport};

/// A request as seen by the transport.
#[derive(Debug, Clone)]
pub(crate) struct RecordedCall {
    pub path: String,
    pub body: Value,
}

impl RecordedCall {
    /// The endpoint below the API base path, such as `runs/log-batch`.
    pub fn endpoint(&self) -> &str {
        self.path
            .split_once("/api/2.0/mlflow/")
            .map_or(self.path.as_str(), |(_, endpoint)| endpoint)
    }

    pub fn kind(&self) -> Call {
        match self.endpoint() {
            "experiments/create" => Call::CreateExperiment,
            "runs/create" => Call::CreateRun,
            "runs/log-batch" if self.body.get("params").is_some() => Call::LogParams,
            "runs/log-batch" => Call::LogMetrics,
            "runs/log-artifact" => Call::LogArtifact,
            "runs/update" => Call::UpdateRun,
            other => panic!("unexpected endpoint {other}"),
        }
    }

    /// The metrics of a `log-batch` call, empty for all other calls.
    pub fn metrics(&self) -> &[Value] {
        self.body["metrics"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<RecordedCall>,
    last_id: u64,
    failing: Vec<&'static str>,
    experiment_response: Option<Value>,
    run_response: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingTransport {
    inner: Arc<Mutex<Recorder>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers requests to the given endpoint with status 500.
    pub fn failing(self, endpoint: &'static str) -> Self {
        self.inner.lock().unwrap().failing.push(endpoint);
        self
    }

    /// Answers `experiments/create` with a fixed body.
    pub fn respond_to_experiments(self, body: Value) -> Self {
        self.inner.lock().unwrap().experiment_response = Some(body);
        self
    }

    /// Answers `runs/create` with a fixed body.
    pub fn respond_to_runs(self, body: Value) -> Self {
        self.inner.lock().unwrap().run_response = Some(body);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn post(&self, path: &str, body: Bytes) -> Result<Response, TransportFailure> {
        let call = RecordedCall {
            path: path.to_owned(),
            body: serde_json::from_slice(&body).unwrap(),
        };

        let mut recorder = self.inner.lock().unwrap();
        let endpoint = call.endpoint().to_owned();
        recorder.calls.push(call);

        if recorder.failing.iter().any(|failing| *failing == endpoint) {
            return Err(TransportFailure::Status {
                path: path.to_owned(),
                status: 500,
            });
        }

        let response = match endpoint.as_str() {
            "experiments/create" => {
                recorder.last_id += 1;
                let id = recorder.last_id;
                recorder
                    .experiment_response
                    .clone()
                    .unwrap_or_else(|| json!({"experiment_id": id.to_string()}))
            }
            "runs/create" => {
                recorder.last_id += 1;
                let id = recorder.last_id;
                recorder
                    .run_response
                    .clone()
                    .unwrap_or_else(|| json!({"run": {"info": {"run_id": format!("run-{id}")}}}))
            }
            _ => json!({}),
        };

        Ok(Response {
            status: 200,
            body: serde_json::to_vec(&response).unwrap().into(),
        })
    }
}
