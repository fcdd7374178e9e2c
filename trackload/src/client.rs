//! A typed client for the handful of tracking calls the workload issues.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::api::{
    Call, CreateExperiment, CreateExperimentResponse, CreateRun, CreateRunResponse, ImageArtifact,
    LogBatch, Metric, Param, RunStatus, RunTag, UpdateRun,
};
use crate::error::{Error, Result};
use crate::http::{Response, Transport};

/// Tag key identifying the client that created a run.
const USER_TAG: &str = "mlflow.user";

/// What to do when a call whose response is not needed fails.
///
/// Creating experiments and runs always aborts the iteration on failure, since every later call
/// needs the returned id.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log and count the failure, then carry on.
    #[default]
    Ignore,
    /// Abort the iteration.
    Escalate,
}

/// Opaque identifier of an experiment, assigned by the tracking service.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Returns the id as sent over the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a run, assigned by the tracking service.
///
/// Holding a `RunId` means the run was created and the id is non-empty.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RunId(String);

impl RunId {
    /// Returns the id as sent over the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request counters of a single call kind.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CallCounts {
    /// Requests handed to the transport.
    pub sent: u64,
    /// Requests that failed, whether tolerated or not.
    pub failed: u64,
    /// Encoded request body bytes.
    pub bytes: u64,
}

/// Request counters per call kind.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CallStats {
    counts: BTreeMap<Call, CallCounts>,
}

impl CallStats {
    /// Returns the counters of the given call.
    pub fn get(&self, call: Call) -> CallCounts {
        self.counts.get(&call).copied().unwrap_or_default()
    }

    /// Iterates all calls that were issued at least once.
    pub fn iter(&self) -> impl Iterator<Item = (Call, CallCounts)> + '_ {
        self.counts.iter().map(|(call, counts)| (*call, *counts))
    }

    /// Total number of requests sent.
    pub fn total_sent(&self) -> u64 {
        self.counts.values().map(|c| c.sent).sum()
    }

    /// Total number of failed requests.
    pub fn total_failed(&self) -> u64 {
        self.counts.values().map(|c| c.failed).sum()
    }

    /// Total size of all request bodies.
    pub fn total_bytes(&self) -> u64 {
        self.counts.values().map(|c| c.bytes).sum()
    }

    /// Adds all counters of `other` to this instance.
    pub fn merge(&mut self, other: &CallStats) {
        for (call, counts) in other.iter() {
            let entry = self.counts.entry(call).or_default();
            entry.sent += counts.sent;
            entry.failed += counts.failed;
            entry.bytes += counts.bytes;
        }
    }

    fn entry(&mut self, call: Call) -> &mut CallCounts {
        self.counts.entry(call).or_default()
    }
}

/// Issues tracking calls within one namespace.
///
/// Every method blocks the calling task until the service has answered. The client counts all
/// requests it sends, see [`TrackingClient::take_stats`].
#[derive(Debug)]
pub struct TrackingClient<T> {
    transport: T,
    namespace: String,
    failure_policy: FailurePolicy,
    stats: CallStats,
}

impl<T: Transport> TrackingClient<T> {
    /// Creates a client for the given namespace that ignores tolerable failures.
    pub fn new(transport: T, namespace: impl Into<String>) -> Self {
        Self {
            transport,
            namespace: namespace.into(),
            failure_policy: FailurePolicy::default(),
            stats: CallStats::default(),
        }
    }

    /// Changes how failures of fire-and-forget calls are handled.
    pub fn failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// The namespace all calls are scoped to.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the counters collected since the last call and resets them.
    pub fn take_stats(&mut self) -> CallStats {
        std::mem::take(&mut self.stats)
    }

    /// Creates an experiment with the given name and returns its id.
    pub async fn create_experiment(&mut self, name: &str) -> Result<ExperimentId> {
        let call = Call::CreateExperiment;
        let response = self.send(call, &CreateExperiment { name }).await?;
        let body: CreateExperimentResponse = decode(call, &response)?;

        let id = non_empty(call, "experiment_id", body.experiment_id)?;
        tracing::debug!(experiment_id = %id, name, "created experiment");
        Ok(ExperimentId(id))
    }

    /// Creates a run under the given experiment, tagged with the given user, and returns its id.
    pub async fn create_run(
        &mut self,
        experiment_id: &ExperimentId,
        start_time: i64,
        user: &str,
    ) -> Result<RunId> {
        let call = Call::CreateRun;
        let request = CreateRun {
            experiment_id: experiment_id.as_str(),
            start_time,
            tags: vec![RunTag {
                key: USER_TAG,
                value: user,
            }],
        };
        let response = self.send(call, &request).await?;
        let body: CreateRunResponse = decode(call, &response)?;

        let id = non_empty(call, "run.info.run_id", body.into_run_id())?;
        tracing::debug!(%experiment_id, run_id = %id, "created run");
        Ok(RunId(id))
    }

    /// Logs all parameters of a run in a single batch.
    pub async fn log_params(&mut self, run_id: &RunId, params: Vec<Param>) -> Result<()> {
        let batch = LogBatch {
            run_id: run_id.as_str(),
            params: Some(params),
            metrics: None,
        };
        self.send_tolerated(Call::LogParams, &batch).await
    }

    /// Logs one batch of metrics.
    ///
    /// Callers are responsible for respecting the service's batch size limit, see
    /// [`MetricBatcher`](crate::MetricBatcher).
    pub async fn log_metrics(&mut self, run_id: &RunId, metrics: Vec<Metric>) -> Result<()> {
        let batch = LogBatch {
            run_id: run_id.as_str(),
            params: None,
            metrics: Some(metrics),
        };
        self.send_tolerated(Call::LogMetrics, &batch).await
    }

    /// Logs the example image metadata record for a run.
    pub async fn log_artifact(&mut self, run_id: &RunId) -> Result<()> {
        let artifact = ImageArtifact::example(run_id.as_str());
        self.send_tolerated(Call::LogArtifact, &artifact).await
    }

    /// Sets the end time and status of a run.
    pub async fn update_run(&mut self, run_id: &RunId, end_time: i64, status: RunStatus) -> Result<()> {
        let update = UpdateRun {
            run_id: run_id.as_str(),
            end_time,
            status,
        };
        self.send_tolerated(Call::UpdateRun, &update).await
    }

    /// Marks a run as finished now.
    pub async fn finalize_run(&mut self, run_id: &RunId) -> Result<()> {
        self.update_run(run_id, now_millis(), RunStatus::Finished).await
    }

    async fn send<B: Serialize>(&mut self, call: Call, body: &B) -> Result<Response> {
        let body = serde_json::to_vec(body).map_err(|cause| Error::Serde {
            context: format!("failed to encode {call} request"),
            cause,
        })?;
        let path = call.path(&self.namespace);

        let counts = self.stats.entry(call);
        counts.sent += 1;
        counts.bytes += body.len() as u64;

        tracing::trace!(%call, %path, bytes = body.len(), "sending request");
        match self.transport.post(&path, Bytes::from(body)).await {
            Ok(response) => Ok(response),
            Err(failure) => {
                self.stats.entry(call).failed += 1;
                Err(failure.into())
            }
        }
    }

    async fn send_tolerated<B: Serialize>(&mut self, call: Call, body: &B) -> Result<()> {
        match self.send(call, body).await {
            Ok(_) => Ok(()),
            Err(Error::Transport(failure)) if self.failure_policy == FailurePolicy::Ignore => {
                tracing::warn!(
                    %call,
                    error = &failure as &dyn std::error::Error,
                    "ignoring failed request"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Milliseconds since the UNIX epoch, as used by all timestamps of the tracking API.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

fn decode<R: DeserializeOwned>(call: Call, response: &Response) -> Result<R> {
    serde_json::from_slice(&response.body).map_err(|cause| Error::Serde {
        context: format!("failed to decode {call} response"),
        cause,
    })
}

fn non_empty(call: Call, field: &'static str, value: Option<String>) -> Result<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::MissingField { call, field }),
    }
}
