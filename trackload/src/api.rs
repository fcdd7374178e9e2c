//! Request and response bodies of the tracking service's REST API.
//!
//! All endpoints live below the namespace-scoped base path `ns/{namespace}/api/2.0/mlflow/` and
//! accept JSON bodies via `POST`. Only the two ids the workload depends on are ever read back from
//! responses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::MetricContext;

/// A single call the workload issues against the tracking service.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Call {
    /// `experiments/create`, yields an experiment id.
    CreateExperiment,
    /// `runs/create`, yields a run id.
    CreateRun,
    /// `runs/log-batch` carrying parameters.
    LogParams,
    /// `runs/log-batch` carrying metrics.
    LogMetrics,
    /// `runs/log-artifact` carrying image metadata.
    LogArtifact,
    /// `runs/update`, finalizing a run.
    UpdateRun,
}

impl Call {
    /// All calls, in the order they are first issued during an iteration.
    pub const ALL: [Call; 6] = [
        Call::CreateExperiment,
        Call::CreateRun,
        Call::LogParams,
        Call::LogMetrics,
        Call::LogArtifact,
        Call::UpdateRun,
    ];

    /// The endpoint below the API base path.
    pub fn endpoint(self) -> &'static str {
        match self {
            Call::CreateExperiment => "experiments/create",
            Call::CreateRun => "runs/create",
            Call::LogParams | Call::LogMetrics => "runs/log-batch",
            Call::LogArtifact => "runs/log-artifact",
            Call::UpdateRun => "runs/update",
        }
    }

    /// The path of this call for the given namespace, relative to the service root.
    pub fn path(self, namespace: &str) -> String {
        format!("ns/{namespace}/api/2.0/mlflow/{}", self.endpoint())
    }

    /// Human readable name used in logs and summaries.
    pub fn name(self) -> &'static str {
        match self {
            Call::CreateExperiment => "create experiment",
            Call::CreateRun => "create run",
            Call::LogParams => "log params",
            Call::LogMetrics => "log metrics",
            Call::LogArtifact => "log artifact",
            Call::UpdateRun => "update run",
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Body of `experiments/create`.
#[derive(Debug, Serialize)]
pub struct CreateExperiment<'a> {
    /// Experiment names must be unique within a namespace.
    pub name: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateExperimentResponse {
    #[serde(default)]
    pub experiment_id: Option<String>,
}

/// A key/value tag attached to a run on creation.
#[derive(Debug, Serialize)]
pub struct RunTag<'a> {
    /// The tag key, e.g. `mlflow.user`.
    pub key: &'a str,
    /// The tag value.
    pub value: &'a str,
}

/// Body of `runs/create`.
#[derive(Debug, Serialize)]
pub struct CreateRun<'a> {
    /// The experiment this run belongs to.
    pub experiment_id: &'a str,
    /// Milliseconds since the UNIX epoch.
    pub start_time: i64,
    /// System tags of the run.
    pub tags: Vec<RunTag<'a>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateRunResponse {
    #[serde(default)]
    pub run: Option<RunResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunResponse {
    #[serde(default)]
    pub info: Option<RunInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunInfo {
    #[serde(default)]
    pub run_id: Option<String>,
}

impl CreateRunResponse {
    pub fn into_run_id(self) -> Option<String> {
        self.run?.info?.run_id
    }
}

/// A run parameter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Param {
    /// `param1` to `paramN`.
    pub key: String,
    /// Stringified pseudo-random number.
    pub value: String,
}

/// A single metric sample.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metric {
    /// `metric1` to `metricN`, identical across steps.
    pub key: String,
    /// `id * step * r` for a uniform draw `r`.
    pub value: f64,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: i64,
    /// 1-based step index.
    pub step: i64,
    /// Where the sample was recorded.
    pub context: MetricContext,
}

/// Body of `runs/log-batch`.
///
/// The workload never mixes parameters and metrics in one batch, the unused list is omitted.
#[derive(Debug, Serialize)]
pub struct LogBatch<'a> {
    /// The run the batch is logged to.
    pub run_id: &'a str,
    /// Parameters to log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<Param>>,
    /// Metrics to log.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<Metric>>,
}

/// Body of `runs/log-artifact`, describing an image logged by a run.
#[derive(Debug, Serialize)]
pub struct ImageArtifact<'a> {
    /// Display name of the image.
    pub name: &'a str,
    /// Training iteration the image belongs to.
    pub iter: i64,
    /// Step the image belongs to.
    pub step: i64,
    /// Caption shown next to the image.
    pub caption: &'a str,
    /// Position of the image within its step.
    pub index: i64,
    /// Width in pixels.
    pub width: u32,
    /// The run the image is logged to.
    pub run_id: &'a str,
    /// Height in pixels.
    pub height: u32,
    /// Image encoding, e.g. `png`.
    pub format: &'a str,
    /// Location of the image blob.
    pub blob_uri: &'a str,
}

impl<'a> ImageArtifact<'a> {
    /// The fixed-shape image record logged once per step.
    pub fn example(run_id: &'a str) -> Self {
        Self {
            name: "example image name",
            iter: 1,
            step: 1,
            caption: "example image caption",
            index: 0,
            width: 1024,
            run_id,
            height: 768,
            format: "png",
            blob_uri: "example_image.png",
        }
    }
}

/// Lifecycle status of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// The run is still logging.
    Running,
    /// The run has ended.
    Finished,
}

/// Body of `runs/update`.
#[derive(Debug, Serialize)]
pub struct UpdateRun<'a> {
    /// The run to update.
    pub run_id: &'a str,
    /// Milliseconds since the UNIX epoch.
    pub end_time: i64,
    /// The new status.
    pub status: RunStatus,
}
