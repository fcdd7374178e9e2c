//! Configuration for the trackload binary.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `TL__`)
//! 2. YAML configuration file (specified via `-c` or `--config` flag)
//! 3. Defaults
//!
//! Environment variables use double underscores (`__`) to denote nested configuration
//! structures, for example `TL__WORKLOAD__METRICS_PER_RUN=500`. The same setting in YAML:
//!
//! ```yaml
//! remote: http://localhost:5000
//! users: 8
//! duration: 5m
//!
//! workload:
//!   metrics_per_run: 500
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::batch::MAX_METRICS_PER_BATCH;
use crate::client::FailurePolicy;
use crate::http::DEFAULT_REQUEST_TIMEOUT;
use crate::ids::IdKind;
use crate::workload::{FinalizeMode, Workload};

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "TL__";

/// The shape of one iteration.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Experiments created per iteration.
    ///
    /// # Default
    ///
    /// `1`
    pub experiments: usize,
    /// Runs created per experiment.
    ///
    /// # Default
    ///
    /// `2`
    pub runs_per_experiment: usize,
    /// Parameters logged per run.
    ///
    /// # Default
    ///
    /// `1`
    pub params_per_run: usize,
    /// Distinct metric keys logged in every step.
    ///
    /// # Default
    ///
    /// `2000`
    pub metrics_per_run: usize,
    /// Steps per run.
    ///
    /// # Default
    ///
    /// `4`
    pub steps_per_metric: usize,
    /// Maximum number of metrics in a single `log-batch` request. Must not be zero.
    ///
    /// # Default
    ///
    /// `200`
    pub max_metrics_per_batch: usize,
    /// When runs are marked as finished, `every_step` or `last_step`.
    ///
    /// # Default
    ///
    /// `every_step`
    pub finalize: FinalizeMode,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            experiments: 1,
            runs_per_experiment: 2,
            params_per_run: 1,
            metrics_per_run: 2000,
            steps_per_metric: 4,
            max_metrics_per_batch: MAX_METRICS_PER_BATCH,
            finalize: FinalizeMode::default(),
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the tracking service.
    ///
    /// # Default
    ///
    /// `http://localhost:5000`
    pub remote: String,
    /// Namespace all calls are scoped to.
    ///
    /// # Default
    ///
    /// `default`
    pub namespace: String,
    /// Value of the `mlflow.user` tag on created runs.
    ///
    /// # Default
    ///
    /// `trackload`
    pub agent: String,
    /// Number of virtual users running iterations concurrently. Must not be zero.
    ///
    /// # Default
    ///
    /// `1`
    pub users: usize,
    /// How long users keep starting new iterations.
    ///
    /// # Default
    ///
    /// `1m`
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// How long a single request may take before it counts as failed. Must not be zero.
    ///
    /// # Default
    ///
    /// `30s`
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Maximum number of iterations per user, unlimited if unset.
    pub iterations: Option<u64>,
    /// Seed of the first user's RNG, every further user adds its index. Random if unset.
    pub seed: Option<u64>,
    /// Handling of failed calls whose response is not needed, `ignore` or `escalate`.
    ///
    /// # Default
    ///
    /// `ignore`
    pub failure_policy: FailurePolicy,
    /// Source of unique experiment names, `uuid` or `counter`.
    ///
    /// # Default
    ///
    /// `uuid`
    pub experiment_names: IdKind,
    /// The shape of one iteration.
    pub workload: WorkloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            remote: "http://localhost:5000".into(),
            namespace: "default".into(),
            agent: "trackload".into(),
            users: 1,
            duration: Duration::from_secs(60),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            iterations: None,
            seed: None,
            failure_policy: FailurePolicy::default(),
            experiment_names: IdKind::default(),
            workload: WorkloadConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided)
    /// 3. Environment variables (prefixed with `TL__`)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the workload cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.users == 0 {
            bail!("`users` must be at least 1");
        }
        if self.workload.max_metrics_per_batch == 0 {
            bail!("`workload.max_metrics_per_batch` must be at least 1");
        }
        if self.request_timeout.is_zero() {
            bail!("`request_timeout` must not be zero");
        }
        if self.namespace.is_empty() {
            bail!("`namespace` must not be empty");
        }
        Ok(())
    }

    /// Builds the workload of the virtual user with the given index.
    pub fn workload(&self, user: usize) -> Workload {
        let name = format!("user-{user}");
        let mut builder = Workload::builder(&name)
            .boxed_ids(self.experiment_names.source(&name))
            .user_tag(&self.agent)
            .experiments(self.workload.experiments)
            .runs_per_experiment(self.workload.runs_per_experiment)
            .params_per_run(self.workload.params_per_run)
            .metrics_per_run(self.workload.metrics_per_run)
            .steps(self.workload.steps_per_metric)
            .max_metrics_per_batch(self.workload.max_metrics_per_batch)
            .finalize(self.workload.finalize);

        if let Some(seed) = self.seed {
            builder = builder.seed(seed.wrapping_add(user as u64));
        }
        builder.build()
    }
}
