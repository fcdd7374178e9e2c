//! A module for defining a [`Workload`] that simulates a client of an experiment-tracking service.
//!
//! Every iteration creates a configured number of experiments. Each experiment gets a number of
//! runs, and every run logs its parameters once, followed by a number of steps. In every step the
//! run logs one value for each of its metrics, an image artifact, and an update of its status.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::api::{Metric, Param};
use crate::batch::{MAX_METRICS_PER_BATCH, MetricBatcher};
use crate::client::{ExperimentId, TrackingClient, now_millis};
use crate::context::MetricContext;
use crate::error::Result;
use crate::http::Transport;
use crate::ids::{IdSource, UuidIds};

/// When a run is marked as finished.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeMode {
    /// Send the finishing update at the end of every step.
    ///
    /// Each update overwrites the end time of the previous one, so the service sees a finished run
    /// that keeps receiving metrics.
    #[default]
    EveryStep,
    /// Send a single finishing update after the last step.
    LastStep,
}

/// A builder for creating a [`Workload`].
#[derive(Debug)]
pub struct WorkloadBuilder {
    name: String,
    seed: u64,
    ids: Option<Box<dyn IdSource>>,
    user_tag: String,

    experiments: usize,
    runs_per_experiment: usize,
    params_per_run: usize,
    metrics_per_run: usize,
    steps: usize,

    max_metrics_per_batch: usize,
    finalize: FinalizeMode,
}

impl WorkloadBuilder {
    /// Seeds the RNG driving metric values, contexts and parameter values.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The source of unique experiment name suffixes. Defaults to [`UuidIds`].
    pub fn ids(mut self, ids: impl IdSource + 'static) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    /// Same as [`ids`](Self::ids), for an already boxed source.
    pub fn boxed_ids(mut self, ids: Box<dyn IdSource>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// The value of the `mlflow.user` tag on every created run.
    pub fn user_tag(mut self, user_tag: impl Into<String>) -> Self {
        self.user_tag = user_tag.into();
        self
    }

    /// The number of experiments created per iteration.
    pub fn experiments(mut self, experiments: usize) -> Self {
        self.experiments = experiments;
        self
    }

    /// The number of runs created in every experiment.
    pub fn runs_per_experiment(mut self, runs: usize) -> Self {
        self.runs_per_experiment = runs;
        self
    }

    /// The number of parameters logged by every run.
    pub fn params_per_run(mut self, params: usize) -> Self {
        self.params_per_run = params;
        self
    }

    /// The number of distinct metric keys logged in every step.
    pub fn metrics_per_run(mut self, metrics: usize) -> Self {
        self.metrics_per_run = metrics;
        self
    }

    /// The number of steps of every run.
    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// The maximum number of metrics per `log-batch` request.
    pub fn max_metrics_per_batch(mut self, cap: usize) -> Self {
        self.max_metrics_per_batch = cap;
        self
    }

    /// When runs are marked as finished.
    pub fn finalize(mut self, finalize: FinalizeMode) -> Self {
        self.finalize = finalize;
        self
    }

    /// Creates the workload instance.
    pub fn build(self) -> Workload {
        Workload {
            name: self.name,
            rng: SmallRng::seed_from_u64(self.seed),
            ids: self.ids.unwrap_or_else(|| Box::new(UuidIds)),
            user_tag: self.user_tag,

            experiments: self.experiments,
            runs_per_experiment: self.runs_per_experiment,
            params_per_run: self.params_per_run,
            metrics_per_run: self.metrics_per_run,
            steps: self.steps,

            max_metrics_per_batch: self.max_metrics_per_batch,
            finalize: self.finalize,
        }
    }
}

/// Describes the calls one virtual user issues per iteration.
#[derive(Debug)]
pub struct Workload {
    /// Name of the workload for identification in logs.
    pub(crate) name: String,

    /// The RNG driving all generated values.
    rng: SmallRng,
    /// Suffixes of experiment names.
    ids: Box<dyn IdSource>,
    user_tag: String,

    experiments: usize,
    runs_per_experiment: usize,
    params_per_run: usize,
    metrics_per_run: usize,
    steps: usize,

    max_metrics_per_batch: usize,
    finalize: FinalizeMode,
}

impl Workload {
    /// Constructs a new workload builder with the given name.
    ///
    /// The defaults create one experiment with two runs, each logging one parameter and 2000
    /// metrics over four steps.
    pub fn builder(name: impl Into<String>) -> WorkloadBuilder {
        WorkloadBuilder {
            name: name.into(),
            seed: rand::random(),
            ids: None,
            user_tag: "trackload".into(),

            experiments: 1,
            runs_per_experiment: 2,
            params_per_run: 1,
            metrics_per_run: 2000,
            steps: 4,

            max_metrics_per_batch: MAX_METRICS_PER_BATCH,
            finalize: FinalizeMode::default(),
        }
    }

    /// Name of the workload for identification in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executes one iteration: creates all experiments and drives their runs.
    ///
    /// The first error aborts the iteration. Calls that already succeeded are not undone.
    pub async fn run_iteration<T: Transport>(&mut self, client: &mut TrackingClient<T>) -> Result<()> {
        tracing::debug!(workload = %self.name, "starting iteration");
        for _ in 0..self.experiments {
            let name = self.experiment_name();
            let experiment_id = client.create_experiment(&name).await?;
            self.run_experiment(client, &experiment_id).await?;
        }
        Ok(())
    }

    /// Drives all runs of an experiment, one after another.
    pub async fn run_experiment<T: Transport>(
        &mut self,
        client: &mut TrackingClient<T>,
        experiment_id: &ExperimentId,
    ) -> Result<()> {
        for _ in 0..self.runs_per_experiment {
            self.run_run(client, experiment_id).await?;
        }
        Ok(())
    }

    /// Drives the full lifecycle of one run.
    pub async fn run_run<T: Transport>(
        &mut self,
        client: &mut TrackingClient<T>,
        experiment_id: &ExperimentId,
    ) -> Result<()> {
        let run_id = client
            .create_run(experiment_id, now_millis(), &self.user_tag)
            .await?;

        let params = self.generate_params();
        client.log_params(&run_id, params).await?;

        for step in 1..=self.steps {
            let mut batcher = MetricBatcher::new(client, &run_id, self.max_metrics_per_batch);
            for id in 1..=self.metrics_per_run {
                let metric = self.generate_metric(id, step);
                batcher.add(metric).await?;
            }
            batcher.flush_if_non_empty().await?;

            client.log_artifact(&run_id).await?;

            if self.finalize == FinalizeMode::EveryStep || step == self.steps {
                client.finalize_run(&run_id).await?;
            }
            tracing::trace!(%run_id, step, "step logged");
        }

        tracing::debug!(%experiment_id, %run_id, steps = self.steps, "run finished");
        Ok(())
    }

    fn experiment_name(&mut self) -> String {
        format!("experiment-{}", self.ids.next_id())
    }

    fn generate_params(&mut self) -> Vec<Param> {
        (1..=self.params_per_run)
            .map(|id| Param {
                key: format!("param{id}"),
                value: (id as f64 * self.rng.random::<f64>()).to_string(),
            })
            .collect()
    }

    fn generate_metric(&mut self, id: usize, step: usize) -> Metric {
        Metric {
            key: format!("metric{id}"),
            value: id as f64 * step as f64 * self.rng.random::<f64>(),
            timestamp: now_millis(),
            step: step as i64,
            context: MetricContext::sample(&mut self.rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::api::Call;
    use crate::client::CallCounts;
    use crate::ids::CounterIds;
    use crate::testing::{RecordedCall, RecordingTransport};
    use crate::Error;

    use super::*;

    fn workload() -> WorkloadBuilder {
        Workload::builder("test").seed(42).ids(CounterIds::default())
    }

    async fn iteration(workload: WorkloadBuilder) -> Vec<RecordedCall> {
        let transport = RecordingTransport::new();
        let mut client = TrackingClient::new(transport.clone(), "default");
        workload.build().run_iteration(&mut client).await.unwrap();
        transport.calls()
    }

    fn count(calls: &[RecordedCall], kind: Call) -> usize {
        calls.iter().filter(|call| call.kind() == kind).count()
    }

    #[tokio::test]
    async fn default_shape_issues_101_calls() {
        let transport = RecordingTransport::new();
        let mut client = TrackingClient::new(transport.clone(), "default");
        let mut workload = workload().build();
        workload.run_iteration(&mut client).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 101);
        assert_eq!(count(&calls, Call::CreateExperiment), 1);
        assert_eq!(count(&calls, Call::CreateRun), 2);
        assert_eq!(count(&calls, Call::LogParams), 2);
        assert_eq!(count(&calls, Call::LogMetrics), 80);
        assert_eq!(count(&calls, Call::LogArtifact), 8);
        assert_eq!(count(&calls, Call::UpdateRun), 8);

        let stats = client.take_stats();
        assert_eq!(stats.total_sent(), 101);
        assert_eq!(stats.get(Call::LogMetrics).sent, 80);
        assert_eq!(stats.total_failed(), 0);
    }

    #[tokio::test]
    async fn metric_batches_per_step() {
        let calls = iteration(workload().runs_per_experiment(1).metrics_per_run(450).steps(3)).await;

        let sizes: Vec<_> = calls
            .iter()
            .filter(|call| call.kind() == Call::LogMetrics)
            .map(|call| call.metrics().len())
            .collect();
        assert_eq!(sizes, [200, 200, 50, 200, 200, 50, 200, 200, 50]);
    }

    #[tokio::test]
    async fn metrics_carry_their_step() {
        let calls = iteration(workload().runs_per_experiment(1).metrics_per_run(250).steps(3)).await;

        let mut per_step = [0usize; 3];
        for metric in calls.iter().flat_map(|call| call.metrics()) {
            let step = metric["step"].as_i64().unwrap();
            assert!((1..=3).contains(&step));
            per_step[step as usize - 1] += 1;
        }
        assert_eq!(per_step, [250, 250, 250]);

        // steps never decrease and every step repeats the same keys
        let steps: Vec<_> = calls
            .iter()
            .flat_map(|call| call.metrics())
            .map(|metric| metric["step"].as_i64().unwrap())
            .collect();
        assert!(steps.windows(2).all(|w| w[0] <= w[1]));

        let keys = |step: i64| {
            calls
                .iter()
                .flat_map(|call| call.metrics())
                .filter(|metric| metric["step"] == step)
                .map(|metric| metric["key"].as_str().unwrap().to_owned())
                .collect::<Vec<_>>()
        };
        let expected: Vec<_> = (1..=250).map(|id| format!("metric{id}")).collect();
        assert_eq!(keys(1), expected);
        assert_eq!(keys(3), expected);
    }

    #[tokio::test]
    async fn params_are_logged_once_before_metrics() {
        let calls = iteration(workload().params_per_run(5).metrics_per_run(10)).await;

        let runs: Vec<_> = calls
            .iter()
            .filter(|call| call.kind() == Call::CreateRun)
            .collect();
        assert_eq!(runs.len(), 2);

        for run_id in ["run-2", "run-3"] {
            let run_calls: Vec<_> = calls
                .iter()
                .filter(|call| call.body["run_id"] == run_id)
                .collect();
            assert_eq!(run_calls[0].kind(), Call::LogParams, "{run_id}");
            assert_eq!(count_kind(&run_calls, Call::LogParams), 1);

            let params = run_calls[0].body["params"].as_array().unwrap();
            let keys: Vec<_> = params.iter().map(|p| p["key"].as_str().unwrap()).collect();
            assert_eq!(keys, ["param1", "param2", "param3", "param4", "param5"]);
            assert!(params.iter().all(|p| p["value"].as_str().unwrap().parse::<f64>().is_ok()));
        }
    }

    fn count_kind(calls: &[&RecordedCall], kind: Call) -> usize {
        calls.iter().filter(|call| call.kind() == kind).count()
    }

    #[tokio::test]
    async fn run_lifecycle_order() {
        let calls = iteration(
            workload()
                .runs_per_experiment(1)
                .metrics_per_run(3)
                .steps(2),
        )
        .await;

        let kinds: Vec<_> = calls.iter().map(RecordedCall::kind).collect();
        assert_eq!(
            kinds,
            [
                Call::CreateExperiment,
                Call::CreateRun,
                Call::LogParams,
                Call::LogMetrics,
                Call::LogArtifact,
                Call::UpdateRun,
                Call::LogMetrics,
                Call::LogArtifact,
                Call::UpdateRun,
            ]
        );

        assert_eq!(calls[0].body, json!({"name": "experiment-1"}));
        assert_eq!(calls[1].body["experiment_id"], "1");
        assert_eq!(calls[5].body["status"], "FINISHED");
        assert_eq!(calls[4].body["run_id"], "run-2");
        assert_eq!(calls[4].body["width"], 1024);
    }

    // Every step marks the run as finished, overwriting the previous end time.
    #[tokio::test]
    async fn finalizes_after_every_step_by_default() {
        let calls = iteration(workload().runs_per_experiment(1).metrics_per_run(1).steps(4)).await;
        assert_eq!(count(&calls, Call::UpdateRun), 4);
    }

    #[tokio::test]
    async fn finalizes_once_in_last_step_mode() {
        let calls = iteration(
            workload()
                .runs_per_experiment(1)
                .metrics_per_run(1)
                .steps(4)
                .finalize(FinalizeMode::LastStep),
        )
        .await;
        assert_eq!(count(&calls, Call::UpdateRun), 1);
        assert_eq!(calls.last().unwrap().kind(), Call::UpdateRun);
        assert_eq!(count(&calls, Call::LogArtifact), 4);
    }

    #[tokio::test]
    async fn experiments_get_unique_names() {
        let calls = iteration(workload().experiments(3).runs_per_experiment(0)).await;
        let names: Vec<_> = calls.iter().map(|call| call.body["name"].clone()).collect();
        assert_eq!(names, [json!("experiment-1"), json!("experiment-2"), json!("experiment-3")]);
    }

    #[tokio::test]
    async fn same_seed_same_values() {
        let values = |calls: Vec<RecordedCall>| -> Vec<f64> {
            calls
                .iter()
                .flat_map(|call| call.metrics())
                .map(|metric| metric["value"].as_f64().unwrap())
                .collect()
        };

        let shape = || workload().runs_per_experiment(1).metrics_per_run(20).steps(2);
        let first = values(iteration(shape()).await);
        let second = values(iteration(shape()).await);
        assert_eq!(first, second);

        let other = values(iteration(shape().seed(7)).await);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn missing_run_id_aborts_iteration() {
        let transport = RecordingTransport::new().respond_to_runs(json!({"run": {}}));
        let mut client = TrackingClient::new(transport.clone(), "default");

        let err = workload().build().run_iteration(&mut client).await.unwrap_err();
        assert!(matches!(err, Error::MissingField { call: Call::CreateRun, .. }));

        // nothing references the run after the failed creation
        let kinds: Vec<_> = transport.calls().iter().map(RecordedCall::kind).collect();
        assert_eq!(kinds, [Call::CreateExperiment, Call::CreateRun]);
    }

    #[tokio::test]
    async fn tolerates_failed_artifacts() {
        let transport = RecordingTransport::new().failing("runs/log-artifact");
        let mut client = TrackingClient::new(transport.clone(), "default");
        workload()
            .runs_per_experiment(1)
            .metrics_per_run(1)
            .build()
            .run_iteration(&mut client)
            .await
            .unwrap();

        let stats = client.take_stats();
        let artifacts = stats.get(Call::LogArtifact);
        assert_eq!(
            artifacts,
            CallCounts {
                sent: 4,
                failed: 4,
                bytes: artifacts.bytes
            }
        );
        assert_eq!(stats.get(Call::UpdateRun).sent, 4);
    }

    #[tokio::test]
    async fn escalated_failures_abort_iteration() {
        let transport = RecordingTransport::new().failing("runs/log-artifact");
        let mut client = TrackingClient::new(transport.clone(), "default")
            .failure_policy(crate::FailurePolicy::Escalate);

        let err = workload()
            .runs_per_experiment(1)
            .metrics_per_run(1)
            .build()
            .run_iteration(&mut client)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(transport.calls().last().unwrap().kind(), Call::LogArtifact);
    }
}
