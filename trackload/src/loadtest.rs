//! Run virtual users concurrently against a tracking service and print a summary.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use bytesize::ByteSize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use yansi::Paint;

use crate::api::Call;
use crate::client::{CallStats, TrackingClient};
use crate::config::Config;
use crate::http::{HttpRemote, Transport};
use crate::workload::Workload;

/// Outcome of a load test, aggregated over all virtual users.
#[derive(Clone, Debug, Default)]
pub struct Summary {
    /// Number of virtual users that took part.
    pub users: usize,
    /// Iterations that ran to completion.
    pub iterations: u64,
    /// Iterations aborted by an error.
    pub failed_iterations: u64,
    /// Requests issued, per call.
    pub calls: CallStats,
    /// Wall-clock time from the start of the first until the end of the last user.
    pub elapsed: Duration,
}

impl Summary {
    fn merge(&mut self, other: UserSummary) {
        self.iterations += other.iterations;
        self.failed_iterations += other.failed_iterations;
        self.calls.merge(&other.calls);
    }
}

#[derive(Debug, Default)]
struct UserSummary {
    iterations: u64,
    failed_iterations: u64,
    calls: CallStats,
}

/// Runs the configured number of virtual users concurrently against the remote.
///
/// Every user repeats its workload until the configured duration has passed, it completed the
/// configured number of iterations, or `shutdown` is cancelled. Running iterations are never
/// interrupted.
pub async fn run(remote: HttpRemote, config: &Config, shutdown: CancellationToken) -> Result<Summary> {
    let remote = Arc::new(remote);
    let start = Instant::now();
    let deadline = tokio::time::Instant::now() + config.duration;

    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
        .with_message(format!("Running {} virtual users:", config.users));
    bar.enable_steady_tick(Duration::from_millis(100));

    tracing::info!(users = config.users, namespace = %config.namespace, "starting load test");

    // run the users concurrently
    let tasks: Vec<_> = (0..config.users)
        .map(|user| {
            let client = TrackingClient::new(Arc::clone(&remote), config.namespace.as_str())
                .failure_policy(config.failure_policy);
            let workload = config.workload(user);
            tokio::spawn(run_user(
                client,
                workload,
                config.iterations,
                deadline,
                shutdown.clone(),
            ))
        })
        .collect();

    let finished_tasks = futures::future::join_all(tasks).await;
    bar.finish_and_clear();

    let mut summary = Summary {
        users: config.users,
        ..Default::default()
    };
    for task in finished_tasks {
        summary.merge(task?);
    }
    summary.elapsed = start.elapsed();

    tracing::info!(
        iterations = summary.iterations,
        failed_iterations = summary.failed_iterations,
        "load test finished"
    );
    Ok(summary)
}

async fn run_user<T: Transport>(
    mut client: TrackingClient<T>,
    mut workload: Workload,
    iterations: Option<u64>,
    deadline: tokio::time::Instant,
    shutdown: CancellationToken,
) -> UserSummary {
    let mut summary = UserSummary::default();

    loop {
        if shutdown.is_cancelled() || tokio::time::Instant::now() >= deadline {
            break;
        }
        let started = summary.iterations + summary.failed_iterations;
        if iterations.is_some_and(|max| started >= max) {
            break;
        }

        match workload.run_iteration(&mut client).await {
            Ok(()) => summary.iterations += 1,
            Err(err) => {
                tracing::error!(
                    user = workload.name(),
                    error = &err as &dyn std::error::Error,
                    "iteration failed"
                );
                summary.failed_iterations += 1;
            }
        }
        summary.calls.merge(&client.take_stats());
    }

    summary
}

/// Prints the summary of a load test to stdout.
pub fn print_summary(summary: &Summary) {
    println!();
    println!(
        "{} ({} users, {:.2?})",
        "## Load test".bold(),
        summary.users.bold(),
        summary.elapsed
    );

    print!(
        "{} {} completed",
        "ITERATIONS:".bold().green(),
        summary.iterations.bold()
    );
    if summary.failed_iterations > 0 {
        print!(
            ", {}",
            format!("{} FAILED", summary.failed_iterations).bold().red()
        );
    }
    println!();

    for call in Call::ALL {
        let counts = summary.calls.get(call);
        if counts.sent == 0 {
            continue;
        }
        print!(
            "  {:<18} {} requests, {}",
            format!("{call}:").bold(),
            counts.sent.bold(),
            ByteSize::b(counts.bytes)
        );
        if counts.failed > 0 {
            print!(", {}", format!("{} FAILURES", counts.failed).bold().red());
        }
        println!();
    }

    let total = &summary.calls;
    println!(
        "{} {} requests, {} sent",
        "TOTAL:".bold(),
        total.total_sent().bold(),
        ByteSize::b(total.total_bytes()).bold()
    );
    if total.total_failed() > 0 {
        println!(
            "{}",
            format!("{} requests failed", total.total_failed()).bold().red()
        );
    }
}
