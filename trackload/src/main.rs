//! This is a load generator binary which runs virtual users against an MLflow-compatible
//! experiment-tracking service.
//!
//! Every virtual user repeats the configured [`Workload`](trackload::Workload) until the
//! configured duration has passed. Pressing Ctrl-C lets all users finish their current iteration
//! and then prints the summary.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use tokio_util::sync::CancellationToken;

use trackload::HttpRemote;
use trackload::config::Config;
use trackload::loadtest::print_summary;
use trackload::observability::init_tracing;

/// Load generator for experiment-tracking services
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();

    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    init_tracing();
    tracing::debug!(?config);

    let remote = HttpRemote::with_timeout(config.remote.as_str(), config.request_timeout)
        .context("failed to create HTTP client")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, finishing running iterations");
                shutdown.cancel();
            }
        }
    });

    let summary = trackload::run(remote, &config, shutdown).await?;
    print_summary(&summary);

    Ok(())
}
