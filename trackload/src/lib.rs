//! This is a load generator library which simulates clients of an MLflow-compatible
//! experiment-tracking service.
//!
//! A [`Workload`] describes what one simulated client does per iteration: it creates experiments,
//! creates runs in them, and logs parameters, metrics and an image artifact for every run. Metrics
//! are sent in batches of at most [`MAX_METRICS_PER_BATCH`] entries, and every metric carries a
//! randomly sampled [`MetricContext`].
//!
//! All calls go through a [`Transport`], implemented for HTTP by [`HttpRemote`]. The [`run`]
//! function drives many virtual users concurrently, each repeating its workload until a deadline.
//!
//! ```no_run
//! use trackload::{HttpRemote, TrackingClient, Workload};
//!
//! # async fn example() -> trackload::Result<()> {
//! let remote = HttpRemote::new("http://localhost:5000")?;
//! let mut client = TrackingClient::new(remote, "default");
//!
//! let mut workload = Workload::builder("example")
//!     .metrics_per_run(500)
//!     .steps(10)
//!     .build();
//! workload.run_iteration(&mut client).await?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod api;
pub mod batch;
pub mod client;
pub mod config;
pub mod context;
mod error;
pub mod http;
pub mod ids;
pub mod loadtest;
pub mod observability;
pub mod workload;

#[cfg(test)]
mod testing;

pub use crate::batch::{MAX_METRICS_PER_BATCH, MetricBatcher};
pub use crate::client::{FailurePolicy, TrackingClient};
pub use crate::context::MetricContext;
pub use crate::error::*;
pub use crate::http::{HttpRemote, Transport};
pub use crate::loadtest::run;
pub use crate::workload::{FinalizeMode, Workload};
