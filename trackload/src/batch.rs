//! Size-bounded batching of metrics.

use crate::api::Metric;
use crate::client::{RunId, TrackingClient};
use crate::error::Result;
use crate::http::Transport;

/// Maximum number of metrics the tracking service accepts in a single `log-batch` request.
pub const MAX_METRICS_PER_BATCH: usize = 200;

/// Accumulates the metrics of one run step and sends them in batches of at most `cap` entries.
///
/// A batch is sent as soon as the buffer is full. Call [`flush_if_non_empty`] once all metrics of
/// a step have been added to send the remainder; the batcher is then empty and can be dropped.
///
/// [`flush_if_non_empty`]: Self::flush_if_non_empty
#[derive(Debug)]
pub struct MetricBatcher<'a, T> {
    client: &'a mut TrackingClient<T>,
    run_id: &'a RunId,
    cap: usize,
    buffer: Vec<Metric>,
}

impl<'a, T: Transport> MetricBatcher<'a, T> {
    /// Creates an empty batcher sending to the given run.
    ///
    /// A `cap` of zero is treated as one.
    pub fn new(client: &'a mut TrackingClient<T>, run_id: &'a RunId, cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            client,
            run_id,
            cap,
            buffer: Vec::with_capacity(cap),
        }
    }

    /// Appends a metric, sending the buffer if it reached the cap.
    pub async fn add(&mut self, metric: Metric) -> Result<()> {
        self.buffer.push(metric);
        if self.buffer.len() >= self.cap {
            self.flush().await?;
        }
        Ok(())
    }

    /// Sends all buffered metrics, if there are any.
    pub async fn flush_if_non_empty(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.flush().await?;
        }
        Ok(())
    }

    /// Number of metrics currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if no metrics are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    async fn flush(&mut self) -> Result<()> {
        let metrics = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.cap));
        tracing::trace!(run_id = %self.run_id, count = metrics.len(), "flushing metrics");
        self.client.log_metrics(self.run_id, metrics).await
    }
}
