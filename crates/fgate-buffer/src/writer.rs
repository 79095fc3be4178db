// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Sink abstraction and the write-behind loop.
//!
//! One [`LoggerWriter`] task per logger drains its queue block by block:
//!
//! 1. `poll_block` collects up to `block_size` points (or replays the
//!    uncommitted block).
//! 2. `write_batch` hands them to the sink.
//! 3. On success `poll_commit` acknowledges the block. On failure the block
//!    stays pending, the writer waits the retry delay, reopens the sink and
//!    tries again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;

use fgate_core::error::SinkResult;
use fgate_core::types::DataPoint;

use crate::metrics::LoggerMetricSet;
use crate::traits::LoggerQueue;

/// Default wait before retrying a failed open or write.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Destination of logged data points.
///
/// Blocks may be delivered more than once, so `write_batch` must be
/// idempotent or tolerate duplicates.
#[async_trait]
pub trait LoggerSink: Send + Sync {
    /// Sink name for logs and metrics.
    fn name(&self) -> &str;

    /// Connects to the backend.
    async fn open(&self) -> SinkResult<()>;

    /// Disconnects from the backend.
    async fn close(&self) -> SinkResult<()>;

    /// Writes one block.
    async fn write_batch(&self, points: &[DataPoint]) -> SinkResult<()>;
}

/// Drains a queue into a sink until shut down.
pub struct LoggerWriter {
    logger_id: String,
    queue: Arc<dyn LoggerQueue>,
    sink: Arc<dyn LoggerSink>,
    metrics: LoggerMetricSet,
    retry_delay: Duration,
}

impl LoggerWriter {
    /// Creates a writer.
    pub fn new(
        logger_id: impl Into<String>,
        queue: Arc<dyn LoggerQueue>,
        sink: Arc<dyn LoggerSink>,
        metrics: LoggerMetricSet,
    ) -> Self {
        Self {
            logger_id: logger_id.into(),
            queue,
            sink,
            metrics,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Sets the retry delay.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Opens the sink, then runs the write loop until `shutdown` turns `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.open_sink(&mut shutdown).await {
            return;
        }
        tracing::info!(
            logger = %self.logger_id,
            sink = self.sink.name(),
            capacity = self.queue.capacity(),
            "Writer started"
        );

        while !*shutdown.borrow() {
            let mut block = Vec::new();
            let count = self.queue.poll_block(&mut |p| block.push(p.clone())).await;
            self.metrics.set_queue_size(self.queue.size());
            if count == 0 {
                continue;
            }

            let started = Instant::now();
            match self.sink.write_batch(&block).await {
                Ok(()) => {
                    self.metrics.record_write(count, started.elapsed());
                    if let Err(e) = self.queue.poll_commit() {
                        tracing::error!(logger = %self.logger_id, error = %e, "Queue commit failed");
                    }
                }
                Err(e) => {
                    self.metrics.record_write_error(e.error_type());
                    tracing::warn!(
                        logger = %self.logger_id,
                        sink = self.sink.name(),
                        points = count,
                        error = %e,
                        retry_in = ?self.retry_delay,
                        "Write failed"
                    );
                    if !self.wait_retry(&mut shutdown).await {
                        break;
                    }
                    if let Err(e) = self.sink.open().await {
                        tracing::warn!(logger = %self.logger_id, error = %e, "Sink reopen failed");
                    }
                }
            }
        }
        tracing::info!(logger = %self.logger_id, "Writer stopped");
    }

    async fn open_sink(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            if *shutdown.borrow() {
                return false;
            }
            match self.sink.open().await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!(
                        logger = %self.logger_id,
                        sink = self.sink.name(),
                        error = %e,
                        "Sink open failed"
                    );
                    if !self.wait_retry(shutdown).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Sleeps the retry delay; returns `false` if shutdown was requested.
    async fn wait_retry(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.retry_delay) => !*shutdown.borrow(),
            _ = shutdown.changed() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryQueue;
    use crate::metrics::LoggerMetrics;
    use crate::traits::QueueConfig;
    use fgate_core::error::SinkError;
    use fgate_core::topic::parse_topic;
    use fgate_core::types::TopicValue;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FlakySink {
        failures_left: AtomicUsize,
        opens: AtomicUsize,
        batches: Mutex<Vec<Vec<i64>>>,
    }

    #[async_trait]
    impl LoggerSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn open(&self) -> SinkResult<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> SinkResult<()> {
            Ok(())
        }

        async fn write_batch(&self, points: &[DataPoint]) -> SinkResult<()> {
            let values = points
                .iter()
                .map(|p| p.value.value_as_double().unwrap_or_default() as i64)
                .collect();
            self.batches.lock().push(values);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(SinkError::write_failed("flaky", "backend down"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_block_is_replayed() {
        let queue = Arc::new(MemoryQueue::new("w", &QueueConfig::memory(100)).unwrap());
        for i in 0..3 {
            queue.add(DataPoint::new(parse_topic("Plc/S7/Node/A"), TopicValue::plain(i as i64)));
        }
        let sink = Arc::new(FlakySink::default());
        sink.failures_left.store(1, Ordering::SeqCst);

        let metrics = LoggerMetrics::new().unwrap().for_logger("w");
        let writer = LoggerWriter::new("w", queue.clone(), sink.clone(), metrics.clone())
            .with_retry_delay(Duration::from_millis(5));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(writer.run(shutdown_rx));

        for _ in 0..200 {
            if metrics.output_count() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send_replace(true);
        task.await.unwrap();

        let batches = sink.batches.lock().clone();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![0, 1, 2]]);
        assert_eq!(sink.opens.load(Ordering::SeqCst), 2);
        assert_eq!(queue.stats().committed, 3);
    }
}
