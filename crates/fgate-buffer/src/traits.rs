// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Logger queue traits and configuration.
//!
//! A [`LoggerQueue`] sits between the bus (many producers calling
//! [`add`](LoggerQueue::add)) and one writer task that drains it in blocks:
//!
//! ```text
//! producers ──add()──► queue ──poll_block()──► sink.write_batch() ──poll_commit()
//!                                   ▲                    │ error
//!                                   └──── replay ────────┘
//! ```
//!
//! # Delivery guarantees
//!
//! - `add` never blocks. When the queue is full the new point is dropped;
//!   a warning is logged once when the queue becomes full and once when it
//!   accepts data again.
//! - `poll_block` hands out at most `block_size` points. Until
//!   `poll_commit` is called, the next `poll_block` replays the same block.
//!   Sinks therefore see at-least-once delivery and must tolerate duplicates.
//! - Points whose source time is the Unix epoch second `0` are dropped at
//!   poll time.
//!
//! # Example
//!
//! ```rust,ignore
//! use fgate_buffer::{LoggerQueue, MemoryQueue, QueueConfig};
//!
//! let queue = MemoryQueue::new("logger-1", &QueueConfig::default());
//! queue.add(point);
//!
//! let mut batch = Vec::new();
//! let n = queue.poll_block(&mut |p| batch.push(p.clone())).await;
//! sink.write_batch(&batch).await?;
//! queue.poll_commit()?;
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fgate_core::error::QueueResult;
use fgate_core::types::DataPoint;

/// Default queue capacity: items for memory queues, bytes for disk queues.
pub const DEFAULT_QUEUE_SIZE: usize = 10_000;

/// Default maximum number of points handed out per block.
pub const DEFAULT_BLOCK_SIZE: usize = 2_000;

/// Default time `poll_block` waits for the first point.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

// =============================================================================
// Queue Configuration
// =============================================================================

/// Storage backend of a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Bounded in-memory queue; lost on restart.
    #[default]
    Memory,
    /// Fixed-size ring file; survives restarts.
    Disk,
}

/// Configuration for a logger queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Storage backend.
    #[serde(default, rename = "type")]
    pub kind: QueueKind,

    /// Capacity in items (memory) or file length in bytes (disk).
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Maximum points per block.
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// How long `poll_block` waits for the first point.
    #[serde(default = "default_poll_timeout", with = "humantime_serde")]
    pub poll_timeout: Duration,

    /// Ring file location for disk queues.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_poll_timeout() -> Duration {
    DEFAULT_POLL_TIMEOUT
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueKind::Memory,
            queue_size: DEFAULT_QUEUE_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            path: None,
        }
    }
}

impl QueueConfig {
    /// Memory queue holding `queue_size` items.
    pub fn memory(queue_size: usize) -> Self {
        Self {
            queue_size,
            ..Self::default()
        }
    }

    /// Disk queue backed by a `file_size` byte ring file at `path`.
    pub fn disk(path: impl Into<PathBuf>, file_size: usize) -> Self {
        Self {
            kind: QueueKind::Disk,
            queue_size: file_size,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Sets the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

// =============================================================================
// Queue Statistics
// =============================================================================

/// Live counters shared by the queue implementations.
#[derive(Debug, Default)]
pub struct QueueStatsInner {
    added: AtomicU64,
    dropped: AtomicU64,
    polled: AtomicU64,
    replayed: AtomicU64,
    committed: AtomicU64,
    skipped: AtomicU64,
    full_events: AtomicU64,
    recovered_events: AtomicU64,
    full: AtomicBool,
}

impl QueueStatsInner {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of an `add` and logs full/recovered transitions.
    ///
    /// Returns `accepted` unchanged.
    pub fn record_add(&self, queue: &str, accepted: bool, size: usize) -> bool {
        if accepted {
            self.added.fetch_add(1, Ordering::Relaxed);
            if self
                .full
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.recovered_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(queue, size, "Logger write queue not full anymore");
            }
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if self
                .full
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                self.full_events.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(queue, size, "Logger write queue is full");
            }
        }
        accepted
    }

    /// Records a freshly drained block.
    #[inline]
    pub fn record_poll(&self, count: usize) {
        self.polled.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records a replayed block.
    #[inline]
    pub fn record_replay(&self) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a committed block.
    #[inline]
    pub fn record_commit(&self, count: usize) {
        self.committed.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Records a point dropped for its zero source time.
    #[inline]
    pub fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether the last `add` was rejected.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    /// Creates a snapshot.
    pub fn snapshot(&self) -> QueueStats {
        QueueStats {
            added: self.added.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            polled: self.polled.load(Ordering::Relaxed),
            replayed_blocks: self.replayed.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            full_events: self.full_events.load(Ordering::Relaxed),
            recovered_events: self.recovered_events.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Points accepted by `add`.
    pub added: u64,
    /// Points rejected because the queue was full.
    pub dropped: u64,
    /// Points handed out in fresh blocks.
    pub polled: u64,
    /// Blocks handed out again because they were not committed.
    pub replayed_blocks: u64,
    /// Points acknowledged by `poll_commit`.
    pub committed: u64,
    /// Points dropped for a zero source time.
    pub skipped: u64,
    /// Transitions into the full state.
    pub full_events: u64,
    /// Transitions out of the full state.
    pub recovered_events: u64,
}

// =============================================================================
// LoggerQueue Trait
// =============================================================================

/// Write-behind queue between the bus and a sink.
///
/// Implementations are shared between producers and the writer task, so
/// every method takes `&self`. Only one task may call `poll_block` and
/// `poll_commit`.
#[async_trait]
pub trait LoggerQueue: Send + Sync {
    /// Returns `true` if the last `add` was dropped.
    fn is_queue_full(&self) -> bool;

    /// Current fill: items (memory) or bytes (disk).
    fn size(&self) -> usize;

    /// Configured capacity: items (memory) or bytes (disk).
    fn capacity(&self) -> usize;

    /// Enqueues a point without blocking; returns `false` if it was dropped.
    fn add(&self, point: DataPoint) -> bool;

    /// Hands out the pending block, or drains a new one.
    ///
    /// Waits up to the poll timeout for the first point. Calls `handler`
    /// once per point and returns the block length.
    async fn poll_block(&self, handler: &mut (dyn for<'p> FnMut(&'p DataPoint) + Send)) -> usize;

    /// Acknowledges that the last block was durably written.
    fn poll_commit(&self) -> QueueResult<()>;

    /// Counter snapshot.
    fn stats(&self) -> QueueStats;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: QueueConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, QueueConfig::default());
        assert_eq!(config.queue_size, 10_000);
        assert_eq!(config.block_size, 2_000);
        assert_eq!(config.poll_timeout, Duration::from_millis(10));

        let config: QueueConfig =
            serde_json::from_str(r#"{"type": "disk", "queue_size": 4096, "poll_timeout": "50ms", "path": "/tmp/q.buf"}"#)
                .unwrap();
        assert_eq!(config.kind, QueueKind::Disk);
        assert_eq!(config.poll_timeout, Duration::from_millis(50));
        assert_eq!(config.path, Some(PathBuf::from("/tmp/q.buf")));
    }

    #[test]
    fn test_full_transitions_logged_once() {
        let stats = QueueStatsInner::new();
        assert!(stats.record_add("q", true, 1));
        assert!(!stats.record_add("q", false, 1));
        assert!(!stats.record_add("q", false, 1));
        assert!(stats.is_full());
        assert!(stats.record_add("q", true, 1));
        assert!(stats.record_add("q", true, 2));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.full_events, 1);
        assert_eq!(snapshot.recovered_events, 1);
        assert_eq!(snapshot.added, 3);
        assert_eq!(snapshot.dropped, 2);
    }
}
