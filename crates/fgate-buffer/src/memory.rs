// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Bounded in-memory logger queue.
//!
//! Same block/replay/commit contract as the disk queue, without crash
//! recovery: pending points are lost when the process exits.
//!
//! # Example
//!
//! ```rust,ignore
//! use fgate_buffer::{MemoryQueue, QueueConfig};
//!
//! let queue = MemoryQueue::new("logger-1", &QueueConfig::memory(10_000))?;
//! assert!(queue.add(point));
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use fgate_core::error::{QueueError, QueueResult};
use fgate_core::types::DataPoint;

use crate::traits::{LoggerQueue, QueueConfig, QueueStats, QueueStatsInner};

/// Logger queue backed by a `VecDeque`.
#[derive(Debug)]
pub struct MemoryQueue {
    name: String,
    capacity: usize,
    block_size: usize,
    poll_timeout: Duration,
    queue: Mutex<VecDeque<DataPoint>>,
    notify: Notify,
    output_block: Mutex<Vec<DataPoint>>,
    stats: QueueStatsInner,
}

impl MemoryQueue {
    /// Creates a queue holding up to `config.queue_size` points.
    pub fn new(name: impl Into<String>, config: &QueueConfig) -> QueueResult<Self> {
        if config.queue_size == 0 {
            return Err(QueueError::invalid_capacity(0, "memory queue needs room for one point"));
        }
        let name = name.into();
        tracing::info!(queue = %name, capacity = config.queue_size, "Memory queue created");
        Ok(Self {
            name,
            capacity: config.queue_size,
            block_size: config.block_size.max(1),
            poll_timeout: config.poll_timeout,
            queue: Mutex::new(VecDeque::with_capacity(config.queue_size.min(65_536))),
            notify: Notify::new(),
            output_block: Mutex::new(Vec::new()),
            stats: QueueStatsInner::new(),
        })
    }

    fn try_pop(&self) -> Option<DataPoint> {
        self.queue.lock().pop_front()
    }
}

#[async_trait]
impl LoggerQueue for MemoryQueue {
    fn is_queue_full(&self) -> bool {
        self.stats.is_full()
    }

    fn size(&self) -> usize {
        self.queue.lock().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn add(&self, point: DataPoint) -> bool {
        let (accepted, size) = {
            let mut queue = self.queue.lock();
            if queue.len() < self.capacity {
                queue.push_back(point);
                (true, queue.len())
            } else {
                (false, queue.len())
            }
        };
        if accepted {
            self.notify.notify_one();
        }
        self.stats.record_add(&self.name, accepted, size)
    }

    async fn poll_block(&self, handler: &mut (dyn for<'p> FnMut(&'p DataPoint) + Send)) -> usize {
        {
            let block = self.output_block.lock();
            if !block.is_empty() {
                tracing::warn!(queue = %self.name, size = block.len(), "Repeat last data block");
                self.stats.record_replay();
                block.iter().for_each(|p| handler(p));
                return block.len();
            }
        }

        let mut next = self.try_pop();
        if next.is_none() && tokio::time::timeout(self.poll_timeout, self.notify.notified()).await.is_ok() {
            next = self.try_pop();
        }

        let mut block = Vec::new();
        while let Some(point) = next {
            if point.value.source_time.timestamp() != 0 {
                handler(&point);
                block.push(point);
            } else {
                self.stats.record_skip();
            }
            next = if block.len() < self.block_size {
                self.try_pop()
            } else {
                None
            };
        }

        let count = block.len();
        self.stats.record_poll(count);
        *self.output_block.lock() = block;
        count
    }

    fn poll_commit(&self) -> QueueResult<()> {
        let count = {
            let mut block = self.output_block.lock();
            let count = block.len();
            block.clear();
            count
        };
        self.stats.record_commit(count);
        Ok(())
    }

    fn stats(&self) -> QueueStats {
        self.stats.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================
