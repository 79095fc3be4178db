// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # fgate-buffer
//!
//! Durable write-behind queues and the logger write loop.
//!
//! ## Overview
//!
//! Values arrive faster than a database can take them, and databases go
//! away. A logger therefore decouples the bus from its sink with a bounded
//! queue:
//!
//! - [`MemoryQueue`]: `VecDeque` backed, lost on exit.
//! - [`DiskQueue`]: fixed-size ring file that survives restarts. A block
//!   that was polled but never committed is delivered again after reopen.
//!
//! Both implement [`LoggerQueue`]: `add` never blocks and drops the newest
//! point when full; `poll_block` hands out one block at a time and repeats
//! it until `poll_commit`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fgate_buffer::{create_queue, QueueConfig};
//!
//! let queue = create_queue("logger-1", &QueueConfig::disk("/var/lib/fgate/l1.buf", 64 << 20))?;
//! queue.add(point);
//! let n = queue.poll_block(&mut |p| batch.push(p.clone())).await;
//! sink.write_batch(&batch).await?;
//! queue.poll_commit()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::sync::Arc;

use fgate_core::error::QueueResult;

pub mod codec;
pub mod disk;
pub mod logger;
pub mod memory;
pub mod metrics;
pub mod sink;
pub mod traits;
pub mod writer;

pub use disk::DiskQueue;
pub use logger::{LoggerConfig, LoggerService};
pub use memory::MemoryQueue;
pub use metrics::{LoggerMetricSet, LoggerMetrics};
pub use sink::{JsonLinesSink, LogSink, SinkConfig};
pub use traits::{LoggerQueue, QueueConfig, QueueKind, QueueStats};
pub use writer::{LoggerSink, LoggerWriter, DEFAULT_RETRY_DELAY};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Opens the queue selected by `config.kind`.
pub fn create_queue(name: &str, config: &QueueConfig) -> QueueResult<Arc<dyn LoggerQueue>> {
    Ok(match config.kind {
        QueueKind::Memory => Arc::new(MemoryQueue::new(name, config)?),
        QueueKind::Disk => Arc::new(DiskQueue::open(name, config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_queue_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        let memory = create_queue("m", &QueueConfig::memory(5)).unwrap();
        assert_eq!(memory.capacity(), 5);

        let disk = create_queue("d", &QueueConfig::disk(dir.path().join("d.buf"), 4096)).unwrap();
        assert_eq!(disk.size(), 0);
        assert!(dir.path().join("d.buf").exists());
    }
}
