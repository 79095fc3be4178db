// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Crash-safe logger queue backed by a fixed-size ring file.
//!
//! # File layout
//!
//! ```text
//! 0        4        8
//! ┌────────┬────────┬──────────────────────────────────────────────┐
//! │  read  │ write  │ [len][record] [len][record] ... [0] (unused) │
//! └────────┴────────┴──────────────────────────────────────────────┘
//! ```
//!
//! Cursors and lengths are big-endian `u32`. A zero length marks the
//! logical end of the ring; the reader wraps to offset 8 when it sees one.
//! The file length equals the configured queue size, and reopening a file
//! of that length resumes from its stored cursors.
//!
//! # Durability
//!
//! The write cursor is stored after every enqueue. The read cursor is only
//! stored by [`poll_commit`](LoggerQueue::poll_commit), so a block that was
//! drained but never committed is delivered again after a restart. Writers
//! never overtake the committed read cursor, which keeps such a block
//! intact on disk until it is committed.
//!
//! # Memory model
//!
//! The ring is mirrored in a byte arena guarded by one mutex and written
//! through to the file. The lock covers cursor arithmetic and byte copies;
//! encoding and decoding happen outside it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use fgate_core::error::{QueueError, QueueResult};
use fgate_core::types::DataPoint;

use crate::codec;
use crate::traits::{LoggerQueue, QueueConfig, QueueStats, QueueStatsInner};

const READ_OFFSET: usize = 0;
const WRITE_OFFSET: usize = 4;
const LEN_BYTES: usize = 4;

/// First byte of the record area.
pub const START_POSITION: usize = 8;

// =============================================================================
// Ring
// =============================================================================

#[derive(Debug)]
struct Ring {
    file: File,
    data: Vec<u8>,
    read: usize,
    committed_read: usize,
    write: usize,
}

enum Dequeued {
    Empty,
    Record(Vec<u8>),
}

impl Ring {
    fn put(&mut self, offset: usize, bytes: &[u8]) -> std::io::Result<()> {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.file.seek(SeekFrom::Start(offset as u64))?;
        self.file.write_all(bytes)
    }

    fn get_u32(&self, offset: usize) -> usize {
        if offset + LEN_BYTES > self.data.len() {
            return 0;
        }
        let mut raw = [0u8; LEN_BYTES];
        raw.copy_from_slice(&self.data[offset..offset + LEN_BYTES]);
        u32::from_be_bytes(raw) as usize
    }

    fn store_read(&mut self) -> std::io::Result<()> {
        let read = (self.read as u32).to_be_bytes();
        self.put(READ_OFFSET, &read)
    }

    fn store_write(&mut self) -> std::io::Result<()> {
        let write = (self.write as u32).to_be_bytes();
        self.put(WRITE_OFFSET, &write)
    }

    /// Moves all cursors of an empty ring back to the start.
    ///
    /// Both cursors are stored in a single write.
    fn rewind(&mut self) -> std::io::Result<()> {
        self.read = START_POSITION;
        self.committed_read = START_POSITION;
        self.write = START_POSITION;
        let mut cursors = [0u8; START_POSITION];
        cursors[READ_OFFSET..READ_OFFSET + LEN_BYTES].copy_from_slice(&(START_POSITION as u32).to_be_bytes());
        cursors[WRITE_OFFSET..WRITE_OFFSET + LEN_BYTES].copy_from_slice(&(START_POSITION as u32).to_be_bytes());
        self.put(READ_OFFSET, &cursors)
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Appends one framed record. Returns `false` if it would overwrite
    /// uncommitted data.
    fn enqueue(&mut self, frame: &[u8]) -> std::io::Result<bool> {
        if self.read == self.write && self.committed_read == self.write && self.write != START_POSITION {
            self.rewind()?;
        }
        let size = frame.len();
        let capacity = self.capacity();
        let committed = self.committed_read;

        let position = if self.write < committed {
            if self.write + size >= committed {
                return Ok(false);
            }
            self.write
        } else if self.write + size <= capacity {
            self.write
        } else {
            if START_POSITION + size >= committed {
                return Ok(false);
            }
            if self.write + LEN_BYTES <= capacity {
                let write = self.write;
                self.put(write, &0u32.to_be_bytes())?;
            }
            START_POSITION
        };

        self.put(position, frame)?;
        self.write = position + size;
        self.store_write()?;
        Ok(true)
    }

    fn dequeue(&mut self) -> Dequeued {
        if self.read == self.write {
            return Dequeued::Empty;
        }

        let mut len = self.get_u32(self.read);
        if len == 0 {
            self.read = START_POSITION;
            if self.write == START_POSITION {
                return Dequeued::Empty;
            }
            len = self.get_u32(START_POSITION);
        }

        let begin = self.read + LEN_BYTES;
        if len == 0 || begin + len > self.capacity() {
            tracing::error!(read = self.read, write = self.write, len, "Corrupt record length, discarding pending data");
            self.read = self.write;
            return Dequeued::Empty;
        }

        let record = self.data[begin..begin + len].to_vec();
        self.read = begin + len;
        Dequeued::Record(record)
    }

    fn used(&self) -> usize {
        if self.write >= self.read {
            self.write - self.read
        } else {
            self.capacity() - self.read + (self.write - START_POSITION)
        }
    }
}

// =============================================================================
// DiskQueue
// =============================================================================

/// Logger queue persisted in a ring file.
#[derive(Debug)]
pub struct DiskQueue {
    name: String,
    path: PathBuf,
    block_size: usize,
    poll_timeout: Duration,
    ring: Mutex<Ring>,
    semaphore: Semaphore,
    output_block: Mutex<Vec<DataPoint>>,
    stats: QueueStatsInner,
}

impl DiskQueue {
    /// Opens or creates the ring file.
    ///
    /// The file lives at `config.path`, or `<name>.buf` in the working
    /// directory when no path is configured. An existing file whose length
    /// differs from `config.queue_size` is reinitialized.
    pub fn open(name: impl Into<String>, config: &QueueConfig) -> QueueResult<Self> {
        let name = name.into();
        let capacity = config.queue_size;
        if capacity <= START_POSITION + LEN_BYTES || capacity > u32::MAX as usize {
            return Err(QueueError::invalid_capacity(
                capacity as u64,
                format!("disk queue size must be between {} and {} bytes", START_POSITION + LEN_BYTES + 1, u32::MAX),
            ));
        }
        let path = config
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.buf", name)));

        let ring = open_ring(&path, capacity)?;
        tracing::info!(
            queue = %name,
            path = %path.display(),
            read = ring.read,
            write = ring.write,
            "Disk queue opened"
        );

        Ok(Self {
            name,
            path,
            block_size: config.block_size.max(1),
            poll_timeout: config.poll_timeout,
            ring: Mutex::new(ring),
            semaphore: Semaphore::new(0),
            output_block: Mutex::new(Vec::new()),
            stats: QueueStatsInner::new(),
        })
    }

    /// Location of the ring file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes file contents to the storage device.
    pub fn sync(&self) -> QueueResult<()> {
        let ring = self.ring.lock();
        ring.file
            .sync_data()
            .map_err(|e| QueueError::io(&self.path, e))
    }

    fn next_point(&self) -> Option<DataPoint> {
        loop {
            let record = match self.ring.lock().dequeue() {
                Dequeued::Empty => return None,
                Dequeued::Record(record) => record,
            };
            match codec::decode(&record) {
                Ok(point) => return Some(point),
                Err(e) => {
                    tracing::warn!(queue = %self.name, error = %e, "Skipping undecodable record");
                }
            }
        }
    }
}

fn open_ring(path: &Path, capacity: usize) -> QueueResult<Ring> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| QueueError::io(parent, e))?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| QueueError::io(path, e))?;
    let length = file.metadata().map_err(|e| QueueError::io(path, e))?.len();

    if length == capacity as u64 {
        let mut data = vec![0u8; capacity];
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_exact(&mut data))
            .map_err(|e| QueueError::io(path, e))?;
        let mut ring = Ring {
            file,
            data,
            read: START_POSITION,
            committed_read: START_POSITION,
            write: START_POSITION,
        };
        let read = ring.get_u32(READ_OFFSET);
        let write = ring.get_u32(WRITE_OFFSET);
        let valid = |p: usize| (START_POSITION..=capacity).contains(&p);
        if valid(read) && valid(write) {
            ring.read = read;
            ring.committed_read = read;
            ring.write = write;
            return Ok(ring);
        }
        tracing::warn!(path = %path.display(), read, write, "Stored cursors out of range, reinitializing");
        ring.store_read()
            .and_then(|_| ring.store_write())
            .map_err(|e| QueueError::io(path, e))?;
        return Ok(ring);
    }

    file.set_len(capacity as u64)
        .map_err(|e| QueueError::io(path, e))?;
    let mut ring = Ring {
        file,
        data: vec![0u8; capacity],
        read: START_POSITION,
        committed_read: START_POSITION,
        write: START_POSITION,
    };
    ring.store_read()
        .and_then(|_| ring.store_write())
        .map_err(|e| QueueError::io(path, e))?;
    Ok(ring)
}

#[async_trait]
impl LoggerQueue for DiskQueue {
    fn is_queue_full(&self) -> bool {
        self.stats.is_full()
    }

    fn size(&self) -> usize {
        self.ring.lock().used()
    }

    fn capacity(&self) -> usize {
        self.ring.lock().capacity()
    }

    fn add(&self, point: DataPoint) -> bool {
        let record = match codec::encode(&point) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(queue = %self.name, topic = %point.topic, error = %e, "Cannot encode data point");
                return false;
            }
        };
        let mut frame = Vec::with_capacity(LEN_BYTES + record.len());
        frame.extend_from_slice(&(record.len() as u32).to_be_bytes());
        frame.extend_from_slice(&record);

        let (accepted, size) = {
            let mut ring = self.ring.lock();
            let accepted = match ring.enqueue(&frame) {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(queue = %self.name, path = %self.path.display(), error = %e, "Queue file write failed");
                    false
                }
            };
            (accepted, ring.used())
        };

        if self.semaphore.available_permits() == 0 {
            self.semaphore.add_permits(1);
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

        let mut next = self.next_point();
        if next.is_none() {
            if let Ok(Ok(permit)) = tokio::time::timeout(self.poll_timeout, self.semaphore.acquire()).await {
                permit.forget();
                next = self.next_point();
            }
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
                self.next_point()
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
        let mut block = self.output_block.lock();
        {
            let mut ring = self.ring.lock();
            ring.store_read().map_err(|e| QueueError::io(&self.path, e))?;
            ring.committed_read = ring.read;
        }
        self.stats.record_commit(block.len());
        block.clear();
        Ok(())
    }

    fn stats(&self) -> QueueStats {
        self.stats.snapshot()
    }
}

// =============================================================================
// Tests
// =============================================================================
