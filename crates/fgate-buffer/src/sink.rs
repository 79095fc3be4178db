// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Built-in logger sinks.
//!
//! - [`JsonLinesSink`]: appends one JSON object per point to a file.
//! - [`LogSink`]: emits one tracing event per point.
//!
//! Database backends plug in through [`LoggerSink`].

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use fgate_core::error::{SinkError, SinkResult};
use fgate_core::types::DataPoint;

use crate::writer::LoggerSink;

// =============================================================================
// Sink configuration
// =============================================================================

/// Sink selection for a logger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    /// JSON Lines file.
    JsonLines {
        /// Output file, created if missing.
        path: PathBuf,
    },
    /// Tracing events at info level.
    Log,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::Log
    }
}

impl SinkConfig {
    /// Builds the configured sink.
    pub fn build(&self, logger_id: &str) -> Arc<dyn LoggerSink> {
        match self {
            Self::JsonLines { path } => Arc::new(JsonLinesSink::new(logger_id, path)),
            Self::Log => Arc::new(LogSink::new(logger_id)),
        }
    }
}

// =============================================================================
// JSON Lines
// =============================================================================

/// Appends points as JSON Lines.
pub struct JsonLinesSink {
    name: String,
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl JsonLinesSink {
    /// Creates a closed sink writing to `path`.
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self {
            name: name.into(),
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(None),
        }
    }

    /// Output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file is open.
    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }
}

#[async_trait]
impl LoggerSink for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> SinkResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SinkError::io(&self.name, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SinkError::io(&self.name, e))?;
        *self.writer.lock() = Some(BufWriter::new(file));
        tracing::debug!(sink = %self.name, path = %self.path.display(), "JSON Lines sink opened");
        Ok(())
    }

    async fn close(&self) -> SinkResult<()> {
        if let Some(mut writer) = self.writer.lock().take() {
            writer.flush().map_err(|e| SinkError::io(&self.name, e))?;
        }
        Ok(())
    }

    async fn write_batch(&self, points: &[DataPoint]) -> SinkResult<()> {
        let mut guard = self.writer.lock();
        let writer = guard
            .as_mut()
            .ok_or_else(|| SinkError::unavailable(&self.name, "file not open"))?;

        for point in points {
            serde_json::to_writer(&mut *writer, &point.to_json())
                .map_err(|e| SinkError::write_failed(&self.name, e.to_string()))?;
            writer.write_all(b"\n").map_err(|e| SinkError::io(&self.name, e))?;
        }
        writer.flush().map_err(|e| SinkError::io(&self.name, e))
    }
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

// =============================================================================
// Tracing
// =============================================================================

/// Writes points to the process log.
#[derive(Debug, Clone)]
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Creates a log sink.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl LoggerSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(&self) -> SinkResult<()> {
        Ok(())
    }

    async fn close(&self) -> SinkResult<()> {
        Ok(())
    }

    async fn write_batch(&self, points: &[DataPoint]) -> SinkResult<()> {
        for point in points {
            tracing::info!(
                logger = %self.name,
                topic = %point.topic.topic_name,
                value = %point.value.value_as_string(),
                status = point.value.status_as_string(),
                source_time = %point.value.source_time,
                "Data point"
            );
        }
        Ok(())
    }
}
