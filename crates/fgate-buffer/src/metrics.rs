// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Prometheus metrics for loggers.
//!
//! # Metrics Overview
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `fgate_logger_input_total` | Counter | Points received from the bus |
//! | `fgate_logger_output_total` | Counter | Points written by the sink |
//! | `fgate_logger_dropped_total` | Counter | Points dropped by a full queue |
//! | `fgate_logger_queue_size` | Gauge | Current queue fill |
//! | `fgate_logger_write_duration_seconds` | Histogram | Batch write duration |
//! | `fgate_logger_write_errors_total` | Counter | Failed batch writes by error type |
//!
//! Every metric carries a `logger` label with the logger id.

use std::time::Duration;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

/// Metric families shared by all loggers of a process.
#[derive(Clone)]
pub struct LoggerMetrics {
    input: IntCounterVec,
    output: IntCounterVec,
    dropped: IntCounterVec,
    queue_size: IntGaugeVec,
    write_duration: HistogramVec,
    write_errors: IntCounterVec,
}

impl LoggerMetrics {
    /// Creates unregistered metric families.
    pub fn new() -> prometheus::Result<Self> {
        Ok(Self {
            input: IntCounterVec::new(
                Opts::new("fgate_logger_input_total", "Points received from the bus"),
                &["logger"],
            )?,
            output: IntCounterVec::new(
                Opts::new("fgate_logger_output_total", "Points written by the sink"),
                &["logger"],
            )?,
            dropped: IntCounterVec::new(
                Opts::new("fgate_logger_dropped_total", "Points dropped by a full queue"),
                &["logger"],
            )?,
            queue_size: IntGaugeVec::new(
                Opts::new("fgate_logger_queue_size", "Current queue fill"),
                &["logger"],
            )?,
            write_duration: HistogramVec::new(
                HistogramOpts::new(
                    "fgate_logger_write_duration_seconds",
                    "Duration of batch writes in seconds",
                )
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
                &["logger"],
            )?,
            write_errors: IntCounterVec::new(
                Opts::new("fgate_logger_write_errors_total", "Failed batch writes by error type"),
                &["logger", "error_type"],
            )?,
        })
    }

    /// Creates the families and registers them with `registry`.
    pub fn registered(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self::new()?;
        registry.register(Box::new(metrics.input.clone()))?;
        registry.register(Box::new(metrics.output.clone()))?;
        registry.register(Box::new(metrics.dropped.clone()))?;
        registry.register(Box::new(metrics.queue_size.clone()))?;
        registry.register(Box::new(metrics.write_duration.clone()))?;
        registry.register(Box::new(metrics.write_errors.clone()))?;
        Ok(metrics)
    }

    /// Returns the series of one logger.
    pub fn for_logger(&self, logger: &str) -> LoggerMetricSet {
        LoggerMetricSet {
            logger: logger.to_string(),
            input: self.input.with_label_values(&[logger]),
            output: self.output.with_label_values(&[logger]),
            dropped: self.dropped.with_label_values(&[logger]),
            queue_size: self.queue_size.with_label_values(&[logger]),
            write_duration: self.write_duration.clone(),
            write_errors: self.write_errors.clone(),
        }
    }
}

impl std::fmt::Debug for LoggerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerMetrics").finish_non_exhaustive()
    }
}

/// Metric series bound to one logger.
#[derive(Clone)]
pub struct LoggerMetricSet {
    logger: String,
    input: IntCounter,
    output: IntCounter,
    dropped: IntCounter,
    queue_size: IntGauge,
    write_duration: HistogramVec,
    write_errors: IntCounterVec,
}

impl LoggerMetricSet {
    /// Records a point received from the bus.
    #[inline]
    pub fn record_input(&self) {
        self.input.inc();
    }

    /// Records a point dropped by a full queue.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.inc();
    }

    /// Records a successful batch write.
    pub fn record_write(&self, points: usize, duration: Duration) {
        self.output.inc_by(points as u64);
        self.write_duration
            .with_label_values(&[self.logger.as_str()])
            .observe(duration.as_secs_f64());
    }

    /// Records a failed batch write.
    pub fn record_write_error(&self, error_type: &str) {
        self.write_errors
            .with_label_values(&[self.logger.as_str(), error_type])
            .inc();
    }

    /// Updates the queue fill gauge.
    #[inline]
    pub fn set_queue_size(&self, size: usize) {
        self.queue_size.set(size as i64);
    }

    /// Points received so far.
    pub fn input_count(&self) -> u64 {
        self.input.get()
    }

    /// Points written so far.
    pub fn output_count(&self) -> u64 {
        self.output.get()
    }
}

impl std::fmt::Debug for LoggerMetricSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerMetricSet")
            .field("logger", &self.logger)
            .field("input", &self.input.get())
            .field("output", &self.output.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registered_series() {
        let registry = Registry::new();
        let metrics = LoggerMetrics::registered(&registry).unwrap();
        let a = metrics.for_logger("a");
        let b = metrics.for_logger("b");

        a.record_input();
        a.record_input();
        b.record_input();
        a.record_write(2, Duration::from_millis(3));
        a.record_write_error("io");
        a.set_queue_size(5);

        assert_eq!(a.input_count(), 2);
        assert_eq!(b.input_count(), 1);
        assert_eq!(a.output_count(), 2);

        let families = registry.gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"fgate_logger_input_total".to_string()));
        assert!(names.contains(&"fgate_logger_write_errors_total".to_string()));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        LoggerMetrics::registered(&registry).unwrap();
        assert!(LoggerMetrics::registered(&registry).is_err());
    }
}
