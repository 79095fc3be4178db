// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Builders for test objects.

use chrono::{DateTime, Utc};

use fgate_core::topic::{parse_topic, Topic};
use fgate_core::types::{DataPoint, TopicValue, Variant};

/// Builder for [`DataPoint`]s.
///
/// ```rust,ignore
/// let point = DataPointBuilder::new("Opc/Line1/Node/2/Motor.Speed")
///     .value(1450.5)
///     .status("Bad")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct DataPointBuilder {
    topic: Topic,
    value: Variant,
    status: Option<String>,
    source_time: Option<DateTime<Utc>>,
}

impl DataPointBuilder {
    /// Starts a point for `address` with a null value.
    pub fn new(address: &str) -> Self {
        Self {
            topic: parse_topic(address),
            value: Variant::Null,
            status: None,
            source_time: None,
        }
    }

    /// Sets the value.
    pub fn value(mut self, value: impl Into<Variant>) -> Self {
        self.value = value.into();
        self
    }

    /// Sets the status code.
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the source timestamp.
    pub fn source_time(mut self, time: DateTime<Utc>) -> Self {
        self.source_time = Some(time);
        self
    }

    /// Builds the point.
    pub fn build(self) -> DataPoint {
        let mut value = TopicValue::plain(self.value);
        if let Some(status) = self.status {
            value = value.with_status(status);
        }
        if let Some(time) = self.source_time {
            value = value.with_source_time(time, 0);
        }
        DataPoint::new(self.topic, value)
    }
}
