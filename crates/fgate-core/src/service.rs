// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service discovery for drivers.
//!
//! Connected drivers advertise a [`ServiceRecord`] whose endpoint is the
//! driver's bus address prefix (`<SystemType>/<id>`). Loggers watch the
//! directory and subscribe their topics whenever a matching driver comes up.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::topic::SystemType;

/// Availability of an advertised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    /// Accepting requests.
    Up,
    /// Withdrawn.
    Down,
}

/// An advertised driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Driver id.
    pub name: String,
    /// Protocol family of the driver.
    pub system_type: SystemType,
    /// Bus address prefix, `<SystemType>/<id>`.
    pub endpoint: String,
    /// Current status.
    pub status: ServiceStatus,
}

impl ServiceRecord {
    /// Creates an `Up` record for a driver.
    pub fn driver(name: impl Into<String>, system_type: SystemType) -> Self {
        let name = name.into();
        Self {
            endpoint: format!("{}/{}", system_type, name),
            name,
            system_type,
            status: ServiceStatus::Up,
        }
    }

    /// Bus address of one of the driver's request handlers.
    pub fn address(&self, operation: &str) -> String {
        format!("{}/{}", self.endpoint, operation)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.endpoint, self.status)
    }
}

/// Change notification from a [`ServiceDirectory`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// A service was published.
    Up(ServiceRecord),
    /// A service was withdrawn.
    Down(ServiceRecord),
}

impl ServiceEvent {
    /// The record the event is about.
    pub fn record(&self) -> &ServiceRecord {
        match self {
            ServiceEvent::Up(record) | ServiceEvent::Down(record) => record,
        }
    }
}

/// Where drivers advertise themselves.
pub trait ServiceDirectory: Send + Sync {
    /// Publishes (or replaces) a record.
    fn publish(&self, record: ServiceRecord);

    /// Withdraws the record with `endpoint`, if any.
    fn unpublish(&self, endpoint: &str);

    /// Snapshot of the records currently up.
    fn services(&self) -> Vec<ServiceRecord>;

    /// Subscribes to future changes.
    fn watch(&self) -> broadcast::Receiver<ServiceEvent>;
}

/// Process-local [`ServiceDirectory`].
pub struct InMemoryServiceDirectory {
    records: RwLock<HashMap<String, ServiceRecord>>,
    events: broadcast::Sender<ServiceEvent>,
}

impl InMemoryServiceDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            records: RwLock::new(HashMap::new()),
            events,
        }
    }
}

impl Default for InMemoryServiceDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDirectory for InMemoryServiceDirectory {
    fn publish(&self, record: ServiceRecord) {
        let record = ServiceRecord {
            status: ServiceStatus::Up,
            ..record
        };
        self.records
            .write()
            .insert(record.endpoint.clone(), record.clone());
        tracing::info!(endpoint = %record.endpoint, "Service published");
        let _ = self.events.send(ServiceEvent::Up(record));
    }

    fn unpublish(&self, endpoint: &str) {
        if let Some(mut record) = self.records.write().remove(endpoint) {
            record.status = ServiceStatus::Down;
            tracing::info!(%endpoint, "Service withdrawn");
            let _ = self.events.send(ServiceEvent::Down(record));
        }
    }

    fn services(&self) -> Vec<ServiceRecord> {
        self.records.read().values().cloned().collect()
    }

    fn watch(&self) -> broadcast::Receiver<ServiceEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_unpublish() {
        let directory = InMemoryServiceDirectory::new();
        let mut events = directory.watch();

        let record = ServiceRecord::driver("line1", SystemType::Opc);
        assert_eq!(record.endpoint, "Opc/line1");
        assert_eq!(record.address("Subscribe"), "Opc/line1/Subscribe");

        directory.publish(record.clone());
        assert_eq!(directory.services(), vec![record.clone()]);
        assert_eq!(events.try_recv().unwrap(), ServiceEvent::Up(record));

        directory.unpublish("Opc/line1");
        assert!(directory.services().is_empty());
        let event = events.try_recv().unwrap();
        assert!(matches!(event, ServiceEvent::Down(_)));
        assert_eq!(event.record().status, ServiceStatus::Down);

        directory.unpublish("Opc/line1");
        assert!(events.try_recv().is_err());
    }
}
