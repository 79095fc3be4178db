// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # fgate-core
//!
//! Core abstractions shared by every fgate component:
//!
//! - **Topic**: hierarchical address model (`Opc/Line1/Node/2/Motor.Speed`)
//! - **Types**: `TopicValue` with protocol-tagged payloads, `DataPoint`
//! - **Registry**: reference-counted client/topic/monitored-item ledger
//! - **Bus**: in-process request/reply and publish/subscribe
//! - **Service**: directory where connected drivers advertise themselves
//! - **Driver**: connection state machine around a `ProtocolAdapter`
//! - **Error**: unified error hierarchy
//!
//! ## Example
//!
//! ```
//! use fgate_core::topic::{parse_topic, SystemType, TopicType};
//!
//! let topic = parse_topic("Opc/Line1/Node/2/Motor.Speed");
//! assert_eq!(topic.system_type, SystemType::Opc);
//! assert_eq!(topic.topic_type, TopicType::Node);
//! assert_eq!(topic.topic_node, "ns=2;s=Motor.Speed");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod topic;
pub mod types;
pub mod registry;

// =============================================================================
// Messaging Modules
// =============================================================================

pub mod message;
pub mod bus;
pub mod service;

// =============================================================================
// Driver Modules
// =============================================================================

pub mod driver;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use topic::{
    decode_from_json, encode_to_json, parse_topic, BrowsePath, DataFormat, SystemType, Topic,
    TopicType,
};
pub use types::{DataPoint, Payload, TopicValue, Variant, STATUS_GOOD};
pub use registry::{MonitoredItem, Registry};

pub use message::{BusPayload, BusReply, PublishRequest, SubscribeRequest, UnsubscribeRequest};
pub use bus::{BusStats, HandlerRegistration, MessageBus, TopicSubscriber};
pub use service::{
    InMemoryServiceDirectory, ServiceDirectory, ServiceEvent, ServiceRecord, ServiceStatus,
};

pub use driver::{
    AdapterFactory, AdapterRegistry, Driver, DriverConfig, DriverContext, DriverState,
    ProtocolAdapter, PublishData,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
