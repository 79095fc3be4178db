// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # fgate Integration Tests
//!
//! Shared fixtures, mocks and a harness for the integration suites under
//! `tests/`.
//!
//! ## Module Structure
//!
//! - [`common`]: shared test utilities
//!   - `fixtures`: canned topics, points and configuration files
//!   - `builders`: builders for data points
//!   - `assertions`: polling helpers for asynchronous outcomes
//!   - `mocks`: a recording protocol adapter and a failing sink
//!   - `harness`: a bus and directory with temp storage
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p fgate-tests
//! cargo test -p fgate-tests --test integration_driver
//! cargo test -p fgate-tests --test integration_queue
//! cargo test -p fgate-tests --test integration_logger
//! cargo test -p fgate-tests --test integration_config
//! cargo test -p fgate-tests --test integration_topic
//! ```
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use fgate_tests::prelude::*;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = TestHarness::new();
//!     let adapter = Arc::new(MockAdapter::new(SystemType::Opc));
//!     let driver = harness.driver("Line1", adapter.clone());
//!     driver.start();
//!     harness.wait_for_service("Opc/Line1").await;
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::builders::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::{init_test_logging, temp_test_dir};
}
