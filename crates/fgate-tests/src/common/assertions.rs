// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Assertion helpers for outcomes that arrive asynchronously.

use std::future::Future;
use std::time::Duration;

use fgate_core::{BusPayload, DataPoint, TopicSubscriber};

/// Default time to wait for an asynchronous outcome.
pub const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
///
/// Returns whether the condition held.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Panics with `message` unless `condition` holds within [`EVENTUALLY_TIMEOUT`].
pub async fn assert_eventually<F>(message: &str, condition: F)
where
    F: FnMut() -> bool,
{
    assert!(eventually(EVENTUALLY_TIMEOUT, condition).await, "timed out: {}", message);
}

/// Awaits `future`, panicking if it takes longer than [`EVENTUALLY_TIMEOUT`].
pub async fn within<F: Future>(what: &str, future: F) -> F::Output {
    tokio::time::timeout(EVENTUALLY_TIMEOUT, future)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", what))
}

/// Receives the next payload and decodes it into a data point.
pub async fn recv_point(subscriber: &mut TopicSubscriber) -> DataPoint {
    let payload = within("bus value", subscriber.recv())
        .await
        .expect("subscriber closed");
    payload.decode().expect("payload is not a JSON envelope")
}

/// Receives the next payload, expecting raw bytes.
pub async fn recv_bytes(subscriber: &mut TopicSubscriber) -> Vec<u8> {
    match within("bus value", subscriber.recv()).await.expect("subscriber closed") {
        BusPayload::Bytes(bytes) => bytes,
        other => panic!("expected raw bytes, got {:?}", other),
    }
}

/// Asserts that nothing arrives on `subscriber` within `wait`.
pub async fn assert_silent(subscriber: &mut TopicSubscriber, wait: Duration) {
    tokio::time::sleep(wait).await;
    let pending = subscriber.try_recv().expect("subscriber closed");
    assert!(pending.is_none(), "unexpected payload {:?}", pending);
}
