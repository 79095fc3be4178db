// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Process shutdown.
//!
//! SIGINT/SIGTERM (Ctrl+C off Unix) and [`ShutdownCoordinator::initiate_shutdown`]
//! both flip a single `watch` flag; every clone of the coordinator observes it.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

/// Shared stop flag for the gateway process.
///
/// ```ignore
/// let coordinator = ShutdownCoordinator::new();
/// let handle = coordinator.clone();
/// tokio::spawn(async move { handle.signalled().await; });
/// coordinator.wait_for_shutdown().await;
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    flag: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator that has not fired.
    pub fn new() -> Self {
        Self {
            flag: watch::Sender::new(false),
        }
    }

    /// Requests shutdown. Repeated calls are no-ops.
    pub fn initiate_shutdown(&self) {
        let first = self.flag.send_if_modified(|stopping| !std::mem::replace(stopping, true));
        if first {
            info!("Shutdown initiated");
        }
    }

    /// Whether shutdown was requested.
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once shutdown was requested by any clone.
    pub async fn signalled(&self) {
        let mut rx = self.flag.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stopping| *stopping).await;
    }

    /// Waits for an OS signal or a manual request.
    pub async fn wait_for_shutdown(&self) {
        tokio::select! {
            _ = os_signal() => self.initiate_shutdown(),
            _ = self.signalled() => {}
        }
    }

    /// Runs `teardown`, giving up after `timeout`.
    ///
    /// Returns `false` if the deadline passed first.
    pub async fn drain<F>(&self, timeout: Duration, teardown: F) -> bool
    where
        F: Future<Output = ()>,
    {
        let finished = tokio::time::timeout(timeout, teardown).await.is_ok();
        if !finished {
            warn!(timeout = %humantime::format_duration(timeout), "Teardown abandoned");
        }
        finished
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut int) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Signal handlers unavailable, using Ctrl+C");
            return ctrl_c().await;
        }
    };
    let name = tokio::select! {
        _ = term.recv() => "SIGTERM",
        _ = int.recv() => "SIGINT",
    };
    info!(signal = name, "Stop requested");
}

#[cfg(not(unix))]
async fn os_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C listener failed");
        std::future::pending::<()>().await;
    }
    info!(signal = "Ctrl+C", "Stop requested");
}
