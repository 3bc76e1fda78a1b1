// gbak: GitHub account backup tool
//
// SPDX-FileCopyrightText: 2024 Yannis Charalambidis
// SPDX-License-Identifier: MIT

//! Cooperative cancellation.
//!
//! ```text
//! Ctrl+C --> listener task --> Cancellation::request()
//!                                     |
//!        polled at suspension points: v
//!          backoff tick (net)     is_requested()
//!          branch iteration (backup)
//! ```
//!
//! The flag is set once and never cleared. Reads never block.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Process-wide cancellation flag, cloned into every component that has a
/// suspension point.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn request(&self) {
        self.token.cancel();
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a task that requests cancellation on the first Ctrl+C.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn listen_for_ctrl_c(&self) -> JoinHandle<()> {
        let cancel = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Received Ctrl+C, finishing the current download and stopping");
                cancel.request();
            }
        })
    }
}
