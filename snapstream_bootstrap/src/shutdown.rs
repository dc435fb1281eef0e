// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Shutdown Coordination
//!
//! One controller, many tokens. The controller lives with `main`; every
//! long-running task (job workers, socket listeners, accept loops) holds a
//! token and races its work against [`ShutdownToken::cancelled`]. Built on
//! a `watch` channel so a token handed out after shutdown still observes
//! it, and dropping the controller counts as shutdown rather than leaving
//! waiters hanging.

use tokio::sync::watch;

/// Owner side of the shutdown signal.
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        ShutdownController { sender }
    }

    /// A token for one cooperating task. Tokens are cheap to clone.
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.sender.subscribe(),
        }
    }

    /// Signals every token. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.sender.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Task-side view of the shutdown signal.
#[derive(Clone)]
pub struct ShutdownToken {
    receiver: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves when shutdown is signalled (or the controller is gone).
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow() {
                return;
            }
            // A dropped controller means the process is winding down too.
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fresh_controller_not_shutdown() {
        let controller = ShutdownController::new();
        assert!(!controller.is_shutdown());
        assert!(!controller.token().is_cancelled());
    }

    #[test]
    fn test_shutdown_reaches_existing_and_new_tokens() {
        let controller = ShutdownController::new();
        let early = controller.token();
        controller.shutdown();
        let late = controller.token();
        assert!(early.is_cancelled());
        assert!(late.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let controller = ShutdownController::new();
        let token = controller.token();

        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.shutdown();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .expect("waiter should not panic");
    }

    #[tokio::test]
    async fn test_dropped_controller_counts_as_shutdown() {
        let controller = ShutdownController::new();
        let token = controller.token();
        drop(controller);

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("drop should release waiters");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_after_shutdown() {
        let controller = ShutdownController::new();
        controller.shutdown();
        let token = controller.token();
        token.cancelled().await;
        assert!(token.is_cancelled());
    }
}
