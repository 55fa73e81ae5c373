// ABOUTME: Periodic background task lifecycle with explicit shutdown
// ABOUTME: Used for rate limit sweeps, signing key maintenance, and store retention
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Background Task Lifecycle
//!
//! Tasks tick on a fixed interval until their owner calls
//! [`BackgroundTask::shutdown`]. The process owns every handle, so nothing
//! runs detached.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle to a running periodic task
pub struct BackgroundTask {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl BackgroundTask {
    /// Task name used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Stop the task and wait for the current tick to finish
    pub async fn shutdown(self) {
        if let Err(e) = self.shutdown_tx.send(()).await {
            debug!(task = self.name, error = ?e, "Background task already stopped");
        }
        if let Err(e) = self.task.await {
            warn!(task = self.name, error = %e, "Background task failed");
        }
    }
}

/// Run `tick` every `interval` until shut down
///
/// The first tick fires immediately.
pub fn spawn_periodic<F, Fut>(name: &'static str, interval: Duration, mut tick: F) -> BackgroundTask
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => tick().await,
                _ = shutdown_rx.recv() => {
                    debug!(task = name, "Background task received shutdown signal");
                    break;
                }
            }
        }
    });

    BackgroundTask {
        name,
        shutdown_tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ticks_until_shutdown() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = spawn_periodic("counter", Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        task.shutdown().await;
        let after_shutdown = ticks.load(Ordering::SeqCst);
        assert!(after_shutdown >= 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_shutdown);
    }
}
