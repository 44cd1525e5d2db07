/*
 *     Copyright 2026 The Tag Gateway Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::future::Future;
use std::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

/// Shutdown is the lifecycle of the listener. Triggering it stops the accept
/// loop and cancels the token of every connection, so the calls in flight on
/// them end with CANCELLED. The connection tasks are tracked so the binary can
/// wait for them before it flushes the tracer.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    /// token is the root of every connection token.
    token: CancellationToken,

    /// connections tracks the tasks serving the accepted connections.
    connections: TaskTracker,
}

/// Shutdown implements the listener lifecycle.
impl Shutdown {
    /// new creates a shutdown that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// is_shutdown returns true once the shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// trigger starts the shutdown and closes the tracker, so wait resolves once
    /// the tracked tasks are done.
    pub fn trigger(&self) {
        self.token.cancel();
        self.connections.close();
    }

    /// recv waits until the shutdown is triggered.
    pub async fn recv(&self) {
        self.token.cancelled().await
    }

    /// connection_token returns the token of a new connection, cancelled by the
    /// shutdown.
    pub fn connection_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// spawn runs a task serving a connection, or one of its HTTP/2 streams, and
    /// tracks it.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.connections.spawn(task);
    }

    /// wait resolves once the shutdown is triggered and every tracked connection
    /// task has finished.
    pub async fn wait(&self) {
        self.recv().await;
        self.connections.wait().await;
    }
}

/// shutdown_signal resolves when the process receives SIGINT, SIGTERM or SIGQUIT.
pub async fn shutdown_signal() -> io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
        },
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = sigquit.recv() => {
            info!("received SIGQUIT, shutting down");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn trigger_cancels_connection_tokens() {
        let shutdown = Shutdown::new();
        let token = shutdown.connection_token();
        let observer = shutdown.clone();
        assert!(!observer.is_shutdown());

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), observer.recv())
            .await
            .unwrap();
        assert!(observer.is_shutdown());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_connection_token_leaves_shutdown_untriggered() {
        let shutdown = Shutdown::new();
        let token = shutdown.connection_token();
        token.cancel();
        assert!(!shutdown.is_shutdown());
    }

    #[tokio::test]
    async fn wait_drains_connection_tasks() {
        let shutdown = Shutdown::new();
        let token = shutdown.connection_token();
        let (finished_tx, mut finished_rx) = oneshot::channel();
        shutdown.spawn(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = finished_tx.send(());
        });

        // Not triggered yet, the task is still serving.
        assert!(
            tokio::time::timeout(Duration::from_millis(50), shutdown.wait())
                .await
                .is_err()
        );

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .unwrap();
        assert!(finished_rx.try_recv().is_ok());
    }
}
