//! Interrupt handling
//!
//! The first signal asks the run to wind down gracefully. Draining can take
//! up to the request timeout, so a second signal forces an exit.

use std::future::Future;
use std::io;

use tokio::sync::oneshot;
use tracing::warn;

/// Watch `next_signal` in the background.
///
/// The returned future resolves on the first signal; `on_force` runs on the
/// second. If listening fails the returned future never resolves.
pub fn graceful_then_forced<S, Fut, F>(
    mut next_signal: S,
    on_force: F,
) -> impl Future<Output = ()> + Send + 'static
where
    S: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = io::Result<()>> + Send,
    F: FnOnce() + Send + 'static,
{
    let (graceful_tx, graceful_rx) = oneshot::channel();

    tokio::spawn(async move {
        if let Err(e) = next_signal().await {
            warn!("Failed to listen for interrupt: {}", e);
            return;
        }
        let _ = graceful_tx.send(());

        if next_signal().await.is_ok() {
            warn!("Second interrupt, exiting without draining virtual users");
            on_force();
        }
    });

    async move {
        if graceful_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Ctrl-C handling for the CLI: drain on the first, exit 130 on the second.
pub fn ctrl_c() -> impl Future<Output = ()> + Send + 'static {
    graceful_then_forced(tokio::signal::ctrl_c, || std::process::exit(130))
}
