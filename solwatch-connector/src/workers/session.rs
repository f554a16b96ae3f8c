//! Reconnect-forever driving shared by the streaming workers.

use crate::{config::Reconnect, dispatcher::DispatcherHandle, workers::backoff::Backoff};
use anyhow::Result;
use async_trait::async_trait;

/// How one connection's worth of work ended.
pub(crate) enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// One connection's worth of work for a streaming worker.
///
/// An implementation connects, subscribes, and streams until the connection
/// dies or shutdown is observed. Resetting the backoff after the first
/// successful subscribe of a session is the implementation's responsibility;
/// the driver only consults the schedule between sessions.
#[async_trait]
pub(crate) trait StreamingSession {
    /// Identifies the session in lifecycle log lines.
    fn name(&self) -> String;

    /// Runs one session to its end.
    async fn serve(&mut self, backoff: &mut Backoff) -> Result<SessionEnd>;
}

/// Drives a session in a reconnect-forever loop.
///
/// Connection loss is never fatal: a `Disconnected` or failed session is
/// followed by a backoff delay and a fresh session. The loop exits when a
/// session observes shutdown, or when the dispatcher's command channel closes
/// during the wait.
pub(crate) async fn drive<S: StreamingSession>(
    mut session: S,
    reconnect: Reconnect,
    shutdown: DispatcherHandle,
) -> Result<()> {
    let name = session.name();
    let mut backoff = Backoff::new(&reconnect);
    loop {
        match session.serve(&mut backoff).await {
            Ok(SessionEnd::Shutdown) => {
                tracing::info!(session = %name, "Shutdown signal received, exiting.");
                return Ok(());
            }
            Ok(SessionEnd::Disconnected) => {
                tracing::warn!(session = %name, "Streaming connection closed. Reconnecting...");
            }
            Err(e) => {
                tracing::warn!(session = %name, "Streaming connection failed: {e}. Reconnecting...");
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown.command_tx.closed() => return Ok(()),
        }
    }
}
