use crate::{
    events::SignatureSighting,
    workers::{
        backoff::Backoff,
        session::{self, SessionEnd, StreamingSession},
        WorkerContext,
    },
};
use anyhow::Result;
use async_trait::async_trait;
use futures::{future::BoxFuture, stream::FuturesUnordered, Future, Stream, StreamExt};
use solana_client::{
    nonblocking::pubsub_client::PubsubClient,
    rpc_config::RpcSignatureSubscribeConfig,
    rpc_response::{Response, RpcSignatureResult},
};
use solana_sdk::{commitment_config::CommitmentConfig, signature::Signature};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Waits for sighted transactions to reach finality.
///
/// All signature watches are multiplexed over a single connection: each
/// sighting gets its own `signatureSubscribe`, but every subscription shares
/// the one client. An indexed in-flight set collapses repeat sightings of a
/// signature that is already being watched. Each watch is single-use; it is
/// torn down after the first finality event.
pub struct FinalizationWatcher {
    ctx: WorkerContext,
    watch_rx: mpsc::Receiver<SignatureSighting>,
    fetch_tx: mpsc::Sender<SignatureSighting>,
}

struct WatchOutcome {
    sighting: SignatureSighting,
    finalized: bool,
}

impl FinalizationWatcher {
    pub(crate) fn new(
        ctx: WorkerContext,
        watch_rx: mpsc::Receiver<SignatureSighting>,
        fetch_tx: mpsc::Sender<SignatureSighting>,
    ) -> Self {
        Self {
            ctx,
            watch_rx,
            fetch_tx,
        }
    }

    pub async fn run(self) -> Result<()> {
        let reconnect = self.ctx.config.reconnect.clone();
        let shutdown = self.ctx.dispatcher.clone();
        session::drive(self, reconnect, shutdown).await
    }

    /// Runs one connection's worth of signature watches.
    ///
    /// Watches pending when the connection dies are lost with it; their
    /// signatures are logged and abandoned, never re-subscribed.
    async fn serve_watches(
        &mut self,
        client: &PubsubClient,
        backoff: &mut Backoff,
    ) -> Result<SessionEnd> {
        let mut watches: FuturesUnordered<BoxFuture<'_, WatchOutcome>> = FuturesUnordered::new();
        let mut in_flight: HashSet<Signature> = HashSet::new();

        loop {
            tokio::select! {
                sighting = self.watch_rx.recv() => {
                    let Some(sighting) = sighting else {
                        return Ok(SessionEnd::Shutdown);
                    };
                    if !in_flight.insert(sighting.signature) {
                        tracing::debug!(
                            signature = %sighting.signature,
                            "Signature is already being watched"
                        );
                        continue;
                    }

                    let config = RpcSignatureSubscribeConfig {
                        commitment: Some(CommitmentConfig::finalized()),
                        enable_received_notification: Some(false),
                    };
                    match client.signature_subscribe(&sighting.signature, Some(config)).await {
                        Ok((stream, unsubscribe)) => {
                            backoff.reset();
                            tracing::debug!(
                                signature = %sighting.signature,
                                wallet = %sighting.wallet.name,
                                "Watching signature for finality"
                            );
                            watches.push(Box::pin(watch_one(stream, unsubscribe, sighting)));
                        }
                        Err(e) => {
                            tracing::warn!(
                                signature = %sighting.signature,
                                "signatureSubscribe failed: {e}"
                            );
                            in_flight.remove(&sighting.signature);
                            if !in_flight.is_empty() {
                                tracing::warn!(
                                    pending = in_flight.len(),
                                    "Abandoning in-flight signature watches"
                                );
                            }
                            return Ok(SessionEnd::Disconnected);
                        }
                    }
                },
                Some(outcome) = watches.next() => {
                    in_flight.remove(&outcome.sighting.signature);
                    if outcome.finalized {
                        tracing::info!(
                            signature = %outcome.sighting.signature,
                            wallet = %outcome.sighting.wallet.name,
                            "Transaction finalized"
                        );
                        if self.fetch_tx.send(outcome.sighting).await.is_err() {
                            tracing::warn!("Transaction fetcher is down; dropping finalized signature");
                        }
                    } else {
                        tracing::warn!(
                            signature = %outcome.sighting.signature,
                            "Watch stream ended without a finality event; dropping"
                        );
                    }
                },
                _ = self.ctx.dispatcher.command_tx.closed() => {
                    return Ok(SessionEnd::Shutdown);
                },
            }
        }
    }
}

#[async_trait]
impl StreamingSession for FinalizationWatcher {
    fn name(&self) -> String {
        "signature watch".to_string()
    }

    /// Connecting alone does not reset the backoff; the first successful
    /// subscribe of the session does.
    async fn serve(&mut self, backoff: &mut Backoff) -> Result<SessionEnd> {
        let client = PubsubClient::new(&self.ctx.config.solana.ws_url).await?;
        tracing::info!("Signature watch connection established");
        self.serve_watches(&client, backoff).await
    }
}

/// Drives a single signature subscription to its first finality event.
///
/// An on-chain error in the notification still counts as finalized: failed
/// transactions flow through the pipeline like successful ones, and the
/// slippage filter downstream decides what to drop.
async fn watch_one<S, U, F>(
    mut stream: S,
    unsubscribe: U,
    sighting: SignatureSighting,
) -> WatchOutcome
where
    S: Stream<Item = Response<RpcSignatureResult>> + Unpin,
    U: FnOnce() -> F,
    F: Future<Output = ()>,
{
    let mut finalized = false;
    while let Some(notification) = stream.next().await {
        match notification.value {
            RpcSignatureResult::ProcessedSignature(result) => {
                if let Some(err) = result.err {
                    tracing::debug!(
                        signature = %sighting.signature,
                        "Transaction finalized with on-chain error: {err:?}"
                    );
                }
                finalized = true;
                break;
            }
            RpcSignatureResult::ReceivedSignature(_) => {}
        }
    }
    unsubscribe().await;
    WatchOutcome { sighting, finalized }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalletTarget;
    use futures::stream;
    use solana_client::rpc_response::{
        ProcessedSignatureResult, ReceivedSignatureResult, RpcResponseContext,
    };
    use solana_sdk::{pubkey::Pubkey, transaction::TransactionError};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    fn sighting() -> SignatureSighting {
        SignatureSighting {
            wallet: WalletTarget {
                name: "test1".to_string(),
                address: Pubkey::new_unique(),
            },
            signature: Signature::from([9u8; 64]),
        }
    }

    fn response(value: RpcSignatureResult) -> Response<RpcSignatureResult> {
        Response {
            context: RpcResponseContext {
                slot: 1,
                api_version: None,
            },
            value,
        }
    }

    #[tokio::test]
    async fn first_finality_event_resolves_the_watch() {
        let unsubscribed = Arc::new(AtomicBool::new(false));
        let flag = unsubscribed.clone();
        let notifications = stream::iter(vec![
            response(RpcSignatureResult::ReceivedSignature(
                ReceivedSignatureResult::ReceivedSignature,
            )),
            response(RpcSignatureResult::ProcessedSignature(
                ProcessedSignatureResult { err: None },
            )),
        ]);

        let outcome = watch_one(
            notifications,
            move || {
                flag.store(true, Ordering::SeqCst);
                std::future::ready(())
            },
            sighting(),
        )
        .await;

        assert!(outcome.finalized);
        assert!(unsubscribed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn onchain_error_still_counts_as_finalized() {
        let notifications = stream::iter(vec![response(RpcSignatureResult::ProcessedSignature(
            ProcessedSignatureResult {
                err: Some(TransactionError::AccountInUse),
            },
        ))]);

        let outcome = watch_one(notifications, || std::future::ready(()), sighting()).await;
        assert!(outcome.finalized);
    }

    #[tokio::test]
    async fn ended_stream_is_not_finalized() {
        let notifications = stream::iter(Vec::new());
        let outcome = watch_one(notifications, || std::future::ready(()), sighting()).await;
        assert!(!outcome.finalized);
    }
}
