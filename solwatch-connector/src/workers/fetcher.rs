use crate::{
    config::Fetcher,
    events::{RawTransaction, SignatureSighting, TransactionRecord},
    rpc::{FetchError, TransactionRpc},
    workers::WorkerContext,
};
use anyhow::Result;
use solana_transaction_status::EncodedConfirmedTransactionWithStatusMeta;
use tokio::{
    sync::mpsc,
    time::{sleep, Duration},
};

/// Retrieves the full record of finalized transactions.
///
/// Every finalized sighting is processed in its own task, so a slow or
/// retrying lookup never holds back the rest of the pipeline. Surviving
/// records are categorized, appended to the store, and handed to the
/// dispatcher.
pub struct TransactionFetcher {
    ctx: WorkerContext,
    fetch_rx: mpsc::Receiver<SignatureSighting>,
}

impl TransactionFetcher {
    pub(crate) fn new(ctx: WorkerContext, fetch_rx: mpsc::Receiver<SignatureSighting>) -> Self {
        Self { ctx, fetch_rx }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                sighting = self.fetch_rx.recv() => {
                    let Some(sighting) = sighting else {
                        return Ok(());
                    };
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        Self::process(ctx, sighting).await;
                    });
                },
                _ = self.ctx.dispatcher.command_tx.closed() => {
                    tracing::info!("TransactionFetcher: shutdown signal received, exiting.");
                    return Ok(());
                },
            }
        }
    }

    /// Fetches, filters, categorizes, records, and dispatches one transaction.
    async fn process(ctx: WorkerContext, sighting: SignatureSighting) {
        let Some(fetched) =
            fetch_with_retries(ctx.rpc.as_ref(), &ctx.config.fetcher, &sighting).await
        else {
            return;
        };

        let raw = match RawTransaction::try_from(fetched) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    signature = %sighting.signature,
                    "Discarding malformed transaction: {e}"
                );
                return;
            }
        };

        if raw.slippage_exceeded() {
            tracing::debug!(
                signature = %sighting.signature,
                wallet = %sighting.wallet.name,
                "Skipping transaction that exceeded slippage tolerance"
            );
            return;
        }

        let record = TransactionRecord::new(sighting.signature, sighting.wallet, raw);
        tracing::info!(
            signature = %record.signature,
            wallet = %record.wallet.name,
            slot = record.slot,
            category = %record.category,
            "Transaction categorized"
        );

        if let Err(e) = ctx.store.append(record.clone()).await {
            tracing::warn!(signature = %record.signature, "Failed to record transaction: {e}");
        }
        ctx.dispatcher.dispatch(record).await;
    }
}

/// Fetches a transaction, retrying while the node has not yet served it.
///
/// Finalized transactions can lag behind their finality notification on some
/// nodes, so an empty result is retried with a short delay until the attempt
/// budget runs out. Transport errors are not retried; the signature is
/// dropped and the pipeline moves on.
async fn fetch_with_retries(
    rpc: &dyn TransactionRpc,
    config: &Fetcher,
    sighting: &SignatureSighting,
) -> Option<EncodedConfirmedTransactionWithStatusMeta> {
    let delay = Duration::from_millis(config.retry_delay_ms);
    for attempt in 0..=config.retries {
        match rpc.fetch_transaction(&sighting.signature).await {
            Ok(tx) => return Some(tx),
            Err(FetchError::NotAvailable) => {
                if attempt < config.retries {
                    tracing::debug!(
                        signature = %sighting.signature,
                        attempt = attempt + 1,
                        "Transaction not yet available; retrying"
                    );
                    sleep(delay).await;
                } else {
                    tracing::warn!(
                        signature = %sighting.signature,
                        attempts = config.retries + 1,
                        "Transaction still unavailable; giving up"
                    );
                }
            }
            Err(FetchError::Rpc(e)) => {
                tracing::warn!(
                    signature = %sighting.signature,
                    "Failed to fetch transaction: {e}"
                );
                return None;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{TrackerConfig, WalletTarget};
    use crate::dispatcher::DispatcherCommand;
    use crate::storage::{MemoryStore, TransactionStore};
    use async_trait::async_trait;
    use serde_json::json;
    use solana_client::client_error::{ClientError, ClientErrorKind};
    use solana_sdk::{pubkey::Pubkey, signature::Signature};
    use std::collections::VecDeque;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::sync::Mutex;

    /// Serves a queue of scripted outcomes, one per call.
    struct ScriptedRpc {
        outcomes: Mutex<VecDeque<Result<EncodedConfirmedTransactionWithStatusMeta, FetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedRpc {
        fn new(
            outcomes: Vec<Result<EncodedConfirmedTransactionWithStatusMeta, FetchError>>,
        ) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransactionRpc for ScriptedRpc {
        async fn fetch_transaction(
            &self,
            _signature: &Signature,
        ) -> Result<EncodedConfirmedTransactionWithStatusMeta, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(FetchError::NotAvailable))
        }
    }

    fn fetched_transaction(logs: &[&str]) -> EncodedConfirmedTransactionWithStatusMeta {
        serde_json::from_value(json!({
            "slot": 341197053u64,
            "transaction": {
                "signatures": ["2id3YC2jK9G5Wo2phDx4gJVAew8DcY5NAojnVuao8rkxwPYPe8cSwE5GzhEgJA2y8fVjDEo6iR6ykBvDxrTQrtpb"],
                "message": {
                    "accountKeys": [],
                    "header": {
                        "numReadonlySignedAccounts": 0,
                        "numReadonlyUnsignedAccounts": 1,
                        "numRequiredSignatures": 1
                    },
                    "instructions": [],
                    "recentBlockhash": "11111111111111111111111111111111"
                }
            },
            "meta": {
                "err": null,
                "status": { "Ok": null },
                "fee": 5000,
                "preBalances": [],
                "postBalances": [],
                "innerInstructions": [],
                "logMessages": logs,
                "preTokenBalances": [],
                "postTokenBalances": [],
                "rewards": []
            },
            "blockTime": 1700000000
        }))
        .unwrap()
    }

    fn sighting() -> SignatureSighting {
        SignatureSighting {
            wallet: WalletTarget {
                name: "test1".to_string(),
                address: Pubkey::new_unique(),
            },
            signature: Signature::from([3u8; 64]),
        }
    }

    fn fetch_config(retries: u32) -> Fetcher {
        Fetcher {
            retries,
            retry_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn empty_results_are_retried_until_served() {
        let rpc = ScriptedRpc::new(vec![
            Err(FetchError::NotAvailable),
            Err(FetchError::NotAvailable),
            Ok(fetched_transaction(&["Program log: ok"])),
        ]);

        let fetched = fetch_with_retries(&rpc, &fetch_config(3), &sighting()).await;
        assert!(fetched.is_some());
        assert_eq!(rpc.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_the_attempt_budget() {
        let rpc = ScriptedRpc::new(Vec::new());

        let fetched = fetch_with_retries(&rpc, &fetch_config(2), &sighting()).await;
        assert!(fetched.is_none());
        assert_eq!(rpc.calls(), 3);
    }

    #[tokio::test]
    async fn transport_errors_are_terminal() {
        let rpc = ScriptedRpc::new(vec![Err(FetchError::Rpc(ClientError::from(
            ClientErrorKind::Custom("connection refused".to_string()),
        )))]);

        let fetched = fetch_with_retries(&rpc, &fetch_config(3), &sighting()).await;
        assert!(fetched.is_none());
        assert_eq!(rpc.calls(), 1);
    }

    fn context(
        rpc: Arc<ScriptedRpc>,
        store: Arc<MemoryStore>,
    ) -> (WorkerContext, mpsc::Receiver<DispatcherCommand>) {
        let (command_tx, command_rx) = mpsc::channel(8);
        let ctx = WorkerContext {
            config: Arc::new(TrackerConfig::default()),
            rpc,
            store,
            dispatcher: crate::dispatcher::DispatcherHandle { command_tx },
        };
        (ctx, command_rx)
    }

    #[tokio::test]
    async fn fetched_transactions_are_recorded_and_dispatched() {
        let rpc = Arc::new(ScriptedRpc::new(vec![Ok(fetched_transaction(&[
            "Program JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4 invoke [1]",
        ]))]));
        let store = Arc::new(MemoryStore::new(16));
        let (ctx, mut command_rx) = context(rpc, store.clone());

        TransactionFetcher::process(ctx, sighting()).await;

        assert_eq!(store.count().await.unwrap(), 1);
        assert!(matches!(
            command_rx.try_recv(),
            Ok(DispatcherCommand::Dispatch(_))
        ));
    }

    #[tokio::test]
    async fn slippage_failures_are_dropped_before_recording() {
        let rpc = Arc::new(ScriptedRpc::new(vec![Ok(fetched_transaction(&[
            "Program 6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P invoke [1]",
            "Program log: Slippage tolerance exceeded.",
        ]))]));
        let store = Arc::new(MemoryStore::new(16));
        let (ctx, mut command_rx) = context(rpc, store.clone());

        TransactionFetcher::process(ctx, sighting()).await;

        assert_eq!(store.count().await.unwrap(), 0);
        assert!(command_rx.try_recv().is_err());
    }
}
