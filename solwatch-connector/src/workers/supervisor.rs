use crate::{
    config::WalletTarget,
    events::SignatureSighting,
    workers::{
        backoff::Backoff,
        session::{self, SessionEnd, StreamingSession},
        WorkerContext,
    },
};
use anyhow::Result;
use async_trait::async_trait;
use solana_client::{
    nonblocking::pubsub_client::PubsubClient,
    rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter},
    rpc_response::{Response, RpcLogsResponse},
};
use solana_sdk::{commitment_config::CommitmentConfig, signature::Signature};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

/// Owns the log subscription of one wallet.
///
/// The supervisor keeps exactly one live subscription per wallet: it connects,
/// subscribes to logs mentioning the wallet address, and streams notifications
/// until the connection drops. Connection loss is never fatal; the session
/// driver reconnects after a backoff delay, indefinitely.
pub struct WalletSupervisor {
    ctx: WorkerContext,
    wallet: WalletTarget,
    sighting_tx: mpsc::Sender<SignatureSighting>,
}

impl WalletSupervisor {
    pub(crate) fn new(
        ctx: WorkerContext,
        wallet: WalletTarget,
        sighting_tx: mpsc::Sender<SignatureSighting>,
    ) -> Self {
        Self {
            ctx,
            wallet,
            sighting_tx,
        }
    }

    pub async fn run(self) -> Result<()> {
        let reconnect = self.ctx.config.reconnect.clone();
        let shutdown = self.ctx.dispatcher.clone();
        session::drive(self, reconnect, shutdown).await
    }

    async fn handle_log_message(&self, msg: Response<RpcLogsResponse>) {
        let Response { context, value } = msg;

        let signature: Signature = match value.signature.parse() {
            Ok(signature) => signature,
            Err(e) => {
                tracing::warn!(
                    wallet = %self.wallet.name,
                    raw = %value.signature,
                    "Ignoring notification with unparseable signature: {e}"
                );
                return;
            }
        };

        tracing::info!(
            wallet = %self.wallet.name,
            signature = %signature,
            slot = context.slot,
            "Transaction seen in wallet logs"
        );

        let sighting = SignatureSighting {
            wallet: self.wallet.clone(),
            signature,
        };
        if self.sighting_tx.send(sighting).await.is_err() {
            tracing::warn!("Finalization watcher is down; dropping sighting");
        }
    }
}

#[async_trait]
impl StreamingSession for WalletSupervisor {
    fn name(&self) -> String {
        format!("wallet {} logs", self.wallet.name)
    }

    /// Runs one connection's worth of log notifications.
    async fn serve(&mut self, backoff: &mut Backoff) -> Result<SessionEnd> {
        let client = PubsubClient::new(&self.ctx.config.solana.ws_url).await?;
        let (mut stream, _) = client
            .logs_subscribe(
                RpcTransactionLogsFilter::Mentions(vec![self.wallet.address.to_string()]),
                RpcTransactionLogsConfig {
                    commitment: Some(CommitmentConfig {
                        commitment: self.ctx.config.solana.commitment,
                    }),
                },
            )
            .await?;
        backoff.reset();

        tracing::info!(
            wallet = %self.wallet.name,
            address = %self.wallet.address,
            "Subscribed to wallet logs"
        );

        loop {
            tokio::select! {
                msg = stream.next() => {
                    match msg {
                        Some(msg) => self.handle_log_message(msg).await,
                        None => return Ok(SessionEnd::Disconnected),
                    }
                },
                _ = self.ctx.dispatcher.command_tx.closed() => {
                    return Ok(SessionEnd::Shutdown);
                },
            }
        }
    }
}
