//! Defines a generic RPC client trait to abstract the transaction-fetch endpoint.

use async_trait::async_trait;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcTransactionConfig,
};
use solana_sdk::signature::Signature;
use solana_transaction_status::{EncodedConfirmedTransactionWithStatusMeta, UiTransactionEncoding};
use thiserror::Error;

/// Why a transaction fetch produced no record.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The node answered with an empty result: the transaction is not yet
    /// served at the queried commitment. Worth retrying shortly after.
    #[error("transaction not yet available")]
    NotAvailable,
    /// Any other RPC failure. Terminal for the signature.
    #[error(transparent)]
    Rpc(#[from] ClientError),
}

/// A generic trait for the transaction-fetch side of a Solana RPC client.
///
/// This abstracts over the concrete client implementation, allowing the fetch
/// pipeline to be exercised against a scripted client in tests.
#[async_trait]
pub trait TransactionRpc: Send + Sync {
    /// Fetches a transaction with JSON encoding and version-0 support.
    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<EncodedConfirmedTransactionWithStatusMeta, FetchError>;
}

#[async_trait]
impl TransactionRpc for RpcClient {
    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<EncodedConfirmedTransactionWithStatusMeta, FetchError> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: None,
            max_supported_transaction_version: Some(0),
        };
        match self.get_transaction_with_config(signature, config).await {
            Ok(tx) => Ok(tx),
            Err(err) if is_empty_result(&err) => Err(FetchError::NotAvailable),
            Err(err) => Err(FetchError::Rpc(err)),
        }
    }
}

/// A lookup of a transaction the node does not serve answers `result: null`,
/// which the client surfaces as a decode failure rather than an RPC error.
fn is_empty_result(err: &ClientError) -> bool {
    matches!(err.kind, ClientErrorKind::SerdeJson(_))
}
