//! The seam between the tracking pipeline and protocol-specific decoding.

use crate::events::TokenBalanceDelta;
use async_trait::async_trait;
use solana_sdk::signature::Signature;

/// Protocol-specific interpreters for categorized transactions.
///
/// The pipeline owns detection and routing; implementations own the byte- and
/// market-level interpretation. An implementation is expected to be cheap to
/// call: the dispatcher awaits it inline for every routed transaction.
#[async_trait]
pub trait ProtocolDecoders: Send + Sync {
    /// Called once per qualifying Pump.fun inner instruction with its opaque
    /// payload, exactly as it appeared on the wire. Returns a human-readable
    /// rendering of the instruction.
    async fn decode_pumpfun(&self, data: &str) -> String;

    /// Called once per Raydium transaction with the net token balance changes
    /// it caused.
    async fn classify_raydium(&self, signature: &Signature, deltas: &[TokenBalanceDelta]);

    /// Called once per Jupiter transaction. The implementation performs its
    /// own lookup from the signature and returns a rendering when it has one.
    async fn decode_jupiter(&self, signature: &Signature) -> Option<String>;
}
