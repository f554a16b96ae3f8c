//! Reference decoder implementations that render to the log stream.
//!
//! Real deployments wire their own [`ProtocolDecoders`] implementation into
//! the tracker; this one only formats what the pipeline hands it, which is
//! enough to observe the categorized flow end to end.

use async_trait::async_trait;
use solana_sdk::signature::Signature;
use solwatch_connector::decoders::ProtocolDecoders;
use solwatch_connector::events::TokenBalanceDelta;

pub struct LoggingDecoders;

#[async_trait]
impl ProtocolDecoders for LoggingDecoders {
    async fn decode_pumpfun(&self, data: &str) -> String {
        format!("pump.fun trade event payload ({} characters)", data.len())
    }

    async fn classify_raydium(&self, signature: &Signature, deltas: &[TokenBalanceDelta]) {
        if deltas.is_empty() {
            tracing::info!(signature = %signature, "raydium swap with no token balance changes");
            return;
        }
        let summary = deltas
            .iter()
            .map(|delta| match &delta.owner {
                Some(owner) => format!("{} {:+} (owner {owner})", delta.mint, delta.delta),
                None => format!("{} {:+}", delta.mint, delta.delta),
            })
            .collect::<Vec<_>>()
            .join(", ");
        tracing::info!(signature = %signature, "raydium swap: {summary}");
    }

    async fn decode_jupiter(&self, signature: &Signature) -> Option<String> {
        Some(format!("jupiter swap routed for {signature}"))
    }
}
