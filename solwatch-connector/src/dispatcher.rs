//! # Record Dispatcher
//!
//! The `Dispatcher` is a background worker that routes categorized
//! transactions to the protocol decoders.
//!
//! ## Purpose
//! It consumes the single stream of records produced by the fetcher, drops
//! signatures it has already routed, and invokes the decoder hook matching
//! each record's category. Keeping routing in one task means the duplicate
//! window is process-wide: the same transaction sighted through several
//! wallets, or replayed by a resubscribed stream, is decoded once.
use crate::{
    config::TrackerConfig,
    decoders::ProtocolDecoders,
    events::{Category, TransactionRecord},
};
use solana_sdk::signature::Signature;
use solana_transaction_status::{UiInnerInstructions, UiInstruction};
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};
use tokio::sync::mpsc;

/// Pump.fun inner instructions shorter than this carry bookkeeping
/// (account creation, fee transfers), not trade data.
const PUMPFUN_MIN_EVENT_DATA_LEN: usize = 150;

/// Defines commands that can be sent to the Dispatcher task.
#[derive(Debug)]
pub enum DispatcherCommand {
    Dispatch(TransactionRecord),
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct DispatcherHandle {
    pub command_tx: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    pub async fn dispatch(&self, record: TransactionRecord) {
        if self
            .command_tx
            .send(DispatcherCommand::Dispatch(record))
            .await
            .is_err()
        {
            tracing::warn!("Failed to dispatch record: dispatcher may be down");
        }
    }

    pub async fn stop(&self) {
        if self
            .command_tx
            .send(DispatcherCommand::Shutdown)
            .await
            .is_err()
        {
            tracing::warn!("Failed to send shutdown to dispatcher: it may already be down");
        }
    }
}

/// A bounded, insertion-ordered set of already routed signatures.
struct SeenSignatures {
    set: HashSet<Signature>,
    order: VecDeque<Signature>,
    capacity: usize,
}

impl SeenSignatures {
    fn new(capacity: usize) -> Self {
        Self {
            set: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Records a signature. Returns `false` if it was already present.
    fn insert(&mut self, signature: Signature) -> bool {
        if !self.set.insert(signature) {
            return false;
        }
        self.order.push_back(signature);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }
}

/// A background worker that routes records to the protocol decoders.
pub struct Dispatcher {
    command_rx: mpsc::Receiver<DispatcherCommand>,
    seen: SeenSignatures,
    decoders: Arc<dyn ProtocolDecoders>,
}

impl Dispatcher {
    /// Creates a new `Dispatcher`.
    pub fn new(
        config: Arc<TrackerConfig>,
        decoders: Arc<dyn ProtocolDecoders>,
        command_tx: mpsc::Sender<DispatcherCommand>,
        command_rx: mpsc::Receiver<DispatcherCommand>,
    ) -> (Self, DispatcherHandle) {
        let dispatcher = Self {
            command_rx,
            seen: SeenSignatures::new(config.dedup.seen_capacity),
            decoders,
        };
        let handle = DispatcherHandle { command_tx };
        (dispatcher, handle)
    }

    /// Runs the main loop for the dispatcher.
    pub async fn run(mut self) -> anyhow::Result<()> {
        tracing::info!("Dispatcher started. Waiting for records and commands...");
        while let Some(command) = self.command_rx.recv().await {
            match command {
                DispatcherCommand::Dispatch(record) => self.handle_record(record).await,
                DispatcherCommand::Shutdown => {
                    tracing::info!("Received shutdown command. Exiting.");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Routes one record to the decoder hook for its category.
    async fn handle_record(&mut self, record: TransactionRecord) {
        if !self.seen.insert(record.signature) {
            tracing::debug!(
                signature = %record.signature,
                "Skipping already routed transaction"
            );
            return;
        }

        match record.category {
            Category::PumpFun => self.route_pumpfun(&record).await,
            Category::Raydium => self.route_raydium(&record).await,
            Category::Jupiter => self.route_jupiter(&record).await,
            Category::Unknown => {
                tracing::debug!(
                    signature = %record.signature,
                    wallet = %record.wallet.name,
                    "No decoder for uncategorized transaction"
                );
            }
        }
    }

    async fn route_pumpfun(&self, record: &TransactionRecord) {
        for data in qualifying_instruction_payloads(&record.inner_instructions) {
            let rendered = self.decoders.decode_pumpfun(data).await;
            tracing::info!(
                signature = %record.signature,
                wallet = %record.wallet.name,
                "{rendered}"
            );
        }
    }

    async fn route_raydium(&self, record: &TransactionRecord) {
        let deltas = record.balance_deltas();
        self.decoders
            .classify_raydium(&record.signature, &deltas)
            .await;
    }

    async fn route_jupiter(&self, record: &TransactionRecord) {
        if let Some(rendered) = self.decoders.decode_jupiter(&record.signature).await {
            tracing::info!(
                signature = %record.signature,
                wallet = %record.wallet.name,
                "{rendered}"
            );
        }
    }
}

/// Inner-instruction payloads large enough to carry a Pump.fun trade event.
fn qualifying_instruction_payloads(inner: &[UiInnerInstructions]) -> impl Iterator<Item = &str> {
    inner
        .iter()
        .flat_map(|set| set.instructions.iter())
        .filter_map(|instruction| match instruction {
            UiInstruction::Compiled(compiled)
                if compiled.data.len() >= PUMPFUN_MIN_EVENT_DATA_LEN =>
            {
                Some(compiled.data.as_str())
            }
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalletTarget;
    use crate::events::{
        RawTransaction, TokenBalanceDelta, JUPITER_PROGRAM_ID, PUMPFUN_PROGRAM_ID,
        RAYDIUM_AMM_PROGRAM_ID,
    };
    use async_trait::async_trait;
    use solana_sdk::pubkey::Pubkey;
    use solana_transaction_status::UiCompiledInstruction;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingDecoders {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ProtocolDecoders for RecordingDecoders {
        async fn decode_pumpfun(&self, data: &str) -> String {
            self.calls.lock().await.push(format!("pumpfun:{}", data.len()));
            "decoded".to_string()
        }

        async fn classify_raydium(&self, _signature: &Signature, deltas: &[TokenBalanceDelta]) {
            self.calls.lock().await.push(format!("raydium:{}", deltas.len()));
        }

        async fn decode_jupiter(&self, _signature: &Signature) -> Option<String> {
            self.calls.lock().await.push("jupiter".to_string());
            None
        }
    }

    fn compiled(data_len: usize) -> UiInstruction {
        UiInstruction::Compiled(UiCompiledInstruction {
            program_id_index: 4,
            accounts: vec![0, 1, 2],
            data: "x".repeat(data_len),
            stack_height: Some(2),
        })
    }

    fn wallet() -> WalletTarget {
        WalletTarget {
            name: "test1".to_string(),
            address: Pubkey::new_unique(),
        }
    }

    fn record_with_logs(tag: u8, program_id: &str) -> TransactionRecord {
        let raw = RawTransaction {
            slot: 7,
            log_messages: vec![format!("Program {program_id} invoke [1]")],
            ..RawTransaction::default()
        };
        TransactionRecord::new(Signature::from([tag; 64]), wallet(), raw)
    }

    async fn run_dispatcher(
        decoders: Arc<RecordingDecoders>,
        records: Vec<TransactionRecord>,
    ) -> Vec<String> {
        let config = Arc::new(TrackerConfig::default());
        let (command_tx, command_rx) = mpsc::channel(16);
        let (dispatcher, handle) = Dispatcher::new(config, decoders.clone(), command_tx, command_rx);
        let task = tokio::spawn(dispatcher.run());

        for record in records {
            handle.dispatch(record).await;
        }
        handle.stop().await;
        task.await.unwrap().unwrap();

        decoders.calls.lock().await.clone()
    }

    #[test]
    fn seen_signatures_evict_oldest_first() {
        let mut seen = SeenSignatures::new(2);
        assert!(seen.insert(Signature::from([1u8; 64])));
        assert!(seen.insert(Signature::from([2u8; 64])));
        assert!(!seen.insert(Signature::from([1u8; 64])));

        // Third insert evicts the first signature, which then reads as new.
        assert!(seen.insert(Signature::from([3u8; 64])));
        assert!(seen.insert(Signature::from([1u8; 64])));
        assert!(!seen.insert(Signature::from([3u8; 64])));
    }

    #[test]
    fn only_large_payloads_qualify() {
        let inner = vec![UiInnerInstructions {
            index: 0,
            instructions: vec![
                compiled(PUMPFUN_MIN_EVENT_DATA_LEN - 1),
                compiled(PUMPFUN_MIN_EVENT_DATA_LEN),
                compiled(PUMPFUN_MIN_EVENT_DATA_LEN + 40),
            ],
        }];
        let payloads: Vec<&str> = qualifying_instruction_payloads(&inner).collect();
        assert_eq!(payloads.len(), 2);
        assert!(payloads.iter().all(|p| p.len() >= PUMPFUN_MIN_EVENT_DATA_LEN));
    }

    #[tokio::test]
    async fn pumpfun_records_decode_each_qualifying_instruction() {
        let decoders = Arc::new(RecordingDecoders::default());
        let mut record = record_with_logs(1, PUMPFUN_PROGRAM_ID);
        record.inner_instructions = vec![UiInnerInstructions {
            index: 0,
            instructions: vec![
                compiled(20),
                compiled(PUMPFUN_MIN_EVENT_DATA_LEN),
                compiled(PUMPFUN_MIN_EVENT_DATA_LEN + 10),
            ],
        }];

        let calls = run_dispatcher(decoders, vec![record]).await;
        assert_eq!(calls, vec!["pumpfun:150", "pumpfun:160"]);
    }

    #[tokio::test]
    async fn raydium_records_carry_balance_deltas() {
        let decoders = Arc::new(RecordingDecoders::default());
        let record = record_with_logs(2, RAYDIUM_AMM_PROGRAM_ID);

        let calls = run_dispatcher(decoders, vec![record]).await;
        assert_eq!(calls, vec!["raydium:0"]);
    }

    #[tokio::test]
    async fn jupiter_records_look_up_by_signature() {
        let decoders = Arc::new(RecordingDecoders::default());
        let record = record_with_logs(3, JUPITER_PROGRAM_ID);

        let calls = run_dispatcher(decoders, vec![record]).await;
        assert_eq!(calls, vec!["jupiter"]);
    }

    #[tokio::test]
    async fn unknown_records_reach_no_decoder() {
        let decoders = Arc::new(RecordingDecoders::default());
        let record = record_with_logs(4, "11111111111111111111111111111111");

        let calls = run_dispatcher(decoders, vec![record]).await;
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn duplicate_signatures_are_routed_once() {
        let decoders = Arc::new(RecordingDecoders::default());
        let record = record_with_logs(5, JUPITER_PROGRAM_ID);

        let calls = run_dispatcher(decoders, vec![record.clone(), record]).await;
        assert_eq!(calls, vec!["jupiter"]);
    }
}
