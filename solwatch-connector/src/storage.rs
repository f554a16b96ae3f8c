use crate::events::TransactionRecord;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// A trait defining the session record of processed transactions.
/// This allows alternative backends without touching the pipeline.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Appends a categorized transaction to the record.
    async fn append(&self, record: TransactionRecord) -> Result<()>;

    /// The number of records currently held.
    async fn count(&self) -> Result<usize>;
}

/// A bounded, in-memory transaction record.
///
/// Records are kept in arrival order; once the capacity is reached the oldest
/// record is evicted for each new one.
pub struct MemoryStore {
    records: RwLock<VecDeque<TransactionRecord>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    /// A snapshot of the stored records, oldest first.
    pub async fn records(&self) -> Vec<TransactionRecord> {
        self.records.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn append(&self, record: TransactionRecord) -> Result<()> {
        let mut records = self.records.write().await;
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WalletTarget;
    use crate::events::{Category, TransactionRecord};
    use solana_sdk::{pubkey::Pubkey, signature::Signature};

    fn record(tag: u8) -> TransactionRecord {
        TransactionRecord {
            signature: Signature::from([tag; 64]),
            wallet: WalletTarget {
                name: format!("wallet-{tag}"),
                address: Pubkey::new_unique(),
            },
            slot: u64::from(tag),
            category: Category::Unknown,
            log_messages: Vec::new(),
            pre_token_balances: Vec::new(),
            post_token_balances: Vec::new(),
            inner_instructions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn append_grows_until_capacity() {
        let store = MemoryStore::new(8);
        store.append(record(1)).await.unwrap();
        store.append(record(2)).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn eviction_drops_oldest_first() {
        let store = MemoryStore::new(2);
        for tag in 1..=3 {
            store.append(record(tag)).await.unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 2);
        let records = store.records().await;
        assert_eq!(records[0].signature, Signature::from([2u8; 64]));
        assert_eq!(records[1].signature, Signature::from([3u8; 64]));
    }
}
