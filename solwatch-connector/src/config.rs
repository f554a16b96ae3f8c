#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use solana_sdk::{commitment_config::CommitmentLevel, pubkey::Pubkey};

/// The top-level configuration for the `solwatch-connector` library.
///
/// This struct aggregates all necessary settings: Solana network endpoints,
/// per-stage tuning, and the set of wallets to track. It is typically
/// deserialized from a configuration file and passed to the `Tracker` upon
/// initialization.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct TrackerConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub solana: Solana,
    #[cfg_attr(feature = "serde", serde(default))]
    pub reconnect: Reconnect,
    #[cfg_attr(feature = "serde", serde(default))]
    pub fetcher: Fetcher,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dedup: Dedup,
    #[cfg_attr(feature = "serde", serde(default))]
    pub store: Store,
    #[cfg_attr(feature = "serde", serde(default))]
    pub channels: ChannelConfig,
    #[cfg_attr(feature = "serde", serde(default))]
    pub wallets: Vec<WalletTarget>,
}

/// A wallet under observation: a display name and its ledger address.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct WalletTarget {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(with = "serde_pubkey"))]
    pub address: Pubkey,
}

/// Defines the connection settings for the Solana cluster.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Solana {
    pub rpc_url: String,
    pub ws_url: String,
    #[cfg_attr(feature = "serde", serde(with = "serde_commitment"))]
    pub commitment: CommitmentLevel,
}

/// Defines the reconnect policy for streaming connections.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Reconnect {
    /// Delay before the first reconnect attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling for the doubling reconnect delay, in milliseconds.
    pub max_delay_ms: u64,
}

/// Defines retry behavior for transaction lookups.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Fetcher {
    /// How many times an empty lookup result is retried before the signature
    /// is dropped.
    pub retries: u32,
    /// Delay between retry attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

/// Defines duplicate suppression for dispatched transactions.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Dedup {
    /// How many recently dispatched signatures are remembered.
    pub seen_capacity: usize,
}

/// Defines bounds for the in-memory transaction record.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct Store {
    /// Maximum number of records kept; the oldest is evicted past this.
    pub capacity: usize,
}

/// Defines capacities for various MPSC channels within the connector.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct ChannelConfig {
    /// The buffer capacity for sightings flowing from the wallet supervisors
    /// to the finalization watcher.
    pub sighting_buffer: usize,
    /// The buffer capacity for finalized sightings awaiting fetch.
    pub fetch_buffer: usize,
    /// The buffer capacity for the command channel to the Dispatcher.
    pub dispatcher_command_buffer: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            solana: Solana::default(),
            reconnect: Reconnect::default(),
            fetcher: Fetcher::default(),
            dedup: Dedup::default(),
            store: Store::default(),
            channels: ChannelConfig::default(),
            wallets: Vec::new(),
        }
    }
}

impl Default for Solana {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: "wss://api.mainnet-beta.solana.com".to_string(),
            commitment: CommitmentLevel::Confirmed,
        }
    }
}

impl Default for Reconnect {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay_ms: 200,
        }
    }
}

impl Default for Dedup {
    fn default() -> Self {
        Self {
            seen_capacity: 4096,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            sighting_buffer: 256,
            fetch_buffer: 256,
            dispatcher_command_buffer: 128,
        }
    }
}

#[cfg(feature = "serde")]
mod serde_commitment {

    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(c: &CommitmentLevel, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = match c {
            CommitmentLevel::Processed => "Processed",
            CommitmentLevel::Confirmed => "Confirmed",
            CommitmentLevel::Finalized => "Finalized",
        };
        serializer.serialize_str(s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<CommitmentLevel, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        let level = match s.to_lowercase().as_str() {
            "processed" => CommitmentLevel::Processed,
            "confirmed" => CommitmentLevel::Confirmed,
            "finalized" => CommitmentLevel::Finalized,
            _ => CommitmentLevel::Confirmed,
        };
        Ok(level)
    }
}

#[cfg(feature = "serde")]
mod serde_pubkey {

    use super::*;
    use serde::{Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&pubkey.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Pubkey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}
