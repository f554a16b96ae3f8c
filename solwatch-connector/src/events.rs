use crate::config::WalletTarget;
use anyhow::Result;
use solana_account_decoder::parse_token::UiTokenAmount;
use solana_sdk::signature::Signature;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, UiInnerInstructions, UiTransactionTokenBalance,
};
use std::fmt;

/// Jupiter v6 aggregator program.
pub const JUPITER_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";
/// Raydium AMM v4 program.
pub const RAYDIUM_AMM_PROGRAM_ID: &str = "675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8";
/// Pump.fun bonding curve program.
pub const PUMPFUN_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// Log marker emitted by swap programs when slippage protection aborts a trade.
pub const SLIPPAGE_EXCEEDED_MARKER: &str = "Slippage tolerance exceeded";

/// The protocol a transaction is attributed to, by the program it invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Jupiter,
    Raydium,
    PumpFun,
    Unknown,
}

impl Category {
    /// Attributes a transaction to a protocol from its log messages.
    ///
    /// The priority order is fixed: Jupiter, then Raydium, then Pump.fun.
    /// A Raydium swap routed through Jupiter is therefore attributed to
    /// Jupiter, the outermost router.
    pub fn from_logs<S: AsRef<str>>(logs: &[S]) -> Self {
        let mentions = |id: &str| logs.iter().any(|line| line.as_ref().contains(id));
        if mentions(JUPITER_PROGRAM_ID) {
            Category::Jupiter
        } else if mentions(RAYDIUM_AMM_PROGRAM_ID) {
            Category::Raydium
        } else if mentions(PUMPFUN_PROGRAM_ID) {
            Category::PumpFun
        } else {
            Category::Unknown
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Jupiter => "jupiter",
            Category::Raydium => "raydium",
            Category::PumpFun => "pumpfun",
            Category::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A transaction signature seen in a wallet's log notifications, paired with
/// the wallet that produced it.
#[derive(Debug, Clone)]
pub struct SignatureSighting {
    pub wallet: WalletTarget,
    pub signature: Signature,
}

/// The parts of a fetched transaction the pipeline reads.
#[derive(Debug, Clone, Default)]
pub struct RawTransaction {
    pub slot: u64,
    pub log_messages: Vec<String>,
    pub pre_token_balances: Vec<UiTransactionTokenBalance>,
    pub post_token_balances: Vec<UiTransactionTokenBalance>,
    pub inner_instructions: Vec<UiInnerInstructions>,
}

impl RawTransaction {
    /// Whether the swap was aborted by the program's slippage protection.
    /// Such transactions carry no trade worth decoding.
    pub fn slippage_exceeded(&self) -> bool {
        self.log_messages
            .iter()
            .any(|line| line.contains(SLIPPAGE_EXCEEDED_MARKER))
    }
}

impl TryFrom<EncodedConfirmedTransactionWithStatusMeta> for RawTransaction {
    type Error = anyhow::Error;

    fn try_from(tx: EncodedConfirmedTransactionWithStatusMeta) -> Result<Self> {
        let meta = tx
            .transaction
            .meta
            .ok_or_else(|| anyhow::anyhow!("transaction has no status metadata"))?;

        let log_messages: Option<Vec<String>> = meta.log_messages.into();
        let pre_token_balances: Option<Vec<UiTransactionTokenBalance>> =
            meta.pre_token_balances.into();
        let post_token_balances: Option<Vec<UiTransactionTokenBalance>> =
            meta.post_token_balances.into();
        let inner_instructions: Option<Vec<UiInnerInstructions>> = meta.inner_instructions.into();

        Ok(Self {
            slot: tx.slot,
            log_messages: log_messages.unwrap_or_default(),
            pre_token_balances: pre_token_balances.unwrap_or_default(),
            post_token_balances: post_token_balances.unwrap_or_default(),
            inner_instructions: inner_instructions.unwrap_or_default(),
        })
    }
}

/// A finalized, categorized transaction as recorded by the pipeline.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub signature: Signature,
    pub wallet: WalletTarget,
    pub slot: u64,
    pub category: Category,
    pub log_messages: Vec<String>,
    pub pre_token_balances: Vec<UiTransactionTokenBalance>,
    pub post_token_balances: Vec<UiTransactionTokenBalance>,
    pub inner_instructions: Vec<UiInnerInstructions>,
}

impl TransactionRecord {
    /// Builds a record from a fetched transaction, attributing it to a
    /// protocol from its log messages.
    pub fn new(signature: Signature, wallet: WalletTarget, raw: RawTransaction) -> Self {
        let category = Category::from_logs(&raw.log_messages);
        Self {
            signature,
            wallet,
            slot: raw.slot,
            category,
            log_messages: raw.log_messages,
            pre_token_balances: raw.pre_token_balances,
            post_token_balances: raw.post_token_balances,
            inner_instructions: raw.inner_instructions,
        }
    }

    /// Net per-token balance changes caused by this transaction.
    pub fn balance_deltas(&self) -> Vec<TokenBalanceDelta> {
        balance_deltas(&self.pre_token_balances, &self.post_token_balances)
    }
}

/// The net change of one token balance across a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalanceDelta {
    pub mint: String,
    pub owner: Option<String>,
    pub delta: f64,
}

/// Computes net token balance changes between the pre- and post-transaction
/// balance tables.
///
/// Post entries are matched to pre entries by `(mint, owner)`. An unmatched
/// post entry is a balance the transaction created and contributes its full
/// amount. Entries whose change is exactly zero are omitted, as are entries
/// whose amounts carry no parseable number.
pub fn balance_deltas(
    pre: &[UiTransactionTokenBalance],
    post: &[UiTransactionTokenBalance],
) -> Vec<TokenBalanceDelta> {
    post.iter()
        .filter_map(|post_balance| {
            let post_amount = parse_ui_amount(&post_balance.ui_token_amount)?;
            let owner: Option<String> = post_balance.owner.clone().into();
            let pre_amount = pre
                .iter()
                .find(|pre_balance| {
                    pre_balance.mint == post_balance.mint
                        && Option::<String>::from(pre_balance.owner.clone()) == owner
                })
                .and_then(|pre_balance| parse_ui_amount(&pre_balance.ui_token_amount));

            let delta = match pre_amount {
                Some(pre_amount) => post_amount - pre_amount,
                None => post_amount,
            };
            if delta == 0.0 {
                return None;
            }
            Some(TokenBalanceDelta {
                mint: post_balance.mint.clone(),
                owner,
                delta,
            })
        })
        .collect()
}

/// Reads a numeric amount from a token balance, preferring the lossless
/// string form over the pre-rounded float.
fn parse_ui_amount(amount: &UiTokenAmount) -> Option<f64> {
    if let Ok(value) = amount.ui_amount_string.parse::<f64>() {
        return Some(value);
    }
    amount.ui_amount
}
