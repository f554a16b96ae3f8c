//! A core Rust library for tracking wallet activity on Solana.
//!
//! This crate provides the building blocks for a transaction tracking
//! service. It subscribes to log notifications for a configured set of
//! wallets, waits for every sighted transaction to reach finality, fetches
//! the full transaction record, attributes it to the protocol that produced
//! it, and routes it to protocol-specific decoders.
//!
//! # Key Components
//!
//! *   [`workers::Tracker`]: The main entry point. It owns and runs the
//!     background workers: one log subscription per wallet, a multiplexed
//!     finalization watcher, the transaction fetcher, and the dispatcher.
//! *   [`decoders::ProtocolDecoders`]: The seam between the pipeline and the
//!     protocol-specific interpretation of categorized transactions.
//! *   [`storage::TransactionStore`]: A bounded record of the transactions
//!     processed during the session.

/// Defines configuration structures for the connector.
pub mod config;
/// The contracts implemented by protocol-specific decoders.
pub mod decoders;
/// The internal record routing worker (`Dispatcher`).
mod dispatcher;
/// Transaction categorization, balance deltas, and pipeline event types.
pub mod events;
/// A trait abstracting the transaction-fetch side of the RPC client.
pub mod rpc;
/// A trait and default implementation for recording processed transactions.
pub mod storage;
/// The background workers that make up the tracking pipeline.
pub mod workers;
