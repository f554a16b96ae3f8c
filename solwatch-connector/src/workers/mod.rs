//! # Tracker & Background Workers
//!
//! This module defines the `Tracker`, which orchestrates all the background
//! services required to follow wallet activity from log sighting to decoded
//! transaction.
//!
//! ## Core Components
//!
//! - [`Tracker`]: The main struct that owns and runs the background workers.
//!   It is consumed when its `run` method is called.
//! - [`TrackerHandle`]: A clonable, thread-safe handle used to shut the
//!   running services down.
//! - **Workers**:
//!   - `WalletSupervisor`: One per wallet; owns its log subscription and
//!     reconnects forever.
//!   - `FinalizationWatcher`: Multiplexes all signature watches over one
//!     connection and forwards finalized sightings.
//!   - `TransactionFetcher`: Fetches full transactions with bounded retries,
//!     filters, categorizes, and records them.
//!   - `Dispatcher`: Deduplicates and routes records to the protocol
//!     decoders.

mod backoff;
mod fetcher;
mod session;
mod supervisor;
mod watcher;

use crate::{
    config::TrackerConfig,
    decoders::ProtocolDecoders,
    dispatcher::{Dispatcher, DispatcherHandle},
    rpc::TransactionRpc,
    storage::TransactionStore,
    workers::{
        fetcher::TransactionFetcher, supervisor::WalletSupervisor, watcher::FinalizationWatcher,
    },
};
use futures::future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A shared context containing all dependencies required by the workers.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub config: Arc<TrackerConfig>,
    pub rpc: Arc<dyn TransactionRpc>,
    pub store: Arc<dyn TransactionStore>,
    pub dispatcher: DispatcherHandle,
}

/// A clonable, thread-safe handle for interacting with a running [`Tracker`].
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    dispatcher: DispatcherHandle,
}

impl TrackerHandle {
    /// Sends a shutdown signal to the tracker's background services.
    ///
    /// The dispatcher exits on the command; every other worker observes the
    /// closed command channel and terminates its own loop.
    pub async fn stop(&self) {
        self.dispatcher.stop().await;
    }
}

/// The main background service manager for the tracking pipeline.
///
/// This struct owns one `WalletSupervisor` per configured wallet plus the
/// `FinalizationWatcher`, `TransactionFetcher`, and `Dispatcher` workers. It
/// is created once, its [`run()`](Tracker::run) method is spawned as a
/// background task, and it is then consumed, leaving the [`TrackerHandle`] as
/// the only way to interact with the running services.
pub struct Tracker {
    supervisors: Vec<WalletSupervisor>,
    watcher: FinalizationWatcher,
    fetcher: TransactionFetcher,
    dispatcher: Dispatcher,
}

impl Tracker {
    /// Creates a new `Tracker` and its associated [`TrackerHandle`].
    ///
    /// This method wires the communication channels between the internal
    /// workers but does not start them; the returned `Tracker` must be
    /// started by calling [`run()`](Tracker::run).
    ///
    /// # Arguments
    ///
    /// * `config` - The shared tracker configuration, including the wallets.
    /// * `rpc` - The client used to fetch finalized transactions.
    /// * `store` - The session record for processed transactions.
    /// * `decoders` - The protocol-specific decoder implementations.
    pub fn new(
        config: Arc<TrackerConfig>,
        rpc: Arc<dyn TransactionRpc>,
        store: Arc<dyn TransactionStore>,
        decoders: Arc<dyn ProtocolDecoders>,
    ) -> (Self, TrackerHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.channels.dispatcher_command_buffer);
        let (dispatcher, dispatcher_handle) =
            Dispatcher::new(config.clone(), decoders, command_tx, command_rx);

        let ctx = WorkerContext {
            config: config.clone(),
            rpc,
            store,
            dispatcher: dispatcher_handle.clone(),
        };

        let (sighting_tx, sighting_rx) = mpsc::channel(config.channels.sighting_buffer);
        let (fetch_tx, fetch_rx) = mpsc::channel(config.channels.fetch_buffer);

        let supervisors = config
            .wallets
            .iter()
            .cloned()
            .map(|wallet| WalletSupervisor::new(ctx.clone(), wallet, sighting_tx.clone()))
            .collect();
        // The supervisors hold the only senders; the watcher sees a closed
        // channel once they have all exited.
        drop(sighting_tx);

        let watcher = FinalizationWatcher::new(ctx.clone(), sighting_rx, fetch_tx);
        let fetcher = TransactionFetcher::new(ctx, fetch_rx);

        let runner = Self {
            supervisors,
            watcher,
            fetcher,
            dispatcher,
        };
        let handle = TrackerHandle {
            dispatcher: dispatcher_handle,
        };

        (runner, handle)
    }

    /// Runs all background services of the tracker.
    ///
    /// This method consumes the `Tracker` and should be spawned as a single,
    /// long-running background task. It will run until a shutdown is
    /// initiated via [`TrackerHandle::stop()`].
    pub async fn run(self) {
        tracing::info!(
            wallets = self.supervisors.len(),
            "Tracker is running all background services."
        );

        let supervisors =
            future::join_all(self.supervisors.into_iter().map(WalletSupervisor::run));

        tokio::select! {
            results = supervisors => {
                for res in results {
                    if let Err(e) = res { tracing::error!("Wallet supervisor exited with an error: {}", e); }
                }
                tracing::info!("Wallet supervisors have shut down.");
            },
            res = self.watcher.run() => {
                if let Err(e) = res { tracing::error!("Finalization watcher exited with an error: {}", e); }
                else { tracing::info!("Finalization watcher has shut down."); }
            },
            res = self.fetcher.run() => {
                if let Err(e) = res { tracing::error!("Transaction fetcher exited with an error: {}", e); }
                else { tracing::info!("Transaction fetcher has shut down."); }
            },
            res = self.dispatcher.run() => {
                if let Err(e) = res { tracing::error!("Dispatcher exited with an error: {}", e); }
                tracing::info!("Dispatcher has shut down.");
            }
        }
    }
}
