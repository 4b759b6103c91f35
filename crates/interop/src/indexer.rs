//! Continuous indexing of cross-domain messages across every L2 chain.

use crate::{
    MessageIndex, SubscriptionError,
    source::{LogSource, LogStream},
};
use alloy_rpc_types_eth::Log;
use futures::StreamExt;
use omnisim_types::{CrossDomainMessage, MessageKey};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const RESUBSCRIBE_ATTEMPTS: u32 = 3;
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_millis(500);

/// Maintains an always-up-to-date, duplicate-free record of every
/// cross-domain message emitted on every L2 chain, from the moment indexing
/// starts.
///
/// One subscription task runs per source chain. A dropped subscription is
/// re-established automatically; the blocks missed while it was down are
/// replayed through the range query, relying on the index's idempotent
/// insert to absorb redelivery. A chain whose subscription cannot be
/// re-established is marked unhealthy and surfaces its failure at stop.
#[derive(Debug)]
pub struct CrossDomainMessageIndexer {
    index: Arc<MessageIndex>,
    cancel: CancellationToken,
    started: AtomicBool,

    tasks: tokio::sync::Mutex<JoinSet<Result<(), SubscriptionError>>>,
    running_chains: Arc<Mutex<HashSet<u64>>>,
    unhealthy_chains: Arc<Mutex<HashSet<u64>>>,
}

impl CrossDomainMessageIndexer {
    /// Creates an indexer wired to the given cancellation scope.
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            index: Arc::new(MessageIndex::new()),
            cancel,
            started: AtomicBool::new(false),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
            running_chains: Arc::new(Mutex::new(HashSet::new())),
            unhealthy_chains: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Shared handle to the message index.
    pub fn index(&self) -> Arc<MessageIndex> {
        Arc::clone(&self.index)
    }

    /// Messages destined for `dest_chain_id` that have not been relayed yet,
    /// in discovery order.
    pub async fn pending_for(&self, dest_chain_id: u64) -> Vec<CrossDomainMessage> {
        self.index.pending_for(dest_chain_id).await
    }

    /// Looks up a message by identity key.
    pub async fn get(&self, key: MessageKey) -> Option<CrossDomainMessage> {
        self.index.get(key).await
    }

    /// Whether every subscription is currently healthy.
    pub fn healthy(&self) -> bool {
        self.unhealthy_chains.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Chains whose subscription could not be kept alive.
    pub fn unhealthy_chains(&self) -> Vec<u64> {
        let mut chains: Vec<u64> = self
            .unhealthy_chains
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect();
        chains.sort_unstable();
        chains
    }

    /// Opens a live subscription on every supplied source chain. All
    /// subscriptions are established before this returns; if any fails, the
    /// already-established ones are torn down and the whole call fails.
    pub async fn start(
        &self,
        sources: HashMap<u64, Arc<dyn LogSource>>,
    ) -> Result<(), IndexerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(IndexerError::AlreadyStarted);
        }
        if sources.is_empty() {
            return Err(IndexerError::NoSources);
        }

        let mut ordered: Vec<(u64, Arc<dyn LogSource>)> = sources.into_iter().collect();
        ordered.sort_by_key(|(chain_id, _)| *chain_id);

        let mut tasks = self.tasks.lock().await;
        for (chain_id, source) in ordered {
            let stream = match source.subscribe_messages().await {
                Ok(stream) => stream,
                Err(err) => {
                    error!(target: "omnisim::indexer", chain_id, %err, "failed to establish subscription, tearing down");
                    self.cancel.cancel();
                    while tasks.join_next().await.is_some() {}
                    return Err(err.into());
                }
            };

            info!(target: "omnisim::indexer", chain_id, "subscription established");
            self.running_chains.lock().unwrap_or_else(|e| e.into_inner()).insert(chain_id);

            let index = Arc::clone(&self.index);
            let cancel = self.cancel.clone();
            let running = Arc::clone(&self.running_chains);
            let unhealthy = Arc::clone(&self.unhealthy_chains);
            tasks.spawn(async move {
                let result = run_subscription(source, stream, &index, &cancel, &unhealthy).await;
                running.lock().unwrap_or_else(|e| e.into_inner()).remove(&chain_id);
                result
            });
        }

        Ok(())
    }

    /// Cancels every subscription and waits for the tasks to exit within
    /// `timeout`. Reports the chains that failed to close in time, and any
    /// subscription failure that occurred while running.
    pub async fn stop(&self, timeout: Duration) -> Result<(), IndexerError> {
        info!(target: "omnisim::indexer", "stopping indexer");
        self.cancel.cancel();

        let mut tasks = self.tasks.lock().await;
        let deadline = Instant::now() + timeout;
        let mut failures: Vec<String> = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, tasks.join_next()).await {
                Err(_) => {
                    let mut chains: Vec<u64> = self
                        .running_chains
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .iter()
                        .copied()
                        .collect();
                    chains.sort_unstable();
                    return Err(IndexerError::StopTimeout { chains });
                }
                Ok(None) => break,
                Ok(Some(Ok(Ok(())))) => {}
                Ok(Some(Ok(Err(err)))) => failures.push(err.to_string()),
                Ok(Some(Err(err))) => failures.push(format!("subscription task panicked: {err}")),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(IndexerError::SubscriptionsFailed { failures })
        }
    }
}

async fn run_subscription(
    source: Arc<dyn LogSource>,
    mut stream: LogStream,
    index: &MessageIndex,
    cancel: &CancellationToken,
    unhealthy: &Mutex<HashSet<u64>>,
) -> Result<(), SubscriptionError> {
    let chain_id = source.chain_id();
    let mut last_seen: Option<u64> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target: "omnisim::indexer", chain_id, "subscription cancelled");
                return Ok(());
            }
            maybe_log = stream.next() => match maybe_log {
                Some(log) => {
                    if let Some(number) = log.block_number {
                        last_seen = Some(last_seen.map_or(number, |prev| prev.max(number)));
                    }
                    handle_log(chain_id, index, &log).await;
                }
                None => {
                    warn!(target: "omnisim::indexer", chain_id, "event stream dropped, resubscribing");
                    match resubscribe(&*source, last_seen, index, cancel).await {
                        Ok(Some(new_stream)) => stream = new_stream,
                        Ok(None) => return Ok(()),
                        Err(err) => {
                            unhealthy.lock().unwrap_or_else(|e| e.into_inner()).insert(chain_id);
                            error!(target: "omnisim::indexer", chain_id, %err, "failed to re-establish subscription, chain is no longer indexed");
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}

/// Re-establishes a dropped subscription and replays the block range the
/// stream may have missed. Returns `Ok(None)` when cancelled mid-attempt.
async fn resubscribe(
    source: &dyn LogSource,
    last_seen: Option<u64>,
    index: &MessageIndex,
    cancel: &CancellationToken,
) -> Result<Option<LogStream>, SubscriptionError> {
    let chain_id = source.chain_id();

    for attempt in 1..=RESUBSCRIBE_ATTEMPTS {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        match source.subscribe_messages().await {
            Ok(stream) => {
                // Replay after resubscribing so no block falls between the
                // old stream and the new one. Redelivered events dedup in
                // the index.
                let to_block = source.latest_block().await?;
                let from_block = last_seen.map_or(0, |n| n.saturating_add(1));
                if from_block <= to_block {
                    let missed = source.messages_range(from_block, to_block).await?;
                    info!(
                        target: "omnisim::indexer",
                        chain_id, from_block, to_block, replayed = missed.len(),
                        "subscription re-established, replayed missed blocks"
                    );
                    for log in &missed {
                        handle_log(chain_id, index, log).await;
                    }
                }
                return Ok(Some(stream));
            }
            Err(err) => {
                warn!(target: "omnisim::indexer", chain_id, attempt, %err, "resubscription attempt failed");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(RESUBSCRIBE_BACKOFF) => {}
                }
            }
        }
    }

    Err(SubscriptionError::StreamClosed { chain_id })
}

async fn handle_log(chain_id: u64, index: &MessageIndex, log: &Log) {
    let message = match CrossDomainMessage::from_log(chain_id, log) {
        Ok(message) => message,
        Err(err) => {
            warn!(target: "omnisim::indexer", chain_id, %err, "skipping undecodable messenger log");
            return;
        }
    };

    let key = message.key();
    let dest_chain_id = message.dest_chain_id;
    if index.insert(message).await {
        info!(target: "omnisim::indexer", chain_id, %key, dest_chain_id, "indexed cross-domain message");
    } else {
        debug!(target: "omnisim::indexer", chain_id, %key, "duplicate event delivery, ignored");
    }
}

/// Errors from the indexer lifecycle.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Start was called twice.
    #[error("indexer already started")]
    AlreadyStarted,
    /// Start was called with no source chains.
    #[error("no source chains supplied")]
    NoSources,
    /// A subscription could not be established at start.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    /// Subscriptions did not wind down within the stop timeout.
    #[error("subscriptions for chains {chains:?} failed to close in time")]
    StopTimeout {
        /// The chains whose tasks were still running.
        chains: Vec<u64>,
    },
    /// One or more subscription tasks failed while running.
    #[error("subscription tasks failed: [{}]", failures.join("; "))]
    SubscriptionsFailed {
        /// Rendered per-chain failures.
        failures: Vec<String>,
    },
}
