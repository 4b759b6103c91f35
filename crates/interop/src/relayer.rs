//! Automatic delivery of indexed messages to their destination chains.

use crate::{MessageIndex, RelayOutcome, RelaySubmitter};
use omnisim_types::{CrossDomainMessage, MessageStatus};
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
use tracing::{debug, error, info};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Watches the message index and delivers every indexed message to its
/// destination chain, exactly once per run.
///
/// One worker runs per destination chain. Each worker drains its pending
/// queue in discovery order, one message at a time: a message's relay
/// transaction has mined (or terminally failed) before the next one is
/// submitted. Failures are terminal for the message but never for the worker.
#[derive(Debug)]
pub struct CrossDomainMessageRelayer {
    index: Arc<MessageIndex>,
    cancel: CancellationToken,
    poll_interval: Duration,
    started: AtomicBool,

    tasks: tokio::sync::Mutex<JoinSet<()>>,
    running_dests: Arc<Mutex<HashSet<u64>>>,
}

impl CrossDomainMessageRelayer {
    /// Creates a relayer reading from `index`, wired to the given
    /// cancellation scope.
    pub fn new(index: Arc<MessageIndex>, cancel: CancellationToken) -> Self {
        Self {
            index,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            started: AtomicBool::new(false),
            tasks: tokio::sync::Mutex::new(JoinSet::new()),
            running_dests: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Overrides the pending-queue poll interval.
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Spawns one relay worker per destination chain.
    pub async fn start(
        &self,
        submitters: HashMap<u64, Arc<dyn RelaySubmitter>>,
    ) -> Result<(), RelayerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RelayerError::AlreadyStarted);
        }
        if submitters.is_empty() {
            return Err(RelayerError::NoSubmitters);
        }

        let mut ordered: Vec<(u64, Arc<dyn RelaySubmitter>)> = submitters.into_iter().collect();
        ordered.sort_by_key(|(dest_chain_id, _)| *dest_chain_id);

        let mut tasks = self.tasks.lock().await;
        for (dest_chain_id, submitter) in ordered {
            info!(target: "omnisim::relayer", dest_chain_id, "starting relay worker");
            self.running_dests.lock().unwrap_or_else(|e| e.into_inner()).insert(dest_chain_id);

            let index = Arc::clone(&self.index);
            let cancel = self.cancel.clone();
            let poll_interval = self.poll_interval;
            let running = Arc::clone(&self.running_dests);
            tasks.spawn(async move {
                run_destination(dest_chain_id, submitter, &index, &cancel, poll_interval).await;
                running.lock().unwrap_or_else(|e| e.into_inner()).remove(&dest_chain_id);
            });
        }

        Ok(())
    }

    /// Stops every worker. An in-flight relay submission settles to a
    /// terminal status before its worker exits; no new submission starts
    /// after this is called.
    pub async fn stop(&self, timeout: Duration) -> Result<(), RelayerError> {
        info!(target: "omnisim::relayer", "stopping relayer");
        self.cancel.cancel();

        let mut tasks = self.tasks.lock().await;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match tokio::time::timeout(remaining, tasks.join_next()).await {
                Err(_) => {
                    let mut chains: Vec<u64> = self
                        .running_dests
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .iter()
                        .copied()
                        .collect();
                    chains.sort_unstable();
                    return Err(RelayerError::StopTimeout { chains });
                }
                Ok(None) => return Ok(()),
                Ok(Some(_)) => {}
            }
        }
    }
}

async fn run_destination(
    dest_chain_id: u64,
    submitter: Arc<dyn RelaySubmitter>,
    index: &MessageIndex,
    cancel: &CancellationToken,
    poll_interval: Duration,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target: "omnisim::relayer", dest_chain_id, "relay worker cancelled");
                return;
            }
            _ = ticker.tick() => {
                for message in index.pending_for(dest_chain_id).await {
                    // Checked between messages only: an in-flight submission
                    // always settles to a terminal status.
                    if cancel.is_cancelled() {
                        return;
                    }
                    relay_one(&*submitter, index, message).await;
                }
            }
        }
    }
}

async fn relay_one(
    submitter: &dyn RelaySubmitter,
    index: &MessageIndex,
    message: CrossDomainMessage,
) {
    let key = message.key();
    if index.set_status(key, MessageStatus::RelaySubmitted).await.is_err() {
        // Settled since the pending snapshot was taken.
        debug!(target: "omnisim::relayer", %key, "message no longer pending, skipping");
        return;
    }

    match submitter.submit_relay(&message).await {
        Ok(RelayOutcome::Relayed { tx_hash }) => {
            info!(
                target: "omnisim::relayer",
                %key, dest_chain_id = message.dest_chain_id, %tx_hash, "message relayed"
            );
            finalize(index, key, MessageStatus::Relayed).await;
        }
        Ok(RelayOutcome::AlreadyRelayed) => {
            info!(
                target: "omnisim::relayer",
                %key, dest_chain_id = message.dest_chain_id, "message was already relayed"
            );
            finalize(index, key, MessageStatus::Relayed).await;
        }
        Err(err) => {
            error!(
                target: "omnisim::relayer",
                %key, dest_chain_id = message.dest_chain_id, %err, "relay failed"
            );
            finalize(index, key, MessageStatus::RelayFailed).await;
        }
    }
}

async fn finalize(index: &MessageIndex, key: omnisim_types::MessageKey, status: MessageStatus) {
    if let Err(err) = index.set_status(key, status).await {
        // Only reachable if something else settled the message concurrently.
        error!(target: "omnisim::relayer", %key, %err, "failed to record relay result");
    }
}

/// Errors from the relayer lifecycle.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayerError {
    /// Start was called twice.
    #[error("relayer already started")]
    AlreadyStarted,
    /// Start was called with no destination chains.
    #[error("no destination submitters supplied")]
    NoSubmitters,
    /// Workers did not wind down within the stop timeout.
    #[error("relay workers for chains {chains:?} failed to close in time")]
    StopTimeout {
        /// The destinations whose workers were still running.
        chains: Vec<u64>,
    },
}
