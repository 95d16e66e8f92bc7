//! Subscription loops that feed notifications through a [`DecoderPipeline`].

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, warn};

use crate::decode::DecodedRecord;
use crate::error::Error;
use crate::logs::mentions_instruction;
use crate::pipeline::DecoderPipeline;
use crate::pipeline::correlator::TransactionReport;
use crate::pipeline::ledger::LedgerSubscriber;

/// Bounded memory of recently seen signatures.
pub struct RecentSignatures {
    order: VecDeque<String>,
    seen: HashSet<String>,
    capacity: usize,
}

impl RecentSignatures {
    pub fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// False if `signature` is already remembered.
    pub fn insert(&mut self, signature: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(signature) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.order.push_back(signature.to_string());
        self.seen.insert(signature.to_string());
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogWatchOptions {
    /// Only process transactions whose logs announce this instruction name
    /// (`Program log: Instruction: <name>`), compared case-insensitively.
    pub instruction: Option<String>,
}

/// Processes every transaction mentioned by the program's log subscription and sends the
/// outcome to `reports`. Returns when the subscription closes and in-flight work is done.
pub async fn watch_logs(
    pipeline: Arc<DecoderPipeline>,
    subscriber: &dyn LedgerSubscriber,
    program_id: &str,
    options: LogWatchOptions,
    reports: mpsc::Sender<Result<TransactionReport, Error>>,
) -> Result<(), Error> {
    let mut notifications = subscriber.subscribe_logs(program_id).await?;
    let max_in_flight = pipeline.config().max_in_flight;
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut recent = RecentSignatures::new(pipeline.config().dedup_window);
    info!(%program_id, max_in_flight, "watching logs");

    while let Some(notification) = notifications.recv().await {
        let signature = notification.signature;
        if notification.err.is_some() {
            debug!(%signature, "skipping failed transaction");
            continue;
        }
        if let Some(name) = options.instruction.as_deref()
            && !mentions_instruction(&notification.logs, name)
        {
            continue;
        }
        if !recent.insert(&signature) {
            debug!(%signature, "duplicate delivery");
            continue;
        }

        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .map_err(|e| Error::Ledger {
                reason: format!("watcher stopped: {e}"),
            })?;
        let pipeline = Arc::clone(&pipeline);
        let reports = reports.clone();
        tokio::spawn(async move {
            let result = pipeline.process_transaction(&signature).await;
            if let Err(e) = &result {
                warn!(%signature, error = %e, "transaction processing failed");
            }
            drop(permit);
            if reports.send(result).await.is_err() {
                debug!(%signature, "report receiver dropped");
            }
        });
    }

    let _drained = permits
        .acquire_many(max_in_flight as u32)
        .await
        .map_err(|e| Error::Ledger {
            reason: format!("watcher stopped: {e}"),
        })?;
    info!(%program_id, "log subscription closed");
    Ok(())
}

/// Decodes each change of `address` in delivery order and sends the result to `updates`.
pub async fn watch_accounts(
    pipeline: Arc<DecoderPipeline>,
    subscriber: &dyn LedgerSubscriber,
    address: &str,
    updates: mpsc::Sender<Result<Option<DecodedRecord>, Error>>,
) -> Result<(), Error> {
    let mut changes = subscriber.subscribe_account_changes(address).await?;
    info!(%address, "watching account");

    while let Some(change) = changes.recv().await {
        let result = pipeline.decode_account_change(&change).await;
        if let Err(e) = &result {
            warn!(%address, slot = change.slot, error = %e, "account decode failed");
        }
        if updates.send(result).await.is_err() {
            debug!(%address, "update receiver dropped");
            break;
        }
    }
    info!(%address, "account subscription closed");
    Ok(())
}
