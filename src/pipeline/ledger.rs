use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::types::{AccountChange, AccountData, LogNotification, Transaction};

/// Point lookups against a node. `Ok(None)` means the ledger has no such item.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn fetch_transaction(&self, signature: &str) -> Result<Option<Transaction>, Error>;

    async fn fetch_account(&self, address: &str) -> Result<Option<AccountData>, Error>;
}

/// Push subscriptions. Delivery is at least once and unordered across addresses; the
/// channel closes when the subscription ends.
#[async_trait]
pub trait LedgerSubscriber: Send + Sync {
    async fn subscribe_logs(&self, program_id: &str)
    -> Result<mpsc::Receiver<LogNotification>, Error>;

    async fn subscribe_account_changes(
        &self,
        address: &str,
    ) -> Result<mpsc::Receiver<AccountChange>, Error>;
}
