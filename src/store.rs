use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::trace;

use crate::types::{PendingTransaction, SessionEvent, StoredTransaction};

/// Handle proving an append belongs to the session that is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

#[derive(Default)]
struct Inner {
    epoch: u64,
    entries: Vec<StoredTransaction>,
}

/// Append-only list of matching transactions for the current session.
///
/// Duplicate hashes are kept: each observation is its own entry.
pub struct TransactionStore {
    inner: RwLock<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

impl TransactionStore {
    pub fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    pub async fn epoch(&self) -> Epoch {
        Epoch(self.inner.read().await.epoch)
    }

    /// Appends unless the store was cleared since `epoch` was taken.
    pub async fn append(&self, epoch: Epoch, tx: PendingTransaction, decoded: String) -> Option<StoredTransaction> {
        let mut inner = self.inner.write().await;
        if inner.epoch != epoch.0 {
            trace!("Dropping {:?} from a closed session", tx.hash);
            return None;
        }

        let stored = StoredTransaction {
            index: inner.entries.len(),
            tx,
            decoded,
            observed_at: Utc::now(),
        };
        inner.entries.push(stored.clone());
        // no receivers is fine
        let _ = self.events.send(SessionEvent::TransactionAdded(stored.clone()));
        Some(stored)
    }

    /// Empties the store and invalidates every outstanding epoch.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.epoch += 1;
        inner.entries.clear();
        let _ = self.events.send(SessionEvent::Cleared);
    }

    pub async fn get(&self, index: usize) -> Option<StoredTransaction> {
        self.inner.read().await.entries.get(index).cloned()
    }

    pub async fn snapshot(&self) -> Vec<StoredTransaction> {
        self.inner.read().await.entries.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
