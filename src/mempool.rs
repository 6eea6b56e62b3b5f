use std::sync::Arc;

use ethers::types::TxHash;
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

use crate::decoder::PayloadDecoder;
use crate::filter::TransactionFilter;
use crate::node::{NodeClient, PendingSubscription};
use crate::store::{Epoch, TransactionStore};
use crate::types::{PendingTransaction, SessionEvent};

enum Exit {
    Stopped,
    StreamClosed,
}

/// Hash stream → fetch → filter → decode → store, for one session.
pub struct MempoolWatcher {
    node: Arc<dyn NodeClient>,
    filter: TransactionFilter,
    decoder: Arc<PayloadDecoder>,
    store: Arc<TransactionStore>,
    events: broadcast::Sender<SessionEvent>,
    concurrency: usize,
}

impl MempoolWatcher {
    pub fn new(
        node: Arc<dyn NodeClient>,
        filter: TransactionFilter,
        decoder: Arc<PayloadDecoder>,
        store: Arc<TransactionStore>,
        events: broadcast::Sender<SessionEvent>,
        concurrency: usize,
    ) -> Self {
        Self {
            node,
            filter,
            decoder,
            store,
            events,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs until `stop` fires (or its sender is dropped) or the node closes
    /// the stream. In-flight fetches are dropped on exit and the subscription
    /// is released before returning.
    pub async fn run(self, mut subscription: PendingSubscription, epoch: Epoch, mut stop: oneshot::Receiver<()>) {
        info!("👀 Watching mempool for {:?}", self.filter.contract());

        let exit = {
            let hashes = stream::poll_fn(|cx| subscription.poll_hash(cx));
            let mut matches = hashes
                .map(|hash| self.resolve(hash))
                .buffer_unordered(self.concurrency);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop => break Exit::Stopped,
                    next = matches.next() => match next {
                        Some(Some(tx)) => self.ingest(epoch, tx).await,
                        Some(None) => {}
                        None => break Exit::StreamClosed,
                    },
                }
            }
        };

        subscription.unsubscribe().await;

        match exit {
            Exit::Stopped => info!("Mempool watch for {:?} stopped", self.filter.contract()),
            Exit::StreamClosed => {
                let reason = "node closed the pending transaction stream".to_string();
                warn!("Mempool watch for {:?} ended: {}", self.filter.contract(), reason);
                let _ = self.events.send(SessionEvent::ConnectionLost { reason });
            }
        }
    }

    async fn resolve(&self, hash: TxHash) -> Option<PendingTransaction> {
        self.filter.resolve(self.node.as_ref(), hash).await
    }

    async fn ingest(&self, epoch: Epoch, tx: PendingTransaction) {
        let decoded = self.decoder.decode_bytes(&tx.input);
        let hash = tx.hash;
        let from = tx.from;
        if let Some(stored) = self.store.append(epoch, tx, decoded).await {
            info!("🎯 Pending transaction #{} {:?} from {:?}", stored.index, hash, from);
        }
    }
}
