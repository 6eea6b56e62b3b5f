//! In-memory node used by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, Transaction, TxHash, U256};
use ethers::utils::keccak256;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::error::{ConnectionError, FetchError, RelayError};
use crate::node::{Connector, NodeClient, PendingSubscription};

pub const TEST_PRIVATE_KEY: &str = "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";
pub const TEST_CHAIN_ID: u64 = 31337;

#[derive(Default)]
pub struct MockNode {
    transactions: Mutex<HashMap<TxHash, Transaction>>,
    failing: Mutex<HashSet<TxHash>>,
    gates: Mutex<HashMap<TxHash, Arc<Notify>>>,
    feed: Mutex<Option<mpsc::Sender<TxHash>>>,
    pub fail_subscribe: AtomicBool,
    pub reject_sends: AtomicBool,
    pub unsubscribed: Arc<AtomicBool>,
    pub subscriptions: AtomicUsize,
    pub fetches: AtomicUsize,
    pub nonce: AtomicU64,
    pub nonce_queries: AtomicUsize,
    pub sent: Mutex<Vec<Bytes>>,
}

impl MockNode {
    /// Makes `tx` fetchable and returns its hash.
    pub fn add_transaction(&self, mut tx: Transaction) -> TxHash {
        if tx.hash.is_zero() {
            let n = self.transactions.lock().unwrap().len() as u64;
            tx.hash = TxHash::from(keccak256(n.to_be_bytes()));
        }
        let hash = tx.hash;
        self.transactions.lock().unwrap().insert(hash, tx);
        hash
    }

    pub fn fail_fetch(&self, hash: TxHash) {
        self.failing.lock().unwrap().insert(hash);
    }

    /// Holds fetches of `hash` until the returned notify fires.
    pub fn gate(&self, hash: TxHash) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(hash, notify.clone());
        notify
    }

    /// Announces `hash` on the live subscription.
    pub async fn push(&self, hash: TxHash) {
        let feed = self.feed.lock().unwrap().clone();
        if let Some(feed) = feed {
            let _ = feed.send(hash).await;
        }
    }

    /// Simulates the node dropping the connection.
    pub fn close_feed(&self) {
        self.feed.lock().unwrap().take();
    }
}

/// Hands out the same mock node for every endpoint except `refused`.
pub struct MockConnector {
    pub node: Arc<MockNode>,
    pub refused: Mutex<HashSet<String>>,
    pub opened: AtomicUsize,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl MockConnector {
    pub fn new(node: Arc<MockNode>) -> Self {
        Self {
            node,
            refused: Mutex::new(HashSet::new()),
            opened: AtomicUsize::new(0),
            hold: Mutex::new(None),
        }
    }

    /// Makes the next `open` wait until the returned notify fires.
    pub fn hold_next(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(notify.clone());
        notify
    }

    pub fn refuse(&self, endpoint: &str) {
        self.refused.lock().unwrap().insert(endpoint.to_string());
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, endpoint: &str) -> Result<Arc<dyn NodeClient>, ConnectionError> {
        if self.refused.lock().unwrap().contains(endpoint) {
            return Err(ConnectionError::Transport("connection refused".to_string()));
        }
        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.notified().await;
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.node.clone())
    }
}

pub fn transaction_to(to: Address, gas_price: u64) -> Transaction {
    Transaction {
        from: Address::from_low_u64_be(0xf00d),
        to: Some(to),
        value: U256::from(1),
        gas_price: Some(U256::from(gas_price)),
        gas: U256::from(50_000),
        input: Bytes::from(b"Hello".to_vec()),
        ..Default::default()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn subscribe_pending(&self, buffer: usize) -> Result<PendingSubscription, ConnectionError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(ConnectionError::Subscribe("subscription refused".to_string()));
        }
        let (hash_tx, hash_rx) = mpsc::channel(buffer);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let unsubscribed = self.unsubscribed.clone();
        unsubscribed.store(false, Ordering::SeqCst);
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            unsubscribed.store(true, Ordering::SeqCst);
        });
        *self.feed.lock().unwrap() = Some(hash_tx);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(PendingSubscription::new(hash_rx, stop_tx, task))
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<Transaction>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().get(&hash).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().unwrap().contains(&hash) {
            return Err(FetchError::Lookup {
                hash,
                reason: "transaction not found".to_string(),
            });
        }
        Ok(self.transactions.lock().unwrap().get(&hash).cloned())
    }

    async fn transaction_count(&self, _address: Address) -> Result<U256, RelayError> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        Ok(U256::from(self.nonce.load(Ordering::SeqCst)))
    }

    async fn chain_id(&self) -> Result<u64, ConnectionError> {
        Ok(TEST_CHAIN_ID)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, RelayError> {
        if self.reject_sends.load(Ordering::SeqCst) {
            return Err(RelayError::Submission("insufficient funds for gas * price + value".to_string()));
        }
        let hash = TxHash::from(keccak256(&raw));
        self.sent.lock().unwrap().push(raw);
        self.nonce.fetch_add(1, Ordering::SeqCst);
        Ok(hash)
    }
}
