use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, Transaction, TxHash, U256};

/// The contract being watched and the node it is watched through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub contract: Address,
    pub endpoint: String,
}

/// A mempool transaction as the pipeline sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    /// Legacy gas price, or the fee cap for typed transactions that have none.
    pub gas_price: Option<U256>,
    pub gas: U256,
    pub input: Bytes,
    pub nonce: U256,
}

impl From<Transaction> for PendingTransaction {
    fn from(tx: Transaction) -> Self {
        Self {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            gas_price: tx.gas_price.or(tx.max_fee_per_gas),
            gas: tx.gas,
            input: tx.input,
            nonce: tx.nonce,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredTransaction {
    /// Position in the store, stable for the life of the session.
    pub index: usize,
    pub tx: PendingTransaction,
    pub decoded: String,
    pub observed_at: DateTime<Utc>,
}

/// Pipeline notifications for whatever front end is attached.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Connected(WatchTarget),
    TransactionAdded(StoredTransaction),
    Cleared,
    ConnectionLost { reason: String },
}
