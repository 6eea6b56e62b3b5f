use ethers::types::{Address, Transaction, TxHash};
use tracing::{debug, trace};

use crate::error::ConnectionError;
use crate::node::NodeClient;
use crate::types::PendingTransaction;

/// Keeps only transactions sent to one contract.
#[derive(Debug, Clone, Copy)]
pub struct TransactionFilter {
    contract: Address,
}

impl TransactionFilter {
    pub fn new(contract: Address) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Parsed addresses compare byte-wise, so checksum casing never matters.
    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.to == Some(self.contract)
    }

    /// Fetches the transaction behind `hash` and returns it if it matches.
    pub async fn resolve(&self, node: &dyn NodeClient, hash: TxHash) -> Option<PendingTransaction> {
        match node.transaction(hash).await {
            Ok(Some(tx)) if self.matches(&tx) => Some(tx.into()),
            Ok(Some(_)) => None,
            Ok(None) => {
                trace!("{:?} no longer pending", hash);
                None
            }
            Err(e) => {
                debug!("Skipping pending transaction: {}", e);
                None
            }
        }
    }
}

pub fn parse_address(raw: &str) -> Result<Address, ConnectionError> {
    let invalid = |reason: &str| ConnectionError::InvalidAddress {
        address: raw.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| invalid("missing 0x prefix"))?;
    if digits.len() != 40 {
        return Err(invalid("expected 20 bytes of hex"));
    }
    digits.parse::<Address>().map_err(|e| invalid(&e.to_string()))
}
