use std::fmt;
use std::sync::Arc;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionRequest, TxHash, U256};
use tracing::info;

use crate::error::{ConfigError, RelayError};
use crate::node::NodeClient;
use crate::types::PendingTransaction;

/// The single signing key, loaded once at start-up.
#[derive(Clone)]
pub struct Credential {
    wallet: LocalWallet,
}

impl Credential {
    pub fn from_private_key(key: &str) -> Result<Self, ConfigError> {
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| ConfigError::invalid("PRIVATE_KEY", e))?;
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayReceipt {
    pub source: TxHash,
    pub submitted: TxHash,
    pub gas_price: U256,
    pub nonce: U256,
}

/// Twice the source's gas price.
pub fn competing_gas_price(source: &PendingTransaction) -> Result<U256, RelayError> {
    let gas_price = source
        .gas_price
        .ok_or(RelayError::MissingGasPrice(source.hash))?;
    gas_price
        .checked_mul(U256::from(2))
        .ok_or(RelayError::GasPriceOverflow(source.hash))
}

/// Re-sends a stored transaction's call at double the gas price.
pub struct RelayEngine {
    node: Arc<dyn NodeClient>,
    wallet: LocalWallet,
}

impl RelayEngine {
    pub fn new(node: Arc<dyn NodeClient>, credential: &Credential, chain_id: u64) -> Self {
        Self {
            node,
            wallet: credential.wallet.clone().with_chain_id(chain_id),
        }
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Same destination, calldata, value and gas limit as `source`.
    pub fn build_request(&self, source: &PendingTransaction, nonce: U256) -> Result<TypedTransaction, RelayError> {
        let to = source.to.ok_or(RelayError::NoDestination(source.hash))?;
        let request = TransactionRequest::new()
            .from(self.wallet.address())
            .to(to)
            .data(source.input.clone())
            .value(source.value)
            .gas(source.gas)
            .gas_price(competing_gas_price(source)?)
            .nonce(nonce)
            .chain_id(self.wallet.chain_id());
        Ok(request.into())
    }

    pub async fn relay(&self, source: &PendingTransaction) -> Result<RelayReceipt, RelayError> {
        // validate before touching the node
        let gas_price = competing_gas_price(source)?;
        if source.to.is_none() {
            return Err(RelayError::NoDestination(source.hash));
        }

        let nonce = self.node.transaction_count(self.wallet.address()).await?;
        let tx = self.build_request(source, nonce)?;

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        let submitted = self.node.send_raw_transaction(raw).await?;
        info!(
            "Relayed {:?} as {:?} (gas price {} → {}, nonce {})",
            source.hash,
            submitted,
            source.gas_price.unwrap_or_default(),
            gas_price,
            nonce
        );

        Ok(RelayReceipt {
            source: source.hash,
            submitted,
            gas_price,
            nonce,
        })
    }
}
