use ethers::types::TxHash;
use thiserror::Error;

/// Failures while opening a session. The manager is left disconnected.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("invalid contract address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("malformed node endpoint `{endpoint}`: {reason}")]
    MalformedEndpoint { endpoint: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("pending transaction subscription failed: {0}")]
    Subscribe(String),
}

/// Per-hash lookup failure. The event is dropped and ingestion continues.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetching transaction {hash:?} failed: {reason}")]
    Lookup { hash: TxHash, reason: String },
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no signing credential configured")]
    NoCredential,
    #[error("not connected to a node")]
    NotConnected,
    #[error("no stored transaction at index {0}")]
    UnknownTransaction(usize),
    #[error("source transaction {0:?} has no destination")]
    NoDestination(TxHash),
    #[error("source transaction {0:?} carries no gas price")]
    MissingGasPrice(TxHash),
    #[error("doubling gas price of {0:?} overflows")]
    GasPriceOverflow(TxHash),
    #[error("nonce lookup failed: {0}")]
    Nonce(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("submission rejected: {0}")]
    Submission(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("reading ABI file {path}: {reason}")]
    Abi { path: String, reason: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl ToString) -> Self {
        Self::Invalid { key, reason: reason.to_string() }
    }
}
