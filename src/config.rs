use std::path::PathBuf;

use crate::error::ConfigError;
use crate::relay::Credential;

const DEFAULT_ALCHEMY_NETWORK: &str = "eth-sepolia";
const DEFAULT_FETCH_CONCURRENCY: usize = 16;
const DEFAULT_EVENT_BUFFER: usize = 1024;

/// Process-wide settings, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    /// Websocket endpoint used when `connect` is given no endpoint.
    pub node_endpoint: Option<String>,
    pub credential: Option<Credential>,
    /// Extra JSON ABI consulted by the payload decoder.
    pub abi_path: Option<PathBuf>,
    /// Upper bound on in-flight fetch-by-hash requests per session.
    pub fetch_concurrency: usize,
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_endpoint: None,
            credential: None,
            abi_path: None,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let node_endpoint = var("NODE_ENDPOINT").or_else(|| var("RPC_URL")).or_else(|| {
            var("ALCHEMY_API_KEY").map(|key| {
                let network = var("ALCHEMY_NETWORK")
                    .unwrap_or_else(|| DEFAULT_ALCHEMY_NETWORK.to_string());
                format!("wss://{}.g.alchemy.com/v2/{}", network, key)
            })
        });

        let credential = var("PRIVATE_KEY")
            .map(|key| Credential::from_private_key(&key))
            .transpose()?;

        let fetch_concurrency = match var("FETCH_CONCURRENCY") {
            Some(raw) => parse_positive("FETCH_CONCURRENCY", &raw)?,
            None => DEFAULT_FETCH_CONCURRENCY,
        };

        let event_buffer = match var("EVENT_BUFFER") {
            Some(raw) => parse_positive("EVENT_BUFFER", &raw)?,
            None => DEFAULT_EVENT_BUFFER,
        };

        Ok(Self {
            node_endpoint,
            credential,
            abi_path: var("ABI_PATH").map(PathBuf::from),
            fetch_concurrency,
            event_buffer,
        })
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.parse::<usize>() {
        Ok(0) => Err(ConfigError::invalid(key, "must be greater than zero")),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::invalid(key, e)),
    }
}
