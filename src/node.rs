use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use ethers::prelude::*;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ConnectionError, FetchError, RelayError};

/// Everything the pipeline asks of a node.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    async fn subscribe_pending(&self, buffer: usize) -> Result<PendingSubscription, ConnectionError>;
    async fn transaction(&self, hash: TxHash) -> Result<Option<Transaction>, FetchError>;
    async fn transaction_count(&self, address: Address) -> Result<U256, RelayError>;
    async fn chain_id(&self) -> Result<u64, ConnectionError>;
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, RelayError>;
}

/// Opens node connections for the connection manager.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, endpoint: &str) -> Result<Arc<dyn NodeClient>, ConnectionError>;
}

pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<Arc<dyn NodeClient>, ConnectionError> {
        Ok(Arc::new(WsNode::connect(endpoint).await?))
    }
}

/// Live `newPendingTransactions` subscription.
///
/// The task behind it owns the node-side subscription; `unsubscribe` stops
/// the task and waits until the node has been told.
pub struct PendingSubscription {
    hashes: mpsc::Receiver<TxHash>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PendingSubscription {
    pub fn new(hashes: mpsc::Receiver<TxHash>, stop: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            hashes,
            stop: Some(stop),
            task,
        }
    }

    /// `None` once the node side has gone away.
    pub async fn next_hash(&mut self) -> Option<TxHash> {
        self.hashes.recv().await
    }

    pub fn poll_hash(&mut self, cx: &mut Context<'_>) -> Poll<Option<TxHash>> {
        self.hashes.poll_recv(cx)
    }

    pub async fn unsubscribe(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.hashes.close();
        if let Err(e) = (&mut self.task).await {
            warn!("Subscription task ended abnormally: {}", e);
        }
    }
}

/// Websocket node connection backed by `ethers`.
pub struct WsNode {
    provider: Arc<Provider<Ws>>,
}

impl WsNode {
    /// A dropped connection ends the session, so the transport never
    /// reconnects on its own.
    pub async fn connect(endpoint: &str) -> Result<Self, ConnectionError> {
        validate_endpoint(endpoint)?;
        let ws = Ws::connect_with_reconnects(endpoint, 0)
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        info!("✓ Websocket connected to {}", redact(endpoint));
        Ok(Self {
            provider: Arc::new(Provider::new(ws)),
        })
    }
}

#[async_trait]
impl NodeClient for WsNode {
    async fn subscribe_pending(&self, buffer: usize) -> Result<PendingSubscription, ConnectionError> {
        let provider = self.provider.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (hash_tx, hash_rx) = mpsc::channel(buffer);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut stream = match provider.subscribe_pending_txs().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(ConnectionError::Subscribe(e.to_string())));
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    next = stream.next() => match next {
                        Some(hash) => {
                            if hash_tx.send(hash).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            debug!("Pending transaction stream closed by node");
                            return;
                        }
                    },
                }
            }

            if let Err(e) = stream.unsubscribe().await {
                warn!("Failed to unsubscribe from pending transactions: {}", e);
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => Ok(PendingSubscription::new(hash_rx, stop_tx, task)),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConnectionError::Subscribe("subscription task exited".to_string())),
        }
    }

    async fn transaction(&self, hash: TxHash) -> Result<Option<Transaction>, FetchError> {
        self.provider
            .get_transaction(hash)
            .await
            .map_err(|e| FetchError::Lookup {
                hash,
                reason: e.to_string(),
            })
    }

    async fn transaction_count(&self, address: Address) -> Result<U256, RelayError> {
        self.provider
            .get_transaction_count(address, None)
            .await
            .map_err(|e| RelayError::Nonce(e.to_string()))
    }

    async fn chain_id(&self) -> Result<u64, ConnectionError> {
        let id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        Ok(id.as_u64())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<TxHash, RelayError> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| RelayError::Submission(e.to_string()))?;
        Ok(pending.tx_hash())
    }
}

pub fn validate_endpoint(endpoint: &str) -> Result<Url, ConnectionError> {
    let malformed = |reason: &str| ConnectionError::MalformedEndpoint {
        endpoint: redact(endpoint),
        reason: reason.to_string(),
    };
    let url = Url::parse(endpoint).map_err(|e| malformed(&e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => {}
        _ => return Err(malformed("expected a ws:// or wss:// endpoint")),
    }
    if url.host_str().is_none() {
        return Err(malformed("missing host"));
    }
    Ok(url)
}

/// Hides the API key that providers embed in the endpoint path.
pub fn redact(endpoint: &str) -> String {
    match Url::parse(endpoint) {
        Ok(url) => {
            let host = url.host_str().unwrap_or_default();
            let port = url.port().map(|p| format!(":{}", p)).unwrap_or_default();
            let path = if url.path().len() > 1 { "/…" } else { "" };
            format!("{}://{}{}{}", url.scheme(), host, port, path)
        }
        Err(_) => "<invalid endpoint>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_websocket_endpoints_are_accepted() {
        assert!(validate_endpoint("ws://localhost:8546").is_ok());
        assert!(validate_endpoint("wss://eth-sepolia.g.alchemy.com/v2/key").is_ok());
    }

    #[test]
    fn test_non_websocket_endpoints_are_rejected() {
        for endpoint in ["https://eth.llamarpc.com", "localhost:8546", "not a url", ""] {
            assert!(
                matches!(validate_endpoint(endpoint), Err(ConnectionError::MalformedEndpoint { .. })),
                "{} should be rejected",
                endpoint
            );
        }
    }

    #[test]
    fn test_redact_hides_path() {
        assert_eq!(
            redact("wss://eth-sepolia.g.alchemy.com/v2/secret"),
            "wss://eth-sepolia.g.alchemy.com/…"
        );
        assert_eq!(redact("ws://localhost:8546"), "ws://localhost:8546");
    }

    /// Serves one pending hash per connection and hangs up the first one.
    async fn flaky_node(listener: TcpListener, connections: Arc<AtomicUsize>) {
        while let Ok((socket, _)) = listener.accept().await {
            let n = connections.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(Message::Text(text))) = ws.next().await {
                    let request: Value = serde_json::from_str(&text).unwrap();
                    let method = request["method"].as_str().unwrap_or_default().to_string();
                    let result = match method.as_str() {
                        "eth_subscribe" => json!("0x1"),
                        "eth_chainId" => json!("0x7a69"),
                        _ => Value::Null,
                    };
                    let reply = json!({"jsonrpc": "2.0", "id": request["id"], "result": result});
                    ws.send(Message::Text(reply.to_string())).await.unwrap();

                    if method == "eth_subscribe" {
                        let notification = json!({
                            "jsonrpc": "2.0",
                            "method": "eth_subscription",
                            "params": {"subscription": "0x1", "result": TxHash::from_low_u64_be(n)},
                        });
                        ws.send(Message::Text(notification.to_string())).await.unwrap();
                        if n == 1 {
                            let _ = ws.close(None).await;
                            return;
                        }
                    }
                }
            });
        }
    }

    #[tokio::test]
    async fn test_dropped_websocket_ends_the_subscription() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());
        let connections = Arc::new(AtomicUsize::new(0));
        tokio::spawn(flaky_node(listener, connections.clone()));

        let node = WsNode::connect(&endpoint).await.unwrap();
        let mut subscription = node.subscribe_pending(16).await.unwrap();

        let first = timeout(Duration::from_secs(5), subscription.next_hash()).await.unwrap();
        assert_eq!(first, Some(TxHash::from_low_u64_be(1)));

        let after_drop = timeout(Duration::from_secs(5), subscription.next_hash()).await.unwrap();
        assert_eq!(after_drop, None);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(connections.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_the_task() {
        let (hash_tx, hash_rx) = mpsc::channel(4);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = stop_rx.await;
            drop(hash_tx);
        });

        let subscription = PendingSubscription::new(hash_rx, stop_tx, task);
        timeout(Duration::from_secs(1), subscription.unsubscribe())
            .await
            .unwrap();
    }
}
