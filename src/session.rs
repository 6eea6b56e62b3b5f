use std::sync::Arc;

use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::decoder::PayloadDecoder;
use crate::error::{ConnectionError, RelayError};
use crate::filter::{parse_address, TransactionFilter};
use crate::mempool::MempoolWatcher;
use crate::node::{redact, validate_endpoint, Connector, NodeClient};
use crate::relay::{RelayEngine, RelayReceipt};
use crate::store::TransactionStore;
use crate::types::{SessionEvent, StoredTransaction, WatchTarget};

/// One live watch: the node connection, its subscription task and the
/// relay engine bound to it.
struct Session {
    target: WatchTarget,
    relay: Option<Arc<RelayEngine>>,
    stop: oneshot::Sender<()>,
    ingest: JoinHandle<()>,
    _node: Arc<dyn NodeClient>,
}

/// Owns at most one session at a time.
pub struct ConnectionManager {
    config: Config,
    connector: Arc<dyn Connector>,
    decoder: Arc<PayloadDecoder>,
    store: Arc<TransactionStore>,
    events: broadcast::Sender<SessionEvent>,
    session: Mutex<Option<Session>>,
}

impl ConnectionManager {
    pub fn new(config: Config, connector: Arc<dyn Connector>, decoder: PayloadDecoder) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer);
        Self {
            store: Arc::new(TransactionStore::new(events.clone())),
            config,
            connector,
            decoder: Arc::new(decoder),
            events,
            session: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn store(&self) -> Arc<TransactionStore> {
        self.store.clone()
    }

    pub async fn target(&self) -> Option<WatchTarget> {
        self.session.lock().await.as_ref().map(|s| s.target.clone())
    }

    /// True while a session exists and its stream is still open.
    pub async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| !s.ingest.is_finished())
            .unwrap_or(false)
    }

    /// Starts watching `contract`. An existing session is torn down first;
    /// on error nothing stays open. The session lock is not held while the
    /// node is being reached.
    pub async fn connect(&self, contract: &str, endpoint: Option<&str>) -> Result<WatchTarget, ConnectionError> {
        if let Some(previous) = self.session.lock().await.take() {
            self.teardown(previous).await;
        }

        let contract = parse_address(contract)?;
        let endpoint = endpoint
            .map(str::to_string)
            .or_else(|| self.config.node_endpoint.clone())
            .ok_or_else(|| ConnectionError::MalformedEndpoint {
                endpoint: String::new(),
                reason: "no endpoint given and NODE_ENDPOINT is not set".to_string(),
            })?;
        validate_endpoint(&endpoint)?;

        let node = self.connector.open(&endpoint).await?;
        let chain_id = node.chain_id().await?;
        let subscription = node.subscribe_pending(self.config.event_buffer).await?;

        let relay = match &self.config.credential {
            Some(credential) => Some(Arc::new(RelayEngine::new(node.clone(), credential, chain_id))),
            None => {
                warn!("PRIVATE_KEY not set, relaying is disabled");
                None
            }
        };

        let mut slot = self.session.lock().await;
        // a concurrent connect finished first; the latest one wins
        if let Some(displaced) = slot.take() {
            self.teardown(displaced).await;
        }

        let watcher = MempoolWatcher::new(
            node.clone(),
            TransactionFilter::new(contract),
            self.decoder.clone(),
            self.store.clone(),
            self.events.clone(),
            self.config.fetch_concurrency,
        );
        let epoch = self.store.epoch().await;
        let (stop, stop_rx) = oneshot::channel();
        let ingest = tokio::spawn(watcher.run(subscription, epoch, stop_rx));

        let target = WatchTarget { contract, endpoint };
        info!(
            "✓ Connected to chain {} via {}, watching {:?}",
            chain_id,
            redact(&target.endpoint),
            contract
        );
        let _ = self.events.send(SessionEvent::Connected(target.clone()));

        *slot = Some(Session {
            target: target.clone(),
            relay,
            stop,
            ingest,
            _node: node,
        });
        Ok(target)
    }

    /// Ends the session, if any. Returns whether one was active.
    pub async fn disconnect(&self) -> bool {
        let mut slot = self.session.lock().await;
        match slot.take() {
            Some(session) => {
                self.teardown(session).await;
                true
            }
            None => false,
        }
    }

    async fn teardown(&self, session: Session) {
        let Session { target, stop, ingest, .. } = session;
        let _ = stop.send(());
        if let Err(e) = ingest.await {
            error!("Mempool watch task failed: {}", e);
        }
        // outstanding fetch results carry the old epoch from here on
        self.store.clear().await;
        info!("Disconnected from {}", redact(&target.endpoint));
    }

    /// Relays stored transaction `index`. Failures are logged and returned.
    pub async fn relay(&self, index: usize) -> Result<RelayReceipt, RelayError> {
        let result = self.try_relay(index).await;
        if let Err(e) = &result {
            warn!("Failed to send frontrun transaction for #{}: {}", index, e);
        }
        result
    }

    /// Runs `relay` on its own task so the caller never waits on the node.
    pub fn spawn_relay(self: &Arc<Self>, index: usize) -> JoinHandle<Result<RelayReceipt, RelayError>> {
        let manager = self.clone();
        tokio::spawn(async move { manager.relay(index).await })
    }

    async fn try_relay(&self, index: usize) -> Result<RelayReceipt, RelayError> {
        let engine = {
            let slot = self.session.lock().await;
            let session = slot.as_ref().ok_or(RelayError::NotConnected)?;
            session.relay.clone().ok_or(RelayError::NoCredential)?
        };
        let stored: StoredTransaction = self
            .store
            .get(index)
            .await
            .ok_or(RelayError::UnknownTransaction(index))?;
        engine.relay(&stored.tx).await
    }
}
