//! Broker connection lifecycle with automatic reconnect
//!
//! Architecture:
//! 1. `ConnectionManager::connect` dials once; failure is returned to the caller
//! 2. The current channel is published through a `watch` channel as a
//!    [`ChannelHandle`] tagged with a generation number
//! 3. `enable_auto_reconnect` waits for the transport to report closure and
//!    redials every heartbeat interval until it succeeds, then bumps the
//!    generation
//! 4. Consumers and publishers compare generations to notice they are bound
//!    to a dead channel and re-declare themselves on the new one

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::observability::Metrics;

#[derive(Debug, Error, Clone)]
pub enum ConnectionError {
    #[error("failed to connect to broker: {0}")]
    Dial(String),

    #[error("failed to open channel: {0}")]
    Channel(String),

    #[error("failed to close connection: {0}")]
    Close(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Why a transport went away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closure {
    /// `close()` was called
    Requested,
    Unexpected(String),
}

/// A live connection plus the channel opened on it
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Channel: Clone + Send + Sync + 'static;

    fn channel(&self) -> Self::Channel;

    fn is_connected(&self) -> bool;

    /// Resolves once the transport is gone
    async fn closed(&self) -> Closure;

    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Dials new transports
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport, ConnectionError>;
}

pub type ChannelOf<C> = <<C as Connector>::Transport as Transport>::Channel;

/// Channel valid until the generation changes
#[derive(Debug, Clone)]
pub struct ChannelHandle<Ch> {
    pub generation: u64,
    pub channel: Ch,
}

/// Owns the broker transport; cheap to clone
pub struct ConnectionManager<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<C: Connector> {
    connector: C,
    heartbeat: Duration,
    transport: RwLock<Arc<C::Transport>>,
    state: watch::Sender<ConnectionState>,
    channels: watch::Sender<ChannelHandle<ChannelOf<C>>>,
    shutting_down: AtomicBool,
    metrics: Arc<Metrics>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Dial the broker once. Failure is fatal to startup and not retried.
    pub async fn connect(
        connector: C,
        heartbeat: Duration,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ConnectionError> {
        let transport = connector.connect().await?;

        let (state, _) = watch::channel(ConnectionState::Connected);
        let (channels, _) = watch::channel(ChannelHandle {
            generation: 0,
            channel: transport.channel(),
        });

        info!("Connected to broker");

        Ok(Self {
            inner: Arc::new(Inner {
                connector,
                heartbeat,
                transport: RwLock::new(Arc::new(transport)),
                state,
                channels,
                shutting_down: AtomicBool::new(false),
                metrics,
            }),
        })
    }

    /// Current channel; treat it as stale once a newer generation appears
    pub fn channel(&self) -> ChannelHandle<ChannelOf<C>> {
        self.inner.channels.borrow().clone()
    }

    /// Receiver that observes every channel replacement
    pub fn subscribe(&self) -> watch::Receiver<ChannelHandle<ChannelOf<C>>> {
        self.inner.channels.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.transport.read().await.is_connected()
    }

    /// Log connectivity every heartbeat interval. Never changes state.
    pub fn watch_liveness(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.heartbeat).await;
                if inner.shutting_down.load(Ordering::SeqCst) {
                    break;
                }

                let connected = inner.transport.read().await.is_connected();
                let state = *inner.state.borrow();
                let metrics = inner.metrics.snapshot();
                info!(
                    connected,
                    ?state,
                    received = metrics.deliveries_received,
                    acked = metrics.deliveries_acked,
                    rejected = metrics.deliveries_rejected,
                    reconnects = metrics.reconnects,
                    "Broker liveness"
                );
            }
        })
    }

    /// Spawn the reconnect watcher.
    ///
    /// Retries on a fixed heartbeat period with no limit, backoff or jitter.
    /// Exits only after `close()`.
    pub fn enable_auto_reconnect(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();

        tokio::spawn(async move {
            loop {
                let transport = inner.transport.read().await.clone();

                match transport.closed().await {
                    Closure::Requested => {
                        debug!("Reconnect watcher stopping");
                        break;
                    }
                    Closure::Unexpected(reason) => {
                        if inner.shutting_down.load(Ordering::SeqCst) {
                            break;
                        }
                        warn!(reason = %reason, "Broker connection closed unexpectedly");
                        inner.state.send_replace(ConnectionState::Disconnected);

                        if !inner.reconnect().await {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Close the transport once; later calls are no-ops
    pub async fn close(&self) -> Result<(), ConnectionError> {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let transport = self.inner.transport.read().await.clone();
        let result = transport.close().await;
        self.inner.state.send_replace(ConnectionState::Disconnected);
        info!("Broker connection closed");
        result
    }
}

impl<C: Connector> Inner<C> {
    /// Redial until success. Returns false if shutdown began meanwhile.
    async fn reconnect(&self) -> bool {
        let mut attempt: u64 = 0;

        loop {
            tokio::time::sleep(self.heartbeat).await;
            if self.shutting_down.load(Ordering::SeqCst) {
                return false;
            }

            attempt += 1;
            self.state.send_replace(ConnectionState::Connecting);

            match self.connector.connect().await {
                Ok(transport) => {
                    // close() flips the flag before it reads the transport, so
                    // a check under the write lock never leaves one open
                    let mut current = self.transport.write().await;
                    if self.shutting_down.load(Ordering::SeqCst) {
                        drop(current);
                        let _ = transport.close().await;
                        return false;
                    }

                    let channel = transport.channel();
                    *current = Arc::new(transport);

                    let generation = self.channels.borrow().generation + 1;
                    self.channels.send_replace(ChannelHandle {
                        generation,
                        channel,
                    });
                    self.state.send_replace(ConnectionState::Connected);
                    drop(current);
                    self.metrics.reconnected();

                    info!(attempt, generation, "Broker reconnect succeeded");
                    return true;
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Disconnected);
                    warn!(attempt, error = %e, "Broker reconnect failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    /// Transport whose closure is driven by the test
    struct FakeTransport {
        id: usize,
        closed_tx: Arc<watch::Sender<Option<Closure>>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        type Channel = usize;

        fn channel(&self) -> usize {
            self.id
        }

        fn is_connected(&self) -> bool {
            self.closed_tx.borrow().is_none()
        }

        async fn closed(&self) -> Closure {
            let mut rx = self.closed_tx.subscribe();
            loop {
                let current = rx.borrow_and_update().clone();
                if let Some(closure) = current {
                    return closure;
                }
                if rx.changed().await.is_err() {
                    return Closure::Requested;
                }
            }
        }

        async fn close(&self) -> Result<(), ConnectionError> {
            self.closed_tx.send_replace(Some(Closure::Requested));
            Ok(())
        }
    }

    /// Holds dials until the test releases them
    #[derive(Default)]
    struct DialGate {
        closed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[derive(Clone, Default)]
    struct FakeConnector {
        attempts: Arc<AtomicUsize>,
        failures_left: Arc<AtomicUsize>,
        live: Arc<Mutex<Vec<Arc<watch::Sender<Option<Closure>>>>>>,
        gate: Arc<DialGate>,
    }

    impl FakeConnector {
        fn failing_next(&self, n: usize) {
            self.failures_left.store(n, Ordering::SeqCst);
        }

        fn hold_dials(&self) {
            self.gate.closed.store(true, Ordering::SeqCst);
        }

        fn latest_closure(&self) -> Option<Closure> {
            let live = self.live.lock().unwrap();
            live.last().unwrap().borrow().clone()
        }

        fn drop_connection(&self) {
            let live = self.live.lock().unwrap();
            let tx = live.last().unwrap();
            tx.send_replace(Some(Closure::Unexpected("connection reset".to_string())));
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        type Transport = FakeTransport;

        async fn connect(&self) -> Result<FakeTransport, ConnectionError> {
            if self.gate.closed.load(Ordering::SeqCst) {
                self.gate.entered.notify_one();
                self.gate.release.notified().await;
            }

            let id = self.attempts.fetch_add(1, Ordering::SeqCst);
            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(ConnectionError::Dial("connection refused".to_string()));
            }

            let (closed_tx, _) = watch::channel(None);
            let closed_tx = Arc::new(closed_tx);
            self.live.lock().unwrap().push(closed_tx.clone());
            Ok(FakeTransport { id, closed_tx })
        }
    }

    const HEARTBEAT: Duration = Duration::from_millis(10);

    async fn wait_for_generation(
        rx: &mut watch::Receiver<ChannelHandle<usize>>,
        generation: u64,
    ) -> ChannelHandle<usize> {
        timeout(Duration::from_secs(5), async {
            loop {
                let current = rx.borrow_and_update().clone();
                if current.generation >= generation {
                    return current;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("reconnect did not happen in time")
    }

    #[tokio::test]
    async fn test_initial_dial_failure_is_fatal() {
        let connector = FakeConnector::default();
        connector.failing_next(1);

        let result =
            ConnectionManager::connect(connector.clone(), HEARTBEAT, Arc::new(Metrics::new())).await;
        assert!(matches!(result, Err(ConnectionError::Dial(_))));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reconnects_after_unexpected_closure() {
        let connector = FakeConnector::default();
        let metrics = Arc::new(Metrics::new());
        let manager = ConnectionManager::connect(connector.clone(), HEARTBEAT, metrics.clone())
            .await
            .unwrap();
        let mut channels = manager.subscribe();
        assert_eq!(manager.channel().generation, 0);
        assert_eq!(manager.state(), ConnectionState::Connected);

        let watcher = manager.enable_auto_reconnect();

        // Two refused dials before the broker comes back
        connector.failing_next(2);
        connector.drop_connection();

        let handle = wait_for_generation(&mut channels, 1).await;
        assert_eq!(handle.generation, 1);
        assert_eq!(handle.channel, 3); // initial dial + 2 failures + success
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.is_connected().await);
        assert_eq!(metrics.snapshot().reconnects, 1);

        // And again on the replacement transport
        connector.drop_connection();
        let handle = wait_for_generation(&mut channels, 2).await;
        assert_eq!(handle.generation, 2);

        manager.close().await.unwrap();
        timeout(Duration::from_secs(5), watcher).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_stops_watcher_without_reconnect() {
        let connector = FakeConnector::default();
        let manager =
            ConnectionManager::connect(connector.clone(), HEARTBEAT, Arc::new(Metrics::new()))
                .await
                .unwrap();
        let watcher = manager.enable_auto_reconnect();

        manager.close().await.unwrap();
        // second close is a no-op
        manager.close().await.unwrap();

        timeout(Duration::from_secs(5), watcher).await.unwrap().unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.channel().generation, 0);
    }

    #[tokio::test]
    async fn test_liveness_loop_ends_after_close() {
        let connector = FakeConnector::default();
        let manager = ConnectionManager::connect(connector, HEARTBEAT, Arc::new(Metrics::new()))
            .await
            .unwrap();
        let liveness = manager.watch_liveness();

        tokio::time::sleep(HEARTBEAT * 3).await;
        assert!(!liveness.is_finished());

        manager.close().await.unwrap();
        timeout(Duration::from_secs(5), liveness).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_during_redial_leaves_no_open_transport() {
        let connector = FakeConnector::default();
        let manager =
            ConnectionManager::connect(connector.clone(), HEARTBEAT, Arc::new(Metrics::new()))
                .await
                .unwrap();
        let watcher = manager.enable_auto_reconnect();

        connector.hold_dials();
        connector.drop_connection();
        timeout(Duration::from_secs(5), connector.gate.entered.notified())
            .await
            .expect("redial never started");

        // shutdown lands while the redial is in flight
        manager.close().await.unwrap();
        connector.gate.release.notify_one();

        timeout(Duration::from_secs(5), watcher)
            .await
            .expect("reconnect watcher hung after close")
            .unwrap();
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(connector.latest_closure(), Some(Closure::Requested));
        assert_eq!(manager.channel().generation, 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }
}
