//! Process wiring: broker, backends and one worker loop per topic

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backends::{Dispatcher, Topic, build_client};
use crate::broker::{
    AmqpConnectionManager, AmqpConnector, AmqpConsumer, AmqpPublisher, BrokerChannel, BrokerError,
    ChannelHandle, ExchangeConfig, TopicConfig,
};
use crate::config::{Config, TopologyConfig};
use crate::observability::Metrics;
use crate::worker::Worker;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Upper bound on waiting for in-flight deliveries after close
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run until SIGINT/SIGTERM.
///
/// Every broker setup step before the signal wait is fatal.
pub async fn run(config: Config) -> Result<(), AnyError> {
    info!(
        broker = %config.broker.redacted_uri(),
        workers = config.worker.number_of_workers,
        cobalt = config.services.cobalt.enable,
        ytdl = config.services.ytdl.enable,
        "Starting downly worker"
    );

    let metrics = Arc::new(Metrics::new());
    let connector = AmqpConnector::from_config(&config.broker, &config.worker);
    let manager = AmqpConnectionManager::connect(
        connector,
        config.broker.heartbeat_interval.as_duration(),
        metrics.clone(),
    )
    .await?;
    let liveness = manager.watch_liveness();

    let topology = &config.topology;
    let publisher = AmqpPublisher::declare(
        manager.subscribe(),
        ExchangeConfig {
            name: topology.event_exchange.clone(),
            kind: topology.event_exchange_type,
            durable: topology.durable,
        },
    )
    .await?;

    let services = Arc::new(config.services.clone());
    let dispatcher = Dispatcher::new(services, build_client(&config.http)?);
    for topic in Topic::ALL.into_iter().filter(|topic| !dispatcher.is_enabled(*topic)) {
        warn!(topic = topic.as_str(), "Backend disabled, its deliveries will be rejected");
    }

    let worker = Arc::new(Worker::new(
        dispatcher,
        Arc::new(publisher),
        topology.success_routing_key.clone(),
        metrics.clone(),
    ));

    let loops = spawn_topic_loops(&worker, manager.subscribe(), topology).await?;

    let reconnect = manager.enable_auto_reconnect();
    info!(topics = loops.len(), "Worker ready");

    shutdown_signal().await;

    if let Err(e) = manager.close().await {
        error!(error = %e, "Broker close failed");
    }
    liveness.abort();

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async move {
        let _ = reconnect.await;
        // last sender of the channel watch goes with the manager, which ends every consumer
        drop(manager);
        join_all(loops).await;
    })
    .await;
    if drained.is_err() {
        warn!("Worker loops did not finish in time");
    }

    info!(stats = ?metrics.snapshot(), "Downly worker stopped");
    Ok(())
}

/// Subscribe every topic and start its loop.
///
/// Topics whose backend is disabled are consumed too so their deliveries
/// get rejected instead of piling up unacknowledged.
async fn spawn_topic_loops<Ch: BrokerChannel>(
    worker: &Arc<Worker>,
    channels: watch::Receiver<ChannelHandle<Ch>>,
    topology: &TopologyConfig,
) -> Result<Vec<JoinHandle<()>>, BrokerError> {
    let mut loops = Vec::with_capacity(Topic::ALL.len());
    for topic in Topic::ALL {
        let consumer = AmqpConsumer::subscribe(channels.clone(), topic_config(topology, topic)).await?;
        loops.push(worker.spawn(consumer, topic.as_str()));
    }
    Ok(loops)
}

fn topic_config(topology: &TopologyConfig, topic: Topic) -> TopicConfig {
    let (queue, routing_key) = match topic {
        Topic::Cobalt => (&topology.cobalt_queue, &topology.cobalt_routing_key),
        Topic::Ytdl => (&topology.ytdl_queue, &topology.ytdl_routing_key),
    };

    TopicConfig {
        name: topic.as_str().to_string(),
        queue: queue.clone(),
        exchange: topology.queue_exchange.clone(),
        durable: topology.durable,
        routing_key: routing_key.clone(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
