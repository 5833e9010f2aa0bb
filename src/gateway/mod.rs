//! Gateway lifecycle: composes the broker client, worker pool and
//! throughput counter, and coordinates drain-on-shutdown.

pub mod counter;
pub mod dispatcher;

pub use counter::RequestCounter;
pub use dispatcher::{Dispatcher, InboundMessage, ResponsePublisher};

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::ExecutionBackend;
use crate::config::Config;
use crate::mqtt::MqttClient;
use crate::utils::error::GatewayError;

use dispatcher::{QueueNack, QueueProducer};

pub struct Gateway {
    client: MqttClient,
    pump: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    counter_task: Option<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    drain_timeout: Duration,
}

impl Gateway {
    /// Wires up the queue, worker pool, broker client and counter task.
    ///
    /// The broker connection is established lazily by the event pump; the
    /// gateway is accepting work as soon as this returns.
    pub fn start(config: Config, backend: Arc<dyn ExecutionBackend>) -> Result<Self, GatewayError> {
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (sender, receiver) = flume::bounded(config.queue_capacity());

        let producer = QueueProducer::new(
            sender,
            receiver.clone(),
            config.gateway.overflow_policy,
        );
        let nack = QueueNack::new(
            config.mqtt.request_topic.clone(),
            config.mqtt.response_topic.clone(),
        );

        let (client, pump) =
            MqttClient::connect(&config.mqtt, producer, nack, shutdown_rx.clone())?;

        let counter = Arc::new(RequestCounter::new());
        let dispatcher = Arc::new(Dispatcher::new(
            config.mqtt.request_topic.clone(),
            config.mqtt.response_topic.clone(),
            backend,
            Arc::new(client.clone()),
            Arc::clone(&counter),
        ));

        info!(
            "👷 Starting {} workers (queue capacity {}, overflow policy {:?})",
            config.gateway.workers,
            config.queue_capacity(),
            config.gateway.overflow_policy
        );
        let workers = dispatcher.spawn_workers(config.gateway.workers, receiver);

        let counter_task = counter::spawn_logger(
            counter,
            Duration::from_secs(config.gateway.counter_interval_seconds),
            shutdown_rx,
        );

        Ok(Self {
            client,
            pump: Some(pump),
            workers,
            counter_task: Some(counter_task),
            shutdown: shutdown_tx,
            drain_timeout: Duration::from_secs(config.gateway.drain_timeout_seconds),
        })
    }

    /// Drain-on-shutdown protocol: stop the producer side, close the queue,
    /// let workers drain it to empty, then join everything under one hard
    /// deadline. A backend call still in flight past the deadline is
    /// abandoned.
    pub async fn stop(&mut self) {
        info!("🛑 Stopping gateway and workers...");

        // No new inbound messages after this.
        self.client.disconnect().await;
        let _ = self.shutdown.send(true);

        let deadline = Instant::now() + self.drain_timeout;

        // The pump exits first and drops the queue sender, which lets the
        // workers run the queue dry and stop.
        if let Some(pump) = self.pump.take() {
            join_with_deadline("event pump", pump, deadline).await;
        }
        for (id, worker) in self.workers.drain(..).enumerate() {
            join_with_deadline(&format!("worker {}", id), worker, deadline).await;
        }
        if let Some(task) = self.counter_task.take() {
            join_with_deadline("counter logger", task, deadline).await;
        }

        info!("Gateway and workers stopped.");
    }
}

async fn join_with_deadline(name: &str, mut handle: JoinHandle<()>, deadline: Instant) {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match tokio::time::timeout(remaining, &mut handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{} task ended abnormally: {}", name, e),
        Err(_) => {
            warn!("⚠️  {} did not finish before the drain deadline, aborting", name);
            handle.abort();
        }
    }
}
