//! Worker pool draining the bounded inbound queue.
//!
//! Every inbound message travels one pipeline: topic parse, grammar parse,
//! backend execution, response-topic rebuild, publish. A message whose topic
//! matched the request format always produces exactly one response; a
//! message whose topic does not match is logged and dropped since no
//! correlation target exists.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, warn};
use tokio::task::JoinHandle;

use crate::backend::ExecutionBackend;
use crate::config::OverflowPolicy;
use crate::mqtt::topic;
use crate::protocol::{parse_request, response};
use crate::utils::error::GatewayError;

use super::counter::RequestCounter;

/// One message delivered by the inbound subscription.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

/// Outbound publish capability consumed by the dispatcher.
#[async_trait]
pub trait ResponsePublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), GatewayError>;
}

/// Producer side of the bounded queue, applying the configured overflow
/// policy.
pub struct QueueProducer {
    sender: flume::Sender<InboundMessage>,
    receiver: flume::Receiver<InboundMessage>,
    policy: OverflowPolicy,
}

/// What happened to an enqueue attempt.
pub enum EnqueueOutcome {
    Accepted,
    /// The queue was full under the `reject` policy; the message is handed
    /// back so the caller can nack it.
    Rejected(InboundMessage),
    /// All workers are gone; the gateway is shutting down.
    Closed,
}

impl QueueProducer {
    pub fn new(
        sender: flume::Sender<InboundMessage>,
        receiver: flume::Receiver<InboundMessage>,
        policy: OverflowPolicy,
    ) -> Self {
        Self {
            sender,
            receiver,
            policy,
        }
    }

    pub async fn enqueue(&self, message: InboundMessage) -> EnqueueOutcome {
        match self.policy {
            OverflowPolicy::Block => match self.sender.send_async(message).await {
                Ok(()) => EnqueueOutcome::Accepted,
                Err(_) => EnqueueOutcome::Closed,
            },
            OverflowPolicy::Reject => match self.sender.try_send(message) {
                Ok(()) => EnqueueOutcome::Accepted,
                Err(flume::TrySendError::Full(message)) => EnqueueOutcome::Rejected(message),
                Err(flume::TrySendError::Disconnected(_)) => EnqueueOutcome::Closed,
            },
            OverflowPolicy::DropOldest => {
                let mut message = message;
                loop {
                    match self.sender.try_send(message) {
                        Ok(()) => return EnqueueOutcome::Accepted,
                        Err(flume::TrySendError::Full(returned)) => {
                            message = returned;
                            if let Ok(dropped) = self.receiver.try_recv() {
                                warn!("Queue full, dropping oldest message from {}", dropped.topic);
                            }
                        }
                        Err(flume::TrySendError::Disconnected(_)) => return EnqueueOutcome::Closed,
                    }
                }
            }
        }
    }
}

/// Builds the nack response for a message rejected at enqueue time.
///
/// Returns `None` when the inbound topic does not match the request format,
/// in which case there is nothing to answer to.
pub struct QueueNack {
    request_format: String,
    response_format: String,
}

impl QueueNack {
    pub fn new(request_format: String, response_format: String) -> Self {
        Self {
            request_format,
            response_format,
        }
    }

    pub fn response_for(&self, message: &InboundMessage) -> Option<(String, String)> {
        let values = topic::parse_topic(&message.topic, &self.request_format).ok()?;
        let response_topic = topic::build_topic(&self.response_format, &values).ok()?;
        // Best-effort cookie recovery from the payload's second token.
        let cookie = message
            .payload
            .split_whitespace()
            .nth(1)
            .and_then(|token| token.parse::<u64>().ok())
            .unwrap_or(0);
        Some((
            response_topic,
            response::failure(cookie, &GatewayError::QueueFull),
        ))
    }
}

pub struct Dispatcher {
    request_format: String,
    response_format: String,
    backend: Arc<dyn ExecutionBackend>,
    publisher: Arc<dyn ResponsePublisher>,
    counter: Arc<RequestCounter>,
}

impl Dispatcher {
    pub fn new(
        request_format: String,
        response_format: String,
        backend: Arc<dyn ExecutionBackend>,
        publisher: Arc<dyn ResponsePublisher>,
        counter: Arc<RequestCounter>,
    ) -> Self {
        Self {
            request_format,
            response_format,
            backend,
            publisher,
            counter,
        }
    }

    /// Starts the worker pool. Each worker drains the queue until it is
    /// closed and empty, processing one message at a time.
    pub fn spawn_workers(
        self: &Arc<Self>,
        workers: usize,
        receiver: flume::Receiver<InboundMessage>,
    ) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|id| {
                let dispatcher = Arc::clone(self);
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    debug!("Worker {} started", id);
                    while let Ok(message) = receiver.recv_async().await {
                        dispatcher.process_message(message).await;
                    }
                    debug!("Worker {} drained and exiting", id);
                })
            })
            .collect()
    }

    pub async fn process_message(&self, message: InboundMessage) {
        self.counter.increment();

        let placeholders = match topic::parse_topic(&message.topic, &self.request_format) {
            Ok(values) => values,
            Err(e) => {
                warn!("Failed to parse topic {:?}: {}", message.topic, e);
                return;
            }
        };

        let response_text = self.handle_payload(&message.payload).await;
        self.publish_response(&placeholders, &response_text).await;
    }

    async fn handle_payload(&self, payload: &str) -> String {
        match parse_request(payload) {
            Err(failure) => {
                warn!("Invalid request: {}", failure.error);
                response::failure(failure.cookie, &failure.error)
            }
            Ok(request) => match self.backend.execute(&request).await {
                Ok(results) => response::success(request.cookie, &results),
                Err(e) => {
                    error!("Modbus query failed: {}", e);
                    response::failure(request.cookie, &e)
                }
            },
        }
    }

    async fn publish_response(&self, placeholders: &HashMap<String, String>, text: &str) {
        let response_topic = match topic::build_topic(&self.response_format, placeholders) {
            Ok(topic) => topic,
            Err(e) => {
                error!("Failed to build response topic: {}", e);
                return;
            }
        };

        if let Err(e) = self.publisher.publish(&response_topic, text).await {
            error!(
                "Failed to publish response to topic {}: {}",
                response_topic, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use crate::protocol::OperationRequest;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    const REQUEST_FORMAT: &str = "modbus/{device}/request";
    const RESPONSE_FORMAT: &str = "modbus/{device}/response";

    struct ScriptedBackend {
        results: Vec<u16>,
    }

    #[async_trait]
    impl ExecutionBackend for ScriptedBackend {
        async fn execute(&self, _request: &OperationRequest) -> Result<Vec<u16>, GatewayError> {
            Ok(self.results.clone())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ExecutionBackend for FailingBackend {
        async fn execute(&self, _request: &OperationRequest) -> Result<Vec<u16>, GatewayError> {
            Err(GatewayError::BackendFailure(
                "failed to connect to Modbus server: connection refused".to_string(),
            ))
        }
    }

    #[derive(Default)]
    struct CapturingPublisher {
        published: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ResponsePublisher for CapturingPublisher {
        async fn publish(&self, topic: &str, payload: &str) -> Result<(), GatewayError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    fn dispatcher(backend: Arc<dyn ExecutionBackend>) -> (Arc<Dispatcher>, Arc<CapturingPublisher>) {
        let publisher = Arc::new(CapturingPublisher::default());
        let dispatcher = Arc::new(Dispatcher::new(
            REQUEST_FORMAT.to_string(),
            RESPONSE_FORMAT.to_string(),
            backend,
            Arc::clone(&publisher) as Arc<dyn ResponsePublisher>,
            Arc::new(RequestCounter::new()),
        ));
        (dispatcher, publisher)
    }

    fn message(topic: &str, payload: &str) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_read_publishes_results() {
        let (dispatcher, publisher) = dispatcher(Arc::new(ScriptedBackend {
            results: vec![10, 20, 30, 40],
        }));

        dispatcher
            .process_message(message(
                "modbus/dev1/request",
                "CMD 42 ACT 10.0.0.5 502 5 1 3 100 4",
            ))
            .await;

        let published = publisher.published.lock().unwrap();
        assert_eq!(
            *published,
            vec![(
                "modbus/dev1/response".to_string(),
                "42 OK 10 20 30 40".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_successful_write_publishes_bare_ok() {
        let (dispatcher, publisher) = dispatcher(Arc::new(ScriptedBackend { results: vec![] }));

        dispatcher
            .process_message(message(
                "modbus/dev1/request",
                "CMD 7 ACT host 502 5 1 16 10 2 5,9",
            ))
            .await;

        let published = publisher.published.lock().unwrap();
        assert_eq!(published[0].1, "7 OK");
    }

    #[tokio::test]
    async fn test_parse_failure_is_published_with_cookie_zero() {
        let (dispatcher, publisher) = dispatcher(Arc::new(ScriptedBackend { results: vec![] }));

        dispatcher
            .process_message(message("modbus/dev1/request", "CMD 42 ACT"))
            .await;

        let published = publisher.published.lock().unwrap();
        assert_eq!(
            *published,
            vec![(
                "modbus/dev1/response".to_string(),
                "0 ERROR: incomplete request payload".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_count_mismatch_echoes_cookie() {
        let (dispatcher, publisher) = dispatcher(Arc::new(ScriptedBackend { results: vec![] }));

        dispatcher
            .process_message(message(
                "modbus/dev1/request",
                "CMD 3 ACT host 502 5 1 16 1 2 5",
            ))
            .await;

        let published = publisher.published.lock().unwrap();
        assert_eq!(
            published[0].1,
            "3 ERROR: mismatch between REGISTER_COUNT and DATA length"
        );
    }

    #[tokio::test]
    async fn test_backend_failure_is_published_as_error() {
        let (dispatcher, publisher) = dispatcher(Arc::new(FailingBackend));

        dispatcher
            .process_message(message(
                "modbus/dev1/request",
                "CMD 9 ACT host 502 5 1 3 1 1",
            ))
            .await;

        let published = publisher.published.lock().unwrap();
        assert_eq!(
            published[0].1,
            "9 ERROR: failed to connect to Modbus server: connection refused"
        );
    }

    #[tokio::test]
    async fn test_unmatched_topic_is_dropped_without_response() {
        let (dispatcher, publisher) = dispatcher(Arc::new(ScriptedBackend { results: vec![] }));

        dispatcher
            .process_message(message("other/dev1/thing", "CMD 1 ACT host 502 5 1 3 1 1"))
            .await;

        assert!(publisher.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counter_increments_regardless_of_outcome() {
        let publisher = Arc::new(CapturingPublisher::default());
        let counter = Arc::new(RequestCounter::new());
        let dispatcher = Dispatcher::new(
            REQUEST_FORMAT.to_string(),
            RESPONSE_FORMAT.to_string(),
            Arc::new(ScriptedBackend { results: vec![] }),
            publisher,
            Arc::clone(&counter),
        );

        dispatcher
            .process_message(message("bad/topic", "irrelevant"))
            .await;
        dispatcher
            .process_message(message("modbus/dev1/request", "short"))
            .await;

        assert_eq!(counter.sample_and_reset(), 2);
    }

    #[tokio::test]
    async fn test_worker_pool_answers_every_message_with_its_cookie() {
        const WORKERS: usize = 4;
        const MESSAGES: u64 = 32;

        let (dispatcher, publisher) = dispatcher(Arc::new(DummyBackend::default()));
        let (sender, receiver) = flume::bounded(WORKERS * 10);
        let handles = dispatcher.spawn_workers(WORKERS, receiver);

        for cookie in 0..MESSAGES {
            let msg = message(
                &format!("modbus/dev{}/request", cookie),
                &format!("CMD {} ACT host 502 5 1 3 1 1", cookie),
            );
            sender.send_async(msg).await.unwrap();
        }
        drop(sender);
        for handle in handles {
            handle.await.unwrap();
        }

        let published = publisher.published.lock().unwrap();
        assert_eq!(published.len(), MESSAGES as usize);
        let answered: BTreeSet<(String, String)> = published.iter().cloned().collect();
        for cookie in 0..MESSAGES {
            let expected = (
                format!("modbus/dev{}/response", cookie),
                format!("{} OK 1", cookie),
            );
            assert!(answered.contains(&expected), "missing response {:?}", expected);
        }
    }

    #[tokio::test]
    async fn test_reject_policy_hands_back_overflow() {
        let (sender, receiver) = flume::bounded(1);
        let producer = QueueProducer::new(sender, receiver, OverflowPolicy::Reject);

        assert!(matches!(
            producer.enqueue(message("modbus/a/request", "x")).await,
            EnqueueOutcome::Accepted
        ));
        assert!(matches!(
            producer.enqueue(message("modbus/b/request", "y")).await,
            EnqueueOutcome::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn test_drop_oldest_policy_evicts_head() {
        let (sender, receiver) = flume::bounded(1);
        let producer = QueueProducer::new(sender, receiver.clone(), OverflowPolicy::DropOldest);

        producer.enqueue(message("modbus/a/request", "first")).await;
        producer.enqueue(message("modbus/b/request", "second")).await;

        let queued = receiver.try_recv().unwrap();
        assert_eq!(queued.payload, "second");
    }

    #[test]
    fn test_nack_recovers_cookie_and_response_topic() {
        let nack = QueueNack::new(REQUEST_FORMAT.to_string(), RESPONSE_FORMAT.to_string());
        let (topic, text) = nack
            .response_for(&message(
                "modbus/dev1/request",
                "CMD 42 ACT host 502 5 1 3 1 1",
            ))
            .unwrap();
        assert_eq!(topic, "modbus/dev1/response");
        assert_eq!(text, "42 ERROR: gateway queue full");
    }

    #[test]
    fn test_nack_gives_up_on_unmatched_topic() {
        let nack = QueueNack::new(REQUEST_FORMAT.to_string(), RESPONSE_FORMAT.to_string());
        assert!(nack.response_for(&message("junk", "CMD 1")).is_none());
    }
}
