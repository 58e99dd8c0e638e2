//! Bounded in-memory broker with produce and consume operations

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::sync::Notify;

use streambench_core::{
    Compression, Configuration, Operation, OperationError, OperationOutput, SubscriptionType,
};

use crate::error::BackendError;

/// How long a consume waits for a message before counting as empty
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// One queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Producer-assigned sequence number
    pub sequence: u64,
    /// Payload as stored (compressed when `compressed` is set)
    pub payload: Vec<u8>,
    /// Payload is LZ4 block data with a prepended size
    pub compressed: bool,
}

/// Bounded FIFO shared by producers and consumers
///
/// Every message is delivered to exactly one consumer.
#[derive(Debug)]
pub struct MemoryBroker {
    queue: Mutex<VecDeque<Message>>,
    capacity: usize,
    available: Notify,
    closed: AtomicBool,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl MemoryBroker {
    /// Create a broker holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64 * 1024))),
            capacity,
            available: Notify::new(),
            closed: AtomicBool::new(false),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Create a broker sized by `queue_size`
    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.queue_size)
    }

    /// Enqueue without waiting
    pub fn try_publish(&self, message: Message) -> Result<(), BackendError> {
        if self.is_closed() {
            return Err(BackendError::Closed);
        }
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                return Err(BackendError::QueueFull {
                    capacity: self.capacity,
                });
            }
            queue.push_back(message);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        Ok(())
    }

    /// Dequeue without waiting
    pub fn try_receive(&self) -> Option<Message> {
        let message = self.queue.lock().pop_front();
        if message.is_some() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        message
    }

    /// Dequeue, waiting up to `timeout` for a message
    pub async fn receive(&self, timeout: Duration) -> Result<Message, BackendError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_receive() {
                return Ok(message);
            }
            if self.is_closed() {
                return Err(BackendError::Closed);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(BackendError::ReceiveTimeout(timeout));
            }
        }
    }

    /// Reject further publishes and wake every waiting consumer
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.available.notify_waiters();
    }

    /// True after [`close`](Self::close)
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Messages currently queued
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum queued messages
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages accepted so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Messages handed to consumers so far
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Publishes one `payload_size` message per call
pub struct ProduceOperation {
    broker: Arc<MemoryBroker>,
    template: Vec<u8>,
    compression: Compression,
    sequence: AtomicU64,
}

impl ProduceOperation {
    /// Create a producer for `broker` using payload and compression settings of `config`
    pub fn new(broker: Arc<MemoryBroker>, config: &Configuration) -> Self {
        if !matches!(config.compression, Compression::None | Compression::Lz4) {
            tracing::warn!(
                compression = %config.compression,
                "Codec not supported by the in-memory broker, payloads sent uncompressed"
            );
        }
        if config.batching.enabled {
            tracing::debug!(
                max_messages = config.batching.max_messages,
                "In-memory broker publishes each message immediately"
            );
        }

        let template = rand::rng()
            .sample_iter(Alphanumeric)
            .take(config.payload_size)
            .collect();

        Self {
            broker,
            template,
            compression: config.compression,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish until the broker is full; returns number of messages published
    pub fn fill(&self) -> u64 {
        let mut published = 0;
        while self.broker.try_publish(self.next_message()).is_ok() {
            published += 1;
        }
        published
    }

    fn next_message(&self) -> Message {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let mut payload = self.template.clone();
        let stamp = sequence.to_be_bytes();
        let n = stamp.len().min(payload.len());
        payload[..n].copy_from_slice(&stamp[..n]);

        match self.compression {
            Compression::Lz4 => Message {
                sequence,
                payload: lz4_flex::compress_prepend_size(&payload),
                compressed: true,
            },
            _ => Message {
                sequence,
                payload,
                compressed: false,
            },
        }
    }
}

#[async_trait]
impl Operation for ProduceOperation {
    fn name(&self) -> &str {
        "produce"
    }

    async fn perform(&self) -> Result<OperationOutput, OperationError> {
        self.broker.try_publish(self.next_message())?;
        Ok(OperationOutput::bytes(self.template.len() as u64))
    }
}

/// Receives one message per call
pub struct ConsumeOperation {
    broker: Arc<MemoryBroker>,
    subscription: SubscriptionType,
    receive_timeout: Duration,
}

impl ConsumeOperation {
    /// Create a consumer for `broker`
    pub fn new(broker: Arc<MemoryBroker>, config: &Configuration) -> Self {
        if config.subscription != SubscriptionType::Shared {
            tracing::debug!(
                subscription = %config.subscription,
                "In-memory broker delivers each message to one consumer"
            );
        }
        Self {
            broker,
            subscription: config.subscription,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }

    /// Override how long a consume waits for a message
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Requested subscription mode
    pub fn subscription(&self) -> SubscriptionType {
        self.subscription
    }
}

#[async_trait]
impl Operation for ConsumeOperation {
    fn name(&self) -> &str {
        "consume"
    }

    async fn perform(&self) -> Result<OperationOutput, OperationError> {
        let message = self.broker.receive(self.receive_timeout).await?;
        let bytes = if message.compressed {
            lz4_flex::decompress_size_prepended(&message.payload)
                .map_err(|e| BackendError::Decompress(e.to_string()))?
                .len()
        } else {
            message.payload.len()
        };
        Ok(OperationOutput::bytes(bytes as u64))
    }
}
