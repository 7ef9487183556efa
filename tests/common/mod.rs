#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use rs_sqs_dispatcher::dispatcher::MESSAGE_TYPE_KEY;
use rs_sqs_dispatcher::errors::{HandlerError, SubscriberError};
use rs_sqs_dispatcher::handler::OutboundMessageHandler;
use rs_sqs_dispatcher::message::{DeadLetterReason, InboundMessage, PropertyValue};
use rs_sqs_dispatcher::receiver::SubscriberConfig;
use rs_sqs_dispatcher::requests::{FirstRequest, SecondRequest};
use rs_sqs_dispatcher::session::{Delivery, QueueSession};
use tokio::io::{AsyncRead, ReadBuf};

pub const QUEUE_NAME: &str = "outbound";

pub fn test_config() -> SubscriberConfig {
    SubscriberConfig {
        wait_time_seconds: 0,
        max_receive_failures: 3,
        receive_retry_delay_ms: 10,
        ..Default::default()
    }
}

pub fn tagged(correlation_id: &str, message_type: &str, body: &str) -> InboundMessage {
    let mut properties = HashMap::new();
    properties.insert(
        MESSAGE_TYPE_KEY.to_string(),
        PropertyValue::String(message_type.to_string()),
    );
    InboundMessage::from_bytes(correlation_id, properties, body)
}

pub fn untagged(correlation_id: &str, body: &str) -> InboundMessage {
    InboundMessage::from_bytes(correlation_id, HashMap::new(), body)
}

/// A body stream that fails on the first read.
pub struct FailingReader;

impl AsyncRead for FailingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "stream truncated",
        )))
    }
}

pub fn unreadable(correlation_id: &str, message_type: Option<&str>) -> InboundMessage {
    let mut properties = HashMap::new();
    if let Some(message_type) = message_type {
        properties.insert(
            MESSAGE_TYPE_KEY.to_string(),
            PropertyValue::String(message_type.to_string()),
        );
    }
    InboundMessage::new(correlation_id, properties, Box::pin(FailingReader))
}

#[derive(Default)]
pub struct RecordingHandler {
    pub first_calls: Mutex<Vec<FirstRequest>>,
    pub second_calls: Mutex<Vec<SecondRequest>>,
    pub fail_second: bool,
    pub panic_on_first: bool,
}

impl RecordingHandler {
    pub fn failing_second() -> Self {
        RecordingHandler {
            fail_second: true,
            ..Default::default()
        }
    }

    pub fn panicking_first() -> Self {
        RecordingHandler {
            panic_on_first: true,
            ..Default::default()
        }
    }

    pub fn first_calls(&self) -> Vec<FirstRequest> {
        self.first_calls.lock().unwrap().clone()
    }

    pub fn second_calls(&self) -> Vec<SecondRequest> {
        self.second_calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.first_calls.lock().unwrap().len() + self.second_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl OutboundMessageHandler for RecordingHandler {
    async fn handle_first(&self, request: FirstRequest) -> Result<(), HandlerError> {
        if self.panic_on_first {
            panic!("handler exploded on {}", request.field);
        }
        self.first_calls.lock().unwrap().push(request);
        Ok(())
    }

    async fn handle_second(&self, request: SecondRequest) -> Result<(), HandlerError> {
        let reference = request.reference.clone();
        self.second_calls.lock().unwrap().push(request);
        if self.fail_second {
            return Err(format!("downstream unavailable for {reference}").into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterRecord {
    pub correlation_id: String,
    pub reason: DeadLetterReason,
    pub description: String,
}

#[derive(Default)]
struct MemoryQueue {
    inbox: Mutex<VecDeque<InboundMessage>>,
    completed: Mutex<Vec<String>>,
    dead_lettered: Mutex<Vec<DeadLetterRecord>>,
    fail_open: AtomicBool,
    receive_failures: AtomicU32,
    opened: AtomicBool,
    closed: AtomicBool,
}

/// In-memory [`QueueSession`]; clones share the same queue.
#[derive(Clone, Default)]
pub struct MemorySession {
    queue: Arc<MemoryQueue>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: InboundMessage) {
        self.queue.inbox.lock().unwrap().push_back(message);
    }

    pub fn fail_open(&self) {
        self.queue.fail_open.store(true, Ordering::SeqCst);
    }

    /// The next `count` receive calls fail.
    pub fn fail_receives(&self, count: u32) {
        self.queue.receive_failures.store(count, Ordering::SeqCst);
    }

    pub fn completed(&self) -> Vec<String> {
        self.queue.completed.lock().unwrap().clone()
    }

    pub fn dead_lettered(&self) -> Vec<DeadLetterRecord> {
        self.queue.dead_lettered.lock().unwrap().clone()
    }

    pub fn resolved_count(&self) -> usize {
        self.completed().len() + self.dead_lettered().len()
    }

    pub fn is_open(&self) -> bool {
        self.queue.opened.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.queue.closed.load(Ordering::SeqCst)
    }

    /// Polls until `count` messages are resolved, panicking after five seconds.
    pub async fn wait_for_resolutions(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.resolved_count() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "timed out waiting for {count} resolutions, got {}",
                self.resolved_count()
            )
        });
    }

    pub async fn wait_until_closed(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !self.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session was never closed");
    }
}

#[async_trait]
impl QueueSession for MemorySession {
    type Receipt = String;

    async fn open(&self) -> Result<(), SubscriberError> {
        if self.queue.fail_open.load(Ordering::SeqCst) {
            return Err(SubscriberError::connection(QUEUE_NAME, "queue does not exist"));
        }
        self.queue.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: i32,
        _wait: Duration,
    ) -> Result<Vec<Delivery<String>>, SubscriberError> {
        let remaining_failures = self.queue.receive_failures.load(Ordering::SeqCst);
        if remaining_failures > 0 {
            self.queue
                .receive_failures
                .store(remaining_failures - 1, Ordering::SeqCst);
            return Err(SubscriberError::connection(QUEUE_NAME, "network unreachable"));
        }

        let batch: Vec<Delivery<String>> = {
            let mut inbox = self.queue.inbox.lock().unwrap();
            let take = (max_messages.max(0) as usize).min(inbox.len());
            inbox
                .drain(..take)
                .map(|message| Delivery {
                    receipt: message.correlation_id().to_string(),
                    message,
                })
                .collect()
        };

        if batch.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(batch)
    }

    async fn complete(&self, receipt: String) -> Result<(), SubscriberError> {
        self.queue.completed.lock().unwrap().push(receipt);
        Ok(())
    }

    async fn dead_letter(
        &self,
        receipt: String,
        reason: DeadLetterReason,
        description: &str,
    ) -> Result<(), SubscriberError> {
        self.queue.dead_lettered.lock().unwrap().push(DeadLetterRecord {
            correlation_id: receipt,
            reason,
            description: description.to_string(),
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), SubscriberError> {
        self.queue.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn queue_name(&self) -> &str {
        QUEUE_NAME
    }
}
