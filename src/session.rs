//! Queue sessions: the connection-level side of a subscription.
//!
//! A [`QueueSession`] knows how to pull deliveries from one queue and how to
//! resolve them afterwards. The pump in [`crate::receiver`] only talks to this
//! trait, so the dispatch pipeline can run against SQS or against an in-memory
//! queue in tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::{Message, MessageAttributeValue, MessageSystemAttributeName};
use tokio::sync::OnceCell;

use crate::errors::SubscriberError;
use crate::message::{
    CORRELATION_ID_KEY, DeadLetterReason, InboundMessage, MESSAGE_TYPE_KEY, PropertyValue,
};

/// Attribute added to dead-lettered messages holding the machine-readable reason.
pub const DEAD_LETTER_REASON_KEY: &str = "DeadLetterReason";

/// Attribute added to dead-lettered messages holding the human-readable description.
pub const DEAD_LETTER_DESCRIPTION_KEY: &str = "DeadLetterErrorDescription";

/// SQS rejects messages carrying more attributes than this.
pub const MAX_MESSAGE_ATTRIBUTES: usize = 10;

/// Message group used for dead-lettered copies of messages that had none.
pub const DEAD_LETTER_GROUP_ID: &str = "dead-letter";

/// A message handed out by a session, together with what the session needs to
/// resolve it later.
pub struct Delivery<R> {
    pub message: InboundMessage,
    pub receipt: R,
}

#[async_trait]
pub trait QueueSession: Send + Sync + 'static {
    /// Opaque token identifying a delivery for `complete` and `dead_letter`.
    type Receipt: Send + 'static;

    /// Opens the session. Fails with [`SubscriberError::Connection`] when the queue is unreachable.
    async fn open(&self) -> Result<(), SubscriberError>;

    /// Waits up to `wait` for at most `max_messages` deliveries.
    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<Delivery<Self::Receipt>>, SubscriberError>;

    async fn complete(&self, receipt: Self::Receipt) -> Result<(), SubscriberError>;

    async fn dead_letter(
        &self,
        receipt: Self::Receipt,
        reason: DeadLetterReason,
        description: &str,
    ) -> Result<(), SubscriberError>;

    /// Releases the session. Called once when the pump exits, whatever the cause.
    async fn close(&self) -> Result<(), SubscriberError>;

    fn queue_name(&self) -> &str;
}

#[derive(Debug, Clone)]
struct QueueUrls {
    source: String,
    dead_letter: String,
}

/// Receipt of an SQS delivery: the handle to delete it plus the original
/// payload, so a dead-lettered copy can be sent unmodified.
#[derive(Debug, Clone)]
pub struct SqsReceipt {
    pub message_id: String,
    pub receipt_handle: String,
    message_group_id: Option<String>,
    body: String,
    attributes: HashMap<String, MessageAttributeValue>,
}

/// [`QueueSession`] backed by AWS SQS.
///
/// SQS has no native "dead-letter with reason" call, so dead-lettering sends a
/// copy of the message to a second queue with two extra attributes and then
/// deletes the original.
pub struct SqsSession {
    sqs_client: aws_sdk_sqs::Client,
    queue_name: String,
    dead_letter_queue_name: String,
    urls: OnceCell<QueueUrls>,
}

impl SqsSession {
    pub fn new(
        sqs_client: aws_sdk_sqs::Client,
        queue_name: &str,
        dead_letter_queue_name: &str,
    ) -> Self {
        SqsSession {
            sqs_client,
            queue_name: queue_name.to_string(),
            dead_letter_queue_name: dead_letter_queue_name.to_string(),
            urls: OnceCell::new(),
        }
    }

    async fn resolve_url(&self, queue_name: &str) -> Result<String, SubscriberError> {
        let output = self
            .sqs_client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| {
                SubscriberError::connection(queue_name, DisplayErrorContext(&e).to_string())
            })?;

        output
            .queue_url()
            .map(str::to_string)
            .ok_or_else(|| SubscriberError::connection(queue_name, "queue url missing in response"))
    }

    fn urls(&self) -> Result<&QueueUrls, SubscriberError> {
        self.urls
            .get()
            .ok_or_else(|| SubscriberError::connection(&self.queue_name, "session is not open"))
    }

    async fn delete(&self, receipt: &SqsReceipt) -> Result<(), SubscriberError> {
        let urls = self.urls()?;
        self.sqs_client
            .delete_message()
            .queue_url(&urls.source)
            .receipt_handle(&receipt.receipt_handle)
            .send()
            .await
            .map_err(|e| {
                SubscriberError::resolution(&receipt.message_id, DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }

    fn into_delivery(message: &Message) -> Option<Delivery<SqsReceipt>> {
        let message_id = message.message_id()?.to_string();
        let receipt_handle = message.receipt_handle()?.to_string();
        let body = message.body().unwrap_or_default().to_string();
        let attributes = message.message_attributes().cloned().unwrap_or_default();
        let message_group_id = message
            .attributes()
            .and_then(|system| system.get(&MessageSystemAttributeName::MessageGroupId))
            .cloned();

        let properties: HashMap<String, PropertyValue> = attributes
            .iter()
            .filter_map(|(key, value)| property_value(value).map(|v| (key.clone(), v)))
            .collect();

        let correlation_id = properties
            .get(CORRELATION_ID_KEY)
            .and_then(PropertyValue::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| message_id.clone());

        Some(Delivery {
            message: InboundMessage::from_bytes(correlation_id, properties, body.clone()),
            receipt: SqsReceipt {
                message_id,
                receipt_handle,
                message_group_id,
                body,
                attributes,
            },
        })
    }
}

fn property_value(value: &MessageAttributeValue) -> Option<PropertyValue> {
    let data_type = value.data_type();
    if data_type.starts_with("Binary") {
        value
            .binary_value()
            .map(|blob| PropertyValue::Binary(blob.as_ref().to_vec()))
    } else if data_type.starts_with("Number") {
        value
            .string_value()
            .map(|v| PropertyValue::Number(v.to_string()))
    } else {
        value
            .string_value()
            .map(|v| PropertyValue::String(v.to_string()))
    }
}

/// Picks the original attributes that fit on a dead-lettered copy next to
/// the reason and description.
///
/// The type tag and correlation id are kept first, the rest in key order
/// until the limit is reached. Returns the kept attributes and the names of
/// the dropped ones.
fn budget_attributes(
    attributes: &HashMap<String, MessageAttributeValue>,
) -> (HashMap<String, MessageAttributeValue>, Vec<String>) {
    let limit = MAX_MESSAGE_ATTRIBUTES - 2;
    let is_dead_letter_key =
        |key: &str| key == DEAD_LETTER_REASON_KEY || key == DEAD_LETTER_DESCRIPTION_KEY;

    let mut kept = HashMap::new();
    for key in [MESSAGE_TYPE_KEY, CORRELATION_ID_KEY] {
        if let Some(value) = attributes.get(key) {
            kept.insert(key.to_string(), value.clone());
        }
    }

    let mut others: Vec<&String> = attributes
        .keys()
        .filter(|key| !kept.contains_key(*key) && !is_dead_letter_key(key))
        .collect();
    others.sort();

    let mut dropped = Vec::new();
    for key in others {
        if kept.len() < limit {
            kept.insert(key.clone(), attributes[key].clone());
        } else {
            dropped.push(key.clone());
        }
    }

    (kept, dropped)
}

/// Message group and deduplication ids required when the dead-letter queue is FIFO.
fn fifo_ids(dead_letter_url: &str, receipt: &SqsReceipt) -> Option<(String, String)> {
    if !dead_letter_url.ends_with(".fifo") {
        return None;
    }
    let group_id = receipt
        .message_group_id
        .clone()
        .unwrap_or_else(|| DEAD_LETTER_GROUP_ID.to_string());
    Some((group_id, receipt.message_id.clone()))
}

fn string_attribute(value: &str) -> Result<MessageAttributeValue, SubscriberError> {
    MessageAttributeValue::builder()
        .data_type("String")
        .string_value(value)
        .build()
        .map_err(|e| SubscriberError::GenericError(e.to_string().into()))
}

#[async_trait]
impl QueueSession for SqsSession {
    type Receipt = SqsReceipt;

    async fn open(&self) -> Result<(), SubscriberError> {
        self.urls
            .get_or_try_init(|| async {
                let source = self.resolve_url(&self.queue_name).await?;
                let dead_letter = self.resolve_url(&self.dead_letter_queue_name).await?;
                tracing::info!(queue = %self.queue_name, url = %source, "queue session opened");
                Ok::<_, SubscriberError>(QueueUrls {
                    source,
                    dead_letter,
                })
            })
            .await?;
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: i32,
        wait: Duration,
    ) -> Result<Vec<Delivery<SqsReceipt>>, SubscriberError> {
        let urls = self.urls()?;
        let output = self
            .sqs_client
            .receive_message()
            .queue_url(&urls.source)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait.as_secs() as i32)
            .message_attribute_names("All")
            .message_system_attribute_names(MessageSystemAttributeName::MessageGroupId)
            .send()
            .await
            .map_err(|e| {
                SubscriberError::connection(&self.queue_name, DisplayErrorContext(&e).to_string())
            })?;

        let deliveries = output
            .messages()
            .iter()
            .filter_map(|message| {
                let delivery = Self::into_delivery(message);
                if delivery.is_none() {
                    tracing::warn!(queue = %self.queue_name, "skipping a message without id or receipt handle");
                }
                delivery
            })
            .collect();

        Ok(deliveries)
    }

    async fn complete(&self, receipt: SqsReceipt) -> Result<(), SubscriberError> {
        self.delete(&receipt).await
    }

    async fn dead_letter(
        &self,
        receipt: SqsReceipt,
        reason: DeadLetterReason,
        description: &str,
    ) -> Result<(), SubscriberError> {
        let urls = self.urls()?;

        let (mut attributes, dropped) = budget_attributes(&receipt.attributes);
        if !dropped.is_empty() {
            tracing::warn!(
                message_id = %receipt.message_id,
                dropped = ?dropped,
                "dropping message attributes that do not fit on the dead-lettered copy"
            );
        }
        attributes.insert(DEAD_LETTER_REASON_KEY.to_string(), string_attribute(reason.as_str())?);
        attributes.insert(
            DEAD_LETTER_DESCRIPTION_KEY.to_string(),
            string_attribute(description)?,
        );

        let mut request = self
            .sqs_client
            .send_message()
            .queue_url(&urls.dead_letter)
            .message_body(&receipt.body)
            .set_message_attributes(Some(attributes));
        if let Some((group_id, deduplication_id)) = fifo_ids(&urls.dead_letter, &receipt) {
            request = request
                .message_group_id(group_id)
                .message_deduplication_id(deduplication_id);
        }

        request
            .send()
            .await
            .map_err(|e| {
                SubscriberError::resolution(&receipt.message_id, DisplayErrorContext(&e).to_string())
            })?;

        // Only drop the original once the copy is safely in the dead-letter queue.
        self.delete(&receipt).await
    }

    async fn close(&self) -> Result<(), SubscriberError> {
        tracing::info!(queue = %self.queue_name, "queue session closed");
        Ok(())
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }
}
