//! Type-routed dispatch for the outbound queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use uuid::Uuid;

use crate::errors::{HandlerError, ProcessingError};
use crate::handler::OutboundMessageHandler;
use crate::message::{DeadLetterReason, InboundMessage, Resolution};
use crate::receiver::{MessageCallback, MessageSubscriber, SubscriberConfig, panic_message};
use crate::requests::{OutboundRequest, RequestKind};
use crate::session::QueueSession;

pub use crate::message::MESSAGE_TYPE_KEY;

/// Identity the outbound subscriber registers under.
pub const OUTBOUND_SUBSCRIBER_ID: Uuid = Uuid::from_u128(0x700ef2ac_989c_4c37_a6bc_e70ba8e71b72);

/// Default name of the queue the outbound subscriber reads from.
pub const OUTBOUND_QUEUE_NAME: &str = "outbound";

/// Validates, classifies and routes messages from the outbound queue.
///
/// For every message the checks run in a fixed order and stop at the first
/// failure:
///
/// 1. the `messageType` property is present (`missing-property`)
/// 2. the body reads as UTF-8 text (`read-error`)
/// 3. the tag names a known request (`unsupported-type`)
/// 4. the body deserializes and the handler succeeds (`processing-error`)
///
/// Each failure dead-letters the message; otherwise it is completed.
pub struct OutboundQueueDispatcher<H: OutboundMessageHandler> {
    handler: Arc<H>,
}

impl<H: OutboundMessageHandler> OutboundQueueDispatcher<H> {
    pub fn new(handler: Arc<H>) -> Self {
        OutboundQueueDispatcher { handler }
    }

    pub async fn dispatch(&self, queue_name: &str, mut message: InboundMessage) -> Resolution {
        let correlation_id = message.correlation_id().to_string();

        let Some(tag) = message.property(MESSAGE_TYPE_KEY).cloned() else {
            tracing::error!(
                correlation_id = %correlation_id,
                reason = %DeadLetterReason::MissingProperty,
                "Discarding a message with correlation id {}: '{}' missing from property bag",
                correlation_id,
                MESSAGE_TYPE_KEY
            );
            return Resolution::dead_letter(
                DeadLetterReason::MissingProperty,
                format!(
                    "The '{MESSAGE_TYPE_KEY}' property is required for messages sent to this queue ({queue_name})."
                ),
            );
        };

        let content = match message.read_body_text().await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    reason = %DeadLetterReason::ReadError,
                    error = %e,
                    "Discarding a message with correlation id {}: body could not be read",
                    correlation_id
                );
                return Resolution::dead_letter(
                    DeadLetterReason::ReadError,
                    format!(
                        "Failed to read the message body due to an error ({:?}): {}.",
                        e.kind(),
                        e
                    ),
                );
            }
        };

        let Some(kind) = tag.as_str().and_then(RequestKind::from_tag) else {
            tracing::error!(
                correlation_id = %correlation_id,
                reason = %DeadLetterReason::UnsupportedType,
                "Discarding a message with correlation id {}: Unsupported message type '{}'",
                correlation_id,
                tag
            );
            return Resolution::dead_letter(
                DeadLetterReason::UnsupportedType,
                format!("Messages of type {tag} are not supported by this queue ({queue_name})."),
            );
        };

        match self.process(kind, &content).await {
            Ok(()) => Resolution::Completed,
            Err(e) => {
                tracing::error!(
                    correlation_id = %correlation_id,
                    reason = %DeadLetterReason::ProcessingError,
                    error_kind = e.kind(),
                    error = %e,
                    "Discarding a message with correlation id {}: See error details",
                    correlation_id
                );
                Resolution::dead_letter(
                    DeadLetterReason::ProcessingError,
                    format!(
                        "Failed to process the message due to an error ({}): {}.",
                        e.kind(),
                        e
                    ),
                )
            }
        }
    }

    /// Deserialization and the handler call share one failure boundary.
    async fn process(&self, kind: RequestKind, content: &str) -> Result<(), ProcessingError> {
        let request = kind.decode(content)?;

        AssertUnwindSafe(self.route(request))
            .catch_unwind()
            .await
            .map_err(|panic| ProcessingError::Panicked(panic_message(panic.as_ref())))?
            .map_err(ProcessingError::Handler)
    }

    async fn route(&self, request: OutboundRequest) -> Result<(), HandlerError> {
        match request {
            OutboundRequest::First(request) => self.handler.handle_first(request).await,
            OutboundRequest::Second(request) => self.handler.handle_second(request).await,
        }
    }
}

#[async_trait]
impl<H: OutboundMessageHandler> MessageCallback for OutboundQueueDispatcher<H> {
    async fn on_message(&self, queue_name: &str, message: InboundMessage) -> Resolution {
        self.dispatch(queue_name, message).await
    }
}

/// Builds the outbound queue subscriber: a pump over `session` whose callback
/// is an [`OutboundQueueDispatcher`] for `handler`.
pub fn outbound_subscriber<S, H>(
    session: S,
    handler: Arc<H>,
    config: SubscriberConfig,
) -> MessageSubscriber<S, OutboundQueueDispatcher<H>>
where
    S: QueueSession,
    H: OutboundMessageHandler,
{
    MessageSubscriber::new(
        OUTBOUND_SUBSCRIBER_ID,
        session,
        OutboundQueueDispatcher::new(handler),
        config,
    )
}
