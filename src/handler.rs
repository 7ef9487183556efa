//! Defines the business-logic seam of the outbound queue.

use async_trait::async_trait;

use crate::errors::HandlerError;
use crate::requests::{FirstRequest, SecondRequest};

/// One operation per supported request type.
///
/// Implement this trait with the actual business logic. The dispatcher calls
/// exactly one operation per successfully decoded message and treats any
/// returned error as a processing failure of that message. Operations may run
/// concurrently for different messages, and a message redelivered by the queue
/// is handed over again.
#[async_trait]
pub trait OutboundMessageHandler: Send + Sync + 'static {
    async fn handle_first(&self, request: FirstRequest) -> Result<(), HandlerError>;

    async fn handle_second(&self, request: SecondRequest) -> Result<(), HandlerError>;
}
