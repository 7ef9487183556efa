use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Property carrying the type tag of a message.
pub const MESSAGE_TYPE_KEY: &str = "messageType";

/// Name of the property carrying the opaque correlation id, when the producer sets one.
pub const CORRELATION_ID_KEY: &str = "correlationId";

/// A message property value set by the producer.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Number(String),
    Binary(Vec<u8>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(value) | PropertyValue::Number(value) => write!(f, "{value}"),
            PropertyValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// The body of a message: an async byte stream that can be read once.
pub type MessageBody = Pin<Box<dyn AsyncRead + Send>>;

/// One message received from the queue.
///
/// The body is handed out by [`InboundMessage::take_body`] exactly once; later
/// calls return `None`.
pub struct InboundMessage {
    correlation_id: String,
    properties: HashMap<String, PropertyValue>,
    body: Option<MessageBody>,
}

impl InboundMessage {
    pub fn new(
        correlation_id: impl Into<String>,
        properties: HashMap<String, PropertyValue>,
        body: MessageBody,
    ) -> Self {
        InboundMessage {
            correlation_id: correlation_id.into(),
            properties,
            body: Some(body),
        }
    }

    /// Builds a message whose body is an in-memory buffer.
    pub fn from_bytes(
        correlation_id: impl Into<String>,
        properties: HashMap<String, PropertyValue>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        let cursor = std::io::Cursor::new(body.into());
        InboundMessage::new(correlation_id, properties, Box::pin(cursor))
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn properties(&self) -> &HashMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn take_body(&mut self) -> Option<MessageBody> {
        self.body.take()
    }

    /// Reads the whole body as UTF-8 text, consuming it.
    pub async fn read_body_text(&mut self) -> std::io::Result<String> {
        let mut body = self.take_body().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "message body has already been read",
            )
        })?;

        let mut buf = Vec::new();
        body.read_to_end(&mut buf).await?;
        String::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("correlation_id", &self.correlation_id)
            .field("properties", &self.properties)
            .field("body_taken", &self.body.is_none())
            .finish()
    }
}

/// Machine-readable reason attached to a dead-lettered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadLetterReason {
    MissingProperty,
    ReadError,
    UnsupportedType,
    ProcessingError,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeadLetterReason::MissingProperty => "missing-property",
            DeadLetterReason::ReadError => "read-error",
            DeadLetterReason::UnsupportedType => "unsupported-type",
            DeadLetterReason::ProcessingError => "processing-error",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a delivered message is resolved by the callback.
///
/// The pump acts on this value; the callback never touches the delivery itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Completed,
    DeadLettered {
        reason: DeadLetterReason,
        description: String,
    },
}

impl Resolution {
    pub fn dead_letter(reason: DeadLetterReason, description: impl Into<String>) -> Self {
        Resolution::DeadLettered {
            reason,
            description: description.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Resolution::Completed)
    }
}
