use std::str::FromStr;

use thiserror::Error;

/// Error type returned by the business logic behind a handler operation.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the subscriber pump and its queue session.
///
/// None of these are message-scoped: a failure while processing a single
/// message is always turned into a dead-letter [`Resolution`](crate::message::Resolution)
/// and never surfaces here.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// The queue could not be opened, or the subscription could not be kept alive.
    ///
    /// This is the only error that is expected to reach the owning process.
    #[error("failed to connect to queue '{queue}': {message}")]
    Connection { queue: String, message: String },

    /// The subscriber configuration is invalid.
    #[error("invalid subscriber configuration: {0}")]
    Configuration(String),

    /// Completing or dead-lettering a delivery was not acknowledged by the queue.
    #[error("failed to resolve message {correlation_id}: {message}")]
    Resolution {
        correlation_id: String,
        message: String,
    },

    #[error("{0}")]
    GenericError(#[from] GenericError),
}

impl SubscriberError {
    pub fn connection(queue: &str, message: impl Into<String>) -> Self {
        SubscriberError::Connection {
            queue: queue.to_string(),
            message: message.into(),
        }
    }

    pub fn resolution(correlation_id: &str, message: impl Into<String>) -> Self {
        SubscriberError::Resolution {
            correlation_id: correlation_id.to_string(),
            message: message.into(),
        }
    }
}

/// Failures inside the deserialize-and-dispatch boundary of the dispatcher.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("{0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("{0}")]
    Handler(HandlerError),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl ProcessingError {
    /// Short name of the failure category, used in dead-letter descriptions.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::Deserialize(_) => "DeserializeError",
            ProcessingError::Handler(_) => "HandlerError",
            ProcessingError::Panicked(_) => "HandlerPanic",
        }
    }
}

/// Generic error type for handling unexpected errors.
#[derive(Debug, Error)]
pub struct GenericError(String);

impl GenericError {
    /// Creates a new `GenericError` with the provided message.
    pub fn new(message: String) -> Self {
        GenericError(message)
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenericError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GenericError::new(s.to_string()))
    }
}

impl From<String> for GenericError {
    fn from(s: String) -> Self {
        GenericError::new(s)
    }
}
