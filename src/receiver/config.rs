use serde::Deserialize;

use crate::dispatcher::OUTBOUND_QUEUE_NAME;
use crate::errors::SubscriberError;

/// Configuration for a queue subscriber.
///
/// Every field has a default, so an empty environment yields a usable config
/// as long as the queue names are filled in by the caller.
///
/// # Fields
/// - `queue_name`: The queue to subscribe to.
/// - `dead_letter_queue_name`: The queue rejected messages are moved to.
/// - `max_number_of_messages`: The maximum number of messages to receive in a single request.
/// - `wait_time_seconds`: The wait time for long polling, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    pub queue_name: String,

    pub dead_letter_queue_name: String,

    /// The maximum number of messages to receive in a single request (1..=10).
    pub max_number_of_messages: i32,

    /// The wait time for long polling, in seconds (0..=20).
    pub wait_time_seconds: i32,

    /// How many deliveries of one batch may be processed at the same time.
    pub max_concurrent_messages: usize,

    /// Consecutive receive failures tolerated before the pump gives up.
    pub max_receive_failures: u32,

    pub receive_retry_delay_ms: u64,

    /// Custom SQS endpoint, e.g. a local emulator.
    pub endpoint_url: Option<String>,

    pub region: Option<String>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        SubscriberConfig {
            queue_name: OUTBOUND_QUEUE_NAME.to_string(),
            dead_letter_queue_name: format!("{OUTBOUND_QUEUE_NAME}-deadletter"),
            max_number_of_messages: 10,
            wait_time_seconds: 20,
            max_concurrent_messages: 10,
            max_receive_failures: 5,
            receive_retry_delay_ms: 1000,
            endpoint_url: None,
            region: None,
        }
    }
}

impl SubscriberConfig {
    pub const ENV_PREFIX: &'static str = "SUBSCRIBER_";

    /// Loads the configuration from `SUBSCRIBER_*` environment variables,
    /// reading a `.env` file first when one exists.
    pub fn from_env() -> Result<Self, SubscriberError> {
        dotenvy::dotenv().ok();

        let config = envy::prefixed(Self::ENV_PREFIX)
            .from_env::<Self>()
            .map_err(|e| SubscriberError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SubscriberError> {
        if self.queue_name.is_empty() {
            return Err(SubscriberError::Configuration(
                "queue_name must not be empty".to_string(),
            ));
        }
        if self.dead_letter_queue_name.is_empty() {
            return Err(SubscriberError::Configuration(
                "dead_letter_queue_name must not be empty".to_string(),
            ));
        }
        if !(1..=10).contains(&self.max_number_of_messages) {
            return Err(SubscriberError::Configuration(format!(
                "max_number_of_messages must be between 1 and 10, got {}",
                self.max_number_of_messages
            )));
        }
        if !(0..=20).contains(&self.wait_time_seconds) {
            return Err(SubscriberError::Configuration(format!(
                "wait_time_seconds must be between 0 and 20, got {}",
                self.wait_time_seconds
            )));
        }
        if self.max_concurrent_messages == 0 {
            return Err(SubscriberError::Configuration(
                "max_concurrent_messages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> SubscriberConfig {
        envy::prefixed(SubscriberConfig::ENV_PREFIX)
            .from_iter(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<Vec<_>>(),
            )
            .unwrap()
    }

    #[test]
    fn defaults_are_valid() {
        let config = SubscriberConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_number_of_messages, 10);
        assert_eq!(config.wait_time_seconds, 20);
        assert_eq!(config.queue_name, OUTBOUND_QUEUE_NAME);
        assert_eq!(config.dead_letter_queue_name, "outbound-deadletter");
    }

    #[test]
    fn env_overrides_defaults() {
        let config = from_pairs(&[
            ("SUBSCRIBER_QUEUE_NAME", "orders"),
            ("SUBSCRIBER_DEAD_LETTER_QUEUE_NAME", "orders-dlq"),
            ("SUBSCRIBER_WAIT_TIME_SECONDS", "5"),
            ("SUBSCRIBER_ENDPOINT_URL", "http://localhost:4566"),
        ]);

        assert_eq!(config.queue_name, "orders");
        assert_eq!(config.dead_letter_queue_name, "orders-dlq");
        assert_eq!(config.wait_time_seconds, 5);
        assert_eq!(config.max_concurrent_messages, 10);
        assert_eq!(config.endpoint_url.as_deref(), Some("http://localhost:4566"));
    }

    #[test]
    fn out_of_range_limits_are_rejected() {
        let config = SubscriberConfig {
            max_number_of_messages: 11,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SubscriberError::Configuration(_))
        ));

        let config = SubscriberConfig {
            wait_time_seconds: 21,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SubscriberConfig {
            max_concurrent_messages: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
