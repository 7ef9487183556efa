use aws_config::{BehaviorVersion, Region};

use crate::receiver::SubscriberConfig;

/// Creates an AWS SQS client for a subscriber.
///
/// Credentials and the default region come from the environment
/// (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`, `AWS_PROFILE`).
/// `config.region` overrides the region and `config.endpoint_url` points the
/// client at a custom endpoint, such as a local SQS emulator.
///
/// # Example
///
/// ```rust,no_run
/// use rs_sqs_dispatcher::{client::create_sqs_client, receiver::SubscriberConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = SubscriberConfig::default();
///     let client = create_sqs_client(&config).await;
///     // Use the client...
/// }
/// ```
pub async fn create_sqs_client(config: &SubscriberConfig) -> aws_sdk_sqs::Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint_url) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    let sdk_config = loader.load().await;
    aws_sdk_sqs::Client::new(&sdk_config)
}
