use std::sync::Arc;

use async_trait::async_trait;
use rs_sqs_dispatcher::{
    client::create_sqs_client,
    dispatcher::outbound_subscriber,
    errors::HandlerError,
    handler::OutboundMessageHandler,
    logging::{LogFormat, init_logging},
    receiver::SubscriberConfig,
    requests::{FirstRequest, SecondRequest},
    session::SqsSession,
};

/// Handler that only records what it receives.
struct LoggingHandler;

#[async_trait]
impl OutboundMessageHandler for LoggingHandler {
    async fn handle_first(&self, request: FirstRequest) -> Result<(), HandlerError> {
        tracing::info!(field = %request.field, "handled FirstRequest");
        Ok(())
    }

    async fn handle_second(&self, request: SecondRequest) -> Result<(), HandlerError> {
        tracing::info!(
            reference = %request.reference,
            attributes = request.attributes.len(),
            "handled SecondRequest"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::from_env());

    let config = SubscriberConfig::from_env()?;
    let client = create_sqs_client(&config).await;
    let session = SqsSession::new(client, &config.queue_name, &config.dead_letter_queue_name);

    let subscription = outbound_subscriber(session, Arc::new(LoggingHandler), config)
        .start()
        .await?;

    subscription
        .stop_on(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Ctrl+C received. Shutting down.");
        })
        .await?;

    tracing::info!("Application has shut down.");
    Ok(())
}
