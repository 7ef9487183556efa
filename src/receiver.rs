use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::errors::SubscriberError;
use crate::message::{DeadLetterReason, Resolution};
use crate::session::{Delivery, QueueSession};

pub mod config;
pub mod functions;

pub use config::SubscriberConfig;
pub use functions::{MessageCallback, MessageCallbackFn};

/// The receive loop for one queue.
///
/// A subscriber pulls deliveries from a [`QueueSession`], hands every message
/// to its [`MessageCallback`] and then completes or dead-letters the delivery
/// according to the returned [`Resolution`]. It imposes no policy of its own on
/// what the callback does with a message.
pub struct MessageSubscriber<S, C>
where
    S: QueueSession,
    C: MessageCallback + 'static,
{
    /// Stable identity distinguishing this subscriber from others on the same queue.
    identity: Uuid,

    session: Arc<S>,

    callback: Arc<C>,

    config: SubscriberConfig,
}

impl<S, C> MessageSubscriber<S, C>
where
    S: QueueSession,
    C: MessageCallback + 'static,
{
    pub fn new(identity: Uuid, session: S, callback: C, config: SubscriberConfig) -> Self {
        MessageSubscriber {
            identity,
            session: Arc::new(session),
            callback: Arc::new(callback),
            config,
        }
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn queue_name(&self) -> &str {
        self.session.queue_name()
    }

    /// Opens the queue session and starts the pump in a background task.
    ///
    /// Fails with [`SubscriberError::Connection`] when the session cannot be
    /// opened. The pump runs until [`SubscriptionHandle::stop`] is called, the
    /// handle is dropped, or the subscription is lost.
    pub async fn start(self) -> Result<SubscriptionHandle, SubscriberError> {
        self.config.validate()?;
        self.session.open().await?;

        let identity = self.identity;
        let queue_name = self.queue_name().to_string();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let span = tracing::info_span!("subscriber", identity = %identity, queue = %queue_name);
        let task = tokio::spawn(
            async move {
                self.pump(async move {
                    // A dropped sender is a shutdown request too.
                    let _ = shutdown_rx.await;
                })
                .await
            }
            .instrument(span),
        );

        tracing::info!(identity = %identity, queue = %queue_name, "subscriber started");

        Ok(SubscriptionHandle {
            identity,
            queue_name,
            shutdown: shutdown_tx,
            task,
        })
    }

    /// Runs the pump on the current task until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), SubscriberError>
    where
        F: Future<Output = ()> + Send,
    {
        self.config.validate()?;
        self.session.open().await?;

        let span = tracing::info_span!("subscriber", identity = %self.identity, queue = %self.queue_name());
        self.pump(shutdown).instrument(span).await
    }

    /// Receive loop. The session is closed on every exit path.
    async fn pump<F>(&self, shutdown: F) -> Result<(), SubscriberError>
    where
        F: Future<Output = ()> + Send,
    {
        let result = self.receive_loop(shutdown).await;

        if let Err(e) = self.session.close().await {
            tracing::warn!(error = %e, "failed to close queue session");
        }

        match &result {
            Ok(()) => tracing::info!("subscriber stopped"),
            Err(e) => tracing::error!(error = %e, "subscriber stopped after losing its subscription"),
        }

        result
    }

    async fn receive_loop<F>(&self, shutdown: F) -> Result<(), SubscriberError>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        let wait = Duration::from_secs(self.config.wait_time_seconds.max(0) as u64);
        let retry_delay = Duration::from_millis(self.config.receive_retry_delay_ms);
        let mut consecutive_failures = 0u32;

        loop {
            let received = tokio::select! {
                _ = &mut shutdown => return Ok(()),
                received = self.session.receive(self.config.max_number_of_messages, wait) => received,
            };

            let batch = match received {
                Ok(batch) => {
                    consecutive_failures = 0;
                    batch
                }
                Err(e) => {
                    consecutive_failures += 1;
                    tracing::warn!(
                        error = %e,
                        attempt = consecutive_failures,
                        max_attempts = self.config.max_receive_failures,
                        "error receiving messages"
                    );

                    if consecutive_failures >= self.config.max_receive_failures {
                        return Err(SubscriberError::connection(
                            self.queue_name(),
                            format!("receive failed {consecutive_failures} times in a row: {e}"),
                        ));
                    }

                    tokio::select! {
                        _ = &mut shutdown => return Ok(()),
                        _ = tokio::time::sleep(retry_delay) => continue,
                    }
                }
            };

            if batch.is_empty() {
                tracing::debug!("no messages received");
                continue;
            }

            futures::stream::iter(batch)
                .for_each_concurrent(self.config.max_concurrent_messages, |delivery| {
                    self.process_delivery(delivery)
                })
                .await;
        }
    }

    async fn process_delivery(&self, delivery: Delivery<S::Receipt>) {
        let Delivery { message, receipt } = delivery;
        let queue_name = self.session.queue_name();
        let correlation_id = message.correlation_id().to_string();

        tracing::info!(
            queue = %queue_name,
            correlation_id = %correlation_id,
            "{} queue received a message with correlation id {}",
            queue_name,
            correlation_id
        );

        let resolution = AssertUnwindSafe(self.callback.on_message(queue_name, message))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let description = format!(
                    "Failed to process the message due to an error (CallbackPanic): {}.",
                    panic_message(panic.as_ref())
                );
                tracing::error!(
                    correlation_id = %correlation_id,
                    "Discarding a message with correlation id {}: callback panicked",
                    correlation_id
                );
                Resolution::dead_letter(DeadLetterReason::ProcessingError, description)
            });

        let acknowledged = match resolution {
            Resolution::Completed => self.session.complete(receipt).await,
            Resolution::DeadLettered {
                reason,
                description,
            } => self.session.dead_letter(receipt, reason, &description).await,
        };

        // The queue redelivers anything left unacknowledged, so the pump just moves on.
        if let Err(e) = acknowledged {
            tracing::error!(
                correlation_id = %correlation_id,
                error = %e,
                "failed to acknowledge message resolution"
            );
        }
    }
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running subscriber started with [`MessageSubscriber::start`].
///
/// Dropping the handle requests shutdown; the pump finishes its in-flight
/// batch and closes the session in the background.
pub struct SubscriptionHandle {
    identity: Uuid,
    queue_name: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<(), SubscriberError>>,
}

impl SubscriptionHandle {
    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// `true` once the pump has exited, for example after losing its subscription.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stops the pump and waits until in-flight messages are resolved and the
    /// session is closed.
    pub async fn stop(self) -> Result<(), SubscriberError> {
        let SubscriptionHandle { shutdown, task, .. } = self;
        let _ = shutdown.send(());
        join(task).await
    }

    /// Waits for the pump to exit on its own. Returns the connection error
    /// that ended it, if any.
    pub async fn wait(self) -> Result<(), SubscriberError> {
        let SubscriptionHandle { shutdown, task, .. } = self;
        let result = join(task).await;
        drop(shutdown);
        result
    }

    /// Stops the pump once `signal` resolves, or returns as soon as the pump
    /// exits on its own, whichever comes first.
    pub async fn stop_on<F>(self, signal: F) -> Result<(), SubscriberError>
    where
        F: Future<Output = ()>,
    {
        let SubscriptionHandle {
            shutdown, mut task, ..
        } = self;

        let exited = tokio::select! {
            _ = signal => None,
            result = &mut task => Some(result),
        };

        match exited {
            Some(result) => flatten(result),
            None => {
                let _ = shutdown.send(());
                join(task).await
            }
        }
    }
}

async fn join(task: JoinHandle<Result<(), SubscriberError>>) -> Result<(), SubscriberError> {
    flatten(task.await)
}

fn flatten(
    result: Result<Result<(), SubscriberError>, tokio::task::JoinError>,
) -> Result<(), SubscriberError> {
    match result {
        Ok(result) => result,
        Err(e) => Err(SubscriberError::GenericError(
            format!("subscriber task failed: {e}").into(),
        )),
    }
}
