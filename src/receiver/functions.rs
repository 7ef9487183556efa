use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::message::{InboundMessage, Resolution};

/// Per-message callback invoked by the subscriber pump.
///
/// The callback decides how a delivery is resolved by returning a
/// [`Resolution`]; it has no access to the delivery itself. It is called for
/// every message, possibly for several messages at once.
#[async_trait]
pub trait MessageCallback: Send + Sync {
    /// Processes one message.
    ///
    /// # Arguments
    ///
    /// * `queue_name` - The queue the message was received from
    /// * `message` - The received message; its body can be read once
    async fn on_message(&self, queue_name: &str, message: InboundMessage) -> Resolution;
}

#[async_trait]
impl<T: MessageCallback + ?Sized> MessageCallback for Arc<T> {
    async fn on_message(&self, queue_name: &str, message: InboundMessage) -> Resolution {
        (**self).on_message(queue_name, message).await
    }
}

#[async_trait]
impl<F, Fut, TShared> MessageCallback for MessageCallbackFn<F, Fut, TShared>
where
    F: Fn(InboundMessage, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Resolution> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    async fn on_message(&self, _queue_name: &str, message: InboundMessage) -> Resolution {
        (self.callback_fn)(message, self.shared_resources.clone()).await
    }
}

/// Adapts a plain async function into a [`MessageCallback`].
///
/// # Type Parameters
///
/// * `F` - The callback function type
/// * `Fut` - The future returned by the callback function
/// * `TShared` - The type of shared resources passed to every call
pub struct MessageCallbackFn<F, Fut, TShared>
where
    F: Fn(InboundMessage, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Resolution> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    callback_fn: F,
    shared_resources: TShared,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut, TShared> MessageCallbackFn<F, Fut, TShared>
where
    F: Fn(InboundMessage, TShared) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Resolution> + Send + 'static,
    TShared: Send + Sync + Clone + 'static,
{
    /// Creates a callback from a function and the resources it shares across calls.
    pub fn new(callback_fn: F, shared_resources: TShared) -> Self {
        MessageCallbackFn {
            callback_fn,
            shared_resources,
            _future: PhantomData,
        }
    }
}
