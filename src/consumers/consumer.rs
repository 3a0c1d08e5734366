use crate::amqp::{ConnectionManager, TransportError};
use crate::consumers::delivery::process;
use crate::consumers::handler::{AsyncClosure, ClosureHandler, Handler};
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicConsumeOptions, BasicQosOptions};
use lapin::types::FieldTable;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

const DEFAULT_PREFETCH_COUNT: u16 = 50;

/// A consumer of messages from named queues.
///
/// The consumer borrows the single shared channel owned by its
/// [`ConnectionManager`] and registers subscriptions in manual-acknowledgment
/// mode: the broker only removes a message from the queue once this crate
/// acknowledges it, after the application handler has completed successfully.
///
/// # Requeue policy
///
/// Every failed handler invocation rejects its delivery with `requeue` enabled,
/// without bound: a permanently failing message will be redelivered
/// indefinitely. This mirrors the behaviour of the systems this crate talks to;
/// if you need bounded retries, configure a dead letter exchange and a
/// message TTL on the queue itself, outside this crate.
///
/// # Lifecycle
///
/// [`Consumer::start_consuming`] returns as soon as the subscription is
/// registered; message handling continues on background tasks. There is no
/// per-subscription cancellation: a subscription ends when the owning
/// [`ConnectionManager`] is disposed, which closes the shared channel and
/// drains the in-flight deliveries.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mailroom::amqp::{BrokerSettings, ConnectionFactory, ConnectionManager};
/// use mailroom::consumers::{Consumer, HandlerError, Incoming};
///
/// async fn handle_order(incoming: Incoming<'_, ()>) -> Result<(), HandlerError> {
///     println!("received: {}", incoming.payload);
///     Ok(())
/// }
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let factory = ConnectionFactory::new_from_config(&BrokerSettings::default())?;
///     let manager = Arc::new(ConnectionManager::connect(&factory).await?);
///
///     let consumer = Consumer::new(manager, ());
///     consumer.start_consuming("orders", handle_order).await?;
///     Ok(())
/// }
/// ```
pub struct Consumer<Context>
where
    Context: Send + Sync + 'static,
{
    manager: Arc<ConnectionManager>,
    /// `context` is a set of resources that are required to process messages and
    /// outlive the lifecycle of any single delivery - e.g. an HTTP client for a
    /// third-party API, a db connection pool, etc.
    context: Arc<Context>,
    /// The maximum number of unacknowledged deliveries the broker will push to
    /// a subscription before waiting for settlements.
    prefetch_count: u16,
}

/// Error returned when a subscription could not be registered.
///
/// Failures at this stage are fatal to the `start_consuming` call and bubble up
/// to the caller; failures while processing individual messages, by contrast,
/// are contained per-message and never surface here.
#[derive(thiserror::Error, Debug)]
pub enum SubscribeError {
    /// The shared channel was missing or unusable.
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to configure the prefetch window on the shared channel")]
    Qos(#[source] lapin::Error),
    #[error("failed to register a subscription on queue '{queue_name}'")]
    Subscribe {
        queue_name: String,
        #[source]
        source: lapin::Error,
    },
}

impl<Context> Consumer<Context>
where
    Context: Send + Sync + 'static,
{
    /// Create a consumer on top of a shared [`ConnectionManager`].
    ///
    /// If the context is already behind an `Arc` pointer, it won't be
    /// double-wrapped - useful to share the same context across multiple
    /// consumers.
    pub fn new(manager: Arc<ConnectionManager>, context: impl Into<Arc<Context>>) -> Self {
        Self {
            manager,
            context: context.into(),
            prefetch_count: DEFAULT_PREFETCH_COUNT,
        }
    }

    /// Configure the prefetch count for subscriptions registered by this
    /// consumer. If not configured, the prefetch count is set to a default
    /// value of 50.
    #[must_use]
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }

    /// Subscribe to `queue_name` and process every delivery with `handler`.
    ///
    /// The subscription is registered in manual-acknowledgment mode. For every
    /// delivery, the payload is decoded as UTF-8 text and handed to `handler`;
    /// a successful outcome acknowledges the single delivery, a failure rejects
    /// it with requeue enabled (see the [requeue policy](Consumer#requeue-policy)).
    ///
    /// The call returns once the subscription is in place - handling happens on
    /// background tasks, one delivery at a time per subscription.
    ///
    /// # Errors
    ///
    /// Fails with [`TransportError::Uninitialized`] - before any subscription
    /// attempt - if the owning manager was never connected or has been
    /// disposed.
    pub async fn start_consuming<H>(
        &self,
        queue_name: &str,
        handler: H,
    ) -> Result<(), SubscribeError>
    where
        H: for<'a> AsyncClosure<'a, Context>,
    {
        self.start_consuming_raw(queue_name, Arc::new(ClosureHandler(handler)))
            .await
    }

    /// A version of [`Consumer::start_consuming`] for handlers that implement
    /// [`Handler`] directly. Prefer `start_consuming` if you only want to
    /// register a function handler.
    #[tracing::instrument(skip_all, name = "start_consuming", fields(queue_name = %queue_name))]
    pub async fn start_consuming_raw(
        &self,
        queue_name: &str,
        handler: Arc<dyn Handler<Context>>,
    ) -> Result<(), SubscribeError> {
        // The transport precondition is checked before any subscription
        // attempt: an uninitialized manager produces zero transport calls.
        let channel = self.manager.channel()?;

        channel
            .raw()
            .basic_qos(self.prefetch_count, BasicQosOptions { global: false })
            .await
            .map_err(SubscribeError::Qos)?;

        let deliveries = channel
            .raw()
            .basic_consume(
                queue_name,
                &Uuid::new_v4().to_string(),
                BasicConsumeOptions {
                    // Manual-acknowledgment mode: deliveries stay on the queue
                    // until this crate settles them.
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|source| SubscribeError::Subscribe {
                queue_name: queue_name.into(),
                source,
            })?;

        // The message-passing boundary between the broker stream and message
        // processing: a dispatch task forwards deliveries onto an internal
        // queue, a dedicated worker settles them one at a time. The prefetch
        // window bounds how many deliveries can be in flight here.
        let (dispatch_queue, worker_queue) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(deliveries, dispatch_queue, queue_name.to_owned()));
        tokio::spawn(worker(
            worker_queue,
            self.context.clone(),
            handler,
            queue_name.to_owned(),
        ));

        Ok(())
    }
}

/// Forward deliveries from the broker stream to the worker.
///
/// The loop ends when the stream is exhausted (the channel was closed, e.g. by
/// disposing the manager, or the broker cancelled the subscription) or when the
/// stream yields a transport error. A failing delivery never ends the loop -
/// per-message failures are handled downstream, in the worker.
async fn dispatch(
    mut deliveries: lapin::Consumer,
    dispatch_queue: mpsc::UnboundedSender<Delivery>,
    queue_name: String,
) {
    while let Some(event) = deliveries.next().await {
        match event {
            Ok(delivery) => {
                if dispatch_queue.send(delivery).is_err() {
                    // The worker is gone; nothing left to dispatch to.
                    break;
                }
            }
            Err(e) => {
                error!("subscription on queue '{}' failed: {}", queue_name, e);
                break;
            }
        }
    }
    info!("subscription on queue '{}' ended", queue_name);
}

/// The worker loop: decode -> handler -> settle, one delivery at a time.
///
/// Exits when the dispatch side hangs up and the internal queue is drained.
async fn worker<Context>(
    mut worker_queue: mpsc::UnboundedReceiver<Delivery>,
    context: Arc<Context>,
    handler: Arc<dyn Handler<Context>>,
    queue_name: String,
) where
    Context: Send + Sync + 'static,
{
    while let Some(delivery) = worker_queue.recv().await {
        let Delivery {
            delivery_tag,
            data,
            acker,
            ..
        } = delivery;
        process(
            context.clone(),
            handler.as_ref(),
            &queue_name,
            delivery_tag,
            data,
            &acker,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::{HandlerError, Incoming};

    async fn handler(_incoming: Incoming<'_, ()>) -> Result<(), HandlerError> {
        Ok(())
    }

    #[tokio::test]
    async fn subscribing_before_initialisation_fails_with_uninitialized_transport() {
        let consumer = Consumer::new(Arc::new(ConnectionManager::unconnected()), ());

        let outcome = consumer.start_consuming("orders", handler).await;

        assert!(matches!(
            outcome,
            Err(SubscribeError::Transport(TransportError::Uninitialized))
        ));
    }
}
