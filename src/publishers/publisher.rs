use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::amqp::{ConnectionManager, TransportError};
use crate::publishers::OutgoingMessage;

/// A high-level interface to publish messages to named queues.
///
/// The publisher borrows the single shared channel owned by its
/// [`ConnectionManager`]: if the manager was never connected (or has been
/// disposed), every publish fails with [`TransportError::Uninitialized`] before
/// any transport interaction takes place.
///
/// # Fire and forget
///
/// One successful call produces exactly one outbound delivery attempt. No
/// publisher confirm is awaited - once the message has been handed to the
/// broker, the broker owns its durability. Transport failures are returned to
/// the caller, never retried or swallowed.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use mailroom::amqp::{BrokerSettings, ConnectionFactory, ConnectionManager};
/// use mailroom::publishers::Publisher;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct OrderPlaced {
///     x: u64,
/// }
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let factory = ConnectionFactory::new_from_config(&BrokerSettings::default())?;
///     let manager = Arc::new(ConnectionManager::connect(&factory).await?);
///
///     let publisher = Publisher::new(manager);
///     publisher.publish("orders", &OrderPlaced { x: 1 }).await?;
///     Ok(())
/// }
/// ```
pub struct Publisher {
    manager: Arc<ConnectionManager>,
}

/// Error returned when trying to publish a message using [`Publisher`].
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    /// The shared channel was missing or unusable.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The message could not be serialized to a byte payload.
    #[error("failed to serialise the outgoing message payload")]
    Serialization(#[source] serde_json::Error),
    /// The broker transport failed while the message was being handed over.
    #[error("failed to hand the message over to the broker")]
    Delivery(#[source] lapin::Error),
}

impl Publisher {
    /// Create a publisher on top of a shared [`ConnectionManager`].
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Serialize `message` as JSON and transmit it to `queue_name`.
    ///
    /// The payload is tagged with content type `application/json`; a
    /// `message_id` and a `timestamp` are injected when not already present.
    #[tracing::instrument(skip(self, message), name = "publish")]
    pub async fn publish<M: Serialize>(
        &self,
        queue_name: &str,
        message: &M,
    ) -> Result<(), PublishError> {
        // Check the transport precondition before doing any other work: an
        // uninitialized manager must produce zero transport calls.
        let channel = self.manager.channel()?;

        let payload = serde_json::to_vec(message).map_err(PublishError::Serialization)?;
        let envelope = OutgoingMessage::default()
            .with_payload(payload)
            .with_queue_name(queue_name.into())
            .with_content_type("application/json".into());

        let OutgoingMessage {
            payload,
            queue_name,
            properties,
        } = inject_message_properties(envelope);
        channel
            .publish_to_queue(payload, &queue_name, properties)
            .await
            .map_err(PublishError::Delivery)
    }

    /// Transmit a raw [`OutgoingMessage`], payload untouched.
    ///
    /// Useful when the payload is produced elsewhere or is not JSON.
    #[tracing::instrument(skip(self, envelope), name = "publish_message", fields(queue_name = %envelope.queue_name))]
    pub async fn publish_message(&self, envelope: OutgoingMessage) -> Result<(), PublishError> {
        let channel = self.manager.channel()?;

        let OutgoingMessage {
            payload,
            queue_name,
            properties,
        } = inject_message_properties(envelope);
        channel
            .publish_to_queue(payload, &queue_name, properties)
            .await
            .map_err(PublishError::Delivery)
    }
}

/// Inject the current timestamp and a `message_id` into the message properties,
/// unless the caller already provided them.
fn inject_message_properties(mut envelope: OutgoingMessage) -> OutgoingMessage {
    let current_timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|ct| ct.as_secs());

    let props = envelope.properties.unwrap_or_default();
    let props = if let Some(ct) = current_timestamp {
        let ts = *props.timestamp();
        props.with_timestamp(ts.unwrap_or(ct))
    } else {
        warn!("System time is before 1970");
        props
    };

    let message_id = props.message_id().clone();
    envelope.properties = Some(
        props.with_message_id(message_id.unwrap_or_else(|| Uuid::new_v4().to_string().into())),
    );

    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::ConnectionManager;
    use fake::{Fake, Faker};

    #[tokio::test]
    async fn publishing_before_initialisation_fails_with_uninitialized_transport() {
        let publisher = Publisher::new(Arc::new(ConnectionManager::unconnected()));

        let outcome = publisher.publish("orders", &serde_json::json!({"x": 1})).await;

        assert!(matches!(
            outcome,
            Err(PublishError::Transport(TransportError::Uninitialized))
        ));
    }

    #[tokio::test]
    async fn publishing_a_raw_message_before_initialisation_fails_with_uninitialized_transport() {
        let publisher = Publisher::new(Arc::new(ConnectionManager::unconnected()));
        let envelope = OutgoingMessage::default()
            .with_payload(b"opaque".to_vec())
            .with_queue_name(Faker.fake::<String>());

        let outcome = publisher.publish_message(envelope).await;

        assert!(matches!(
            outcome,
            Err(PublishError::Transport(TransportError::Uninitialized))
        ));
    }

    #[test]
    fn message_id_and_timestamp_are_injected_when_missing() {
        let envelope = OutgoingMessage::default()
            .with_payload(b"{}".to_vec())
            .with_queue_name("orders".into());

        let stamped = inject_message_properties(envelope);

        let properties = stamped.properties.expect("properties were not populated");
        assert!(properties.message_id().is_some());
        assert!(properties.timestamp().is_some());
    }

    #[test]
    fn message_id_and_timestamp_are_not_replaced_when_provided() {
        let message_id: String = Faker.fake();
        let timestamp = 1_600_000_000;
        let envelope = OutgoingMessage::default()
            .with_queue_name("orders".into())
            .with_message_id(message_id.clone().into())
            .with_timestamp(timestamp);

        let stamped = inject_message_properties(envelope);

        let properties = stamped.properties.expect("properties were not populated");
        assert_eq!(properties.message_id().clone(), Some(message_id.into()));
        assert_eq!(*properties.timestamp(), Some(timestamp));
    }
}
