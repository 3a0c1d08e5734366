use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties,
};

/// Errors raised while establishing, using or releasing the broker transport.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The shared channel (or its owning connection) is missing: either the
    /// manager was never connected or it has already been disposed.
    #[error("the broker transport has not been initialised: no open channel")]
    Uninitialized,
    #[error("timed out after {0:?} while trying to connect to the broker")]
    ConnectTimeout(std::time::Duration),
    #[error("failed to connect to the broker")]
    Connect(#[source] lapin::Error),
    #[error("failed to open a channel on the broker connection")]
    Channel(#[source] lapin::Error),
    #[error("failed to close the broker transport")]
    Close(#[source] lapin::Error),
    #[error("invalid TLS configuration for the broker connection")]
    Tls(#[source] native_tls::Error),
    #[error("the transport state lock was poisoned by a panicking thread")]
    Poisoned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// A connection to a RabbitMq broker.
///
/// Connections should be re-used across multiple actions given the initial setup
/// cost - the [`ConnectionManager`](crate::amqp::ConnectionManager) holds exactly
/// one for the lifetime of the process.
pub struct Connection(lapin::Connection);

impl Connection {
    pub(crate) fn new(connection: lapin::Connection) -> Self {
        Self(connection)
    }

    #[tracing::instrument(name = "broker_create_channel", skip(self))]
    pub(crate) async fn create_channel(&self) -> Result<Channel, lapin::Error> {
        let channel = self.0.create_channel().await?;
        Ok(Channel(channel))
    }

    pub fn status(&self) -> HealthStatus {
        if self.0.status().connected() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Close the connection gracefully.
    pub(crate) async fn close(self) -> Result<(), lapin::Error> {
        // 200 is the AMQP reply code for a clean, deliberate shutdown.
        self.0.close(200, "connection disposed").await
    }
}

impl AsRef<lapin::Connection> for Connection {
    fn as_ref(&self) -> &lapin::Connection {
        &self.0
    }
}

/// A RabbitMq channel, multiplexed over the owning [`Connection`].
///
/// Publisher confirms are never enabled: outbound deliveries are
/// fire-and-forget and durability of published messages is the broker's
/// responsibility.
pub struct Channel(lapin::Channel);

impl Clone for Channel {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl Channel {
    /// Get access to the underlying raw channel.
    pub fn raw(&self) -> &lapin::Channel {
        &self.0
    }

    /// Publish a payload directly to a queue, routing it through the default
    /// exchange.
    ///
    /// The broker is not asked to confirm the delivery - a successful return
    /// means the message was handed to the transport, nothing more.
    #[tracing::instrument(level = "debug", skip(self, payload, properties))]
    pub async fn publish_to_queue(
        &self,
        payload: Vec<u8>,
        queue_name: &str,
        properties: Option<BasicProperties>,
    ) -> Result<(), lapin::Error> {
        let options = BasicPublishOptions {
            // Without publisher confirms the server silently drops unroutable
            // messages; `mandatory` would require listening for returns.
            mandatory: false,
            // The immediate flag was dropped in RabbitMQ 3.0 - setting `true`
            // causes a not-supported error.
            immediate: false,
        };
        // Delivery mode: Non-persistent (1) or persistent (2).
        let properties = properties.unwrap_or_default().with_delivery_mode(2);
        let _ = self
            .0
            .basic_publish("", queue_name, options, &payload, properties)
            .await?
            .await?;
        Ok(())
    }

    /// Create a durable RabbitMq queue.
    #[tracing::instrument(name = "broker_declare_durable_queue", skip(self))]
    pub async fn declare_durable_queue(&self, queue: &str) -> Result<(), lapin::Error> {
        let options = QueueDeclareOptions {
            passive: false,
            durable: true,
            exclusive: false,
            auto_delete: false,
            nowait: false,
        };
        self.0
            .queue_declare(queue, options, FieldTable::default())
            .await?;
        Ok(())
    }

    /// Retrieve the current length of a queue.
    ///
    /// # Implementation details
    ///
    /// The most convenient way to get the length of a queue in AMQP is...
    /// re-declaring it. We use `passive=true` to avoid settings conflicts.
    #[tracing::instrument(name = "broker_queue_length", skip(self))]
    pub async fn queue_length(&self, queue_name: &str) -> Result<u32, lapin::Error> {
        let options = QueueDeclareOptions {
            passive: true,
            ..QueueDeclareOptions::default()
        };
        let queue = self
            .0
            .queue_declare(queue_name, options, FieldTable::default())
            .await?;
        Ok(queue.message_count())
    }

    pub fn status(&self) -> HealthStatus {
        if self.0.status().connected() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        }
    }

    /// Close the channel gracefully.
    pub(crate) async fn close(self) -> Result<(), lapin::Error> {
        self.0.close(200, "channel disposed").await
    }
}
