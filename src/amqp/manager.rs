use crate::amqp::factory::ConnectionFactory;
use crate::amqp::transport::{Channel, Connection, HealthStatus, TransportError};
use std::sync::Mutex;
use tracing::info;

/// The owner of the broker transport primitives.
///
/// A `ConnectionManager` holds exactly one [`Connection`] and one shared
/// [`Channel`], established eagerly by [`ConnectionManager::connect`]. Both
/// [`Publisher`](crate::publishers::Publisher) and
/// [`Consumer`](crate::consumers::Consumer) borrow the same channel through the
/// manager - there is no ambient or static transport state.
///
/// # Lifecycle
///
/// - [`ConnectionManager::connect`] fails fast: if either the connection or the
///   channel cannot be established, the caller gets an error and no manager.
/// - [`ConnectionManager::channel`] returns [`TransportError::Uninitialized`]
///   whenever the shared channel is missing - on a manager built with
///   [`ConnectionManager::unconnected`] or after [`ConnectionManager::close`].
/// - [`ConnectionManager::close`] releases the channel first, then the
///   connection (a channel is scoped to its owning connection). It is idempotent
///   and safe to call on a manager that never connected.
pub struct ConnectionManager {
    state: Mutex<TransportState>,
}

#[derive(Default)]
struct TransportState {
    connection: Option<Connection>,
    channel: Option<Channel>,
}

impl ConnectionManager {
    /// Establish the connection and open the shared channel, eagerly.
    ///
    /// There is no retry on failure: transient startup issues surface to the
    /// caller, which owns the restart policy.
    #[tracing::instrument(name = "transport_connect", skip_all)]
    pub async fn connect(factory: &ConnectionFactory) -> Result<Self, TransportError> {
        let connection = factory.new_connection().await?;
        let channel = connection
            .create_channel()
            .await
            .map_err(TransportError::Channel)?;
        Ok(Self {
            state: Mutex::new(TransportState {
                connection: Some(connection),
                channel: Some(channel),
            }),
        })
    }

    /// A manager with no live transport.
    ///
    /// Every channel-dependent operation on it (and on publishers/consumers built
    /// from it) fails with [`TransportError::Uninitialized`] until it is replaced
    /// by a connected manager. Mostly useful to exercise failure paths in tests
    /// and for compositions that wire collaborators before connecting.
    pub fn unconnected() -> Self {
        Self {
            state: Mutex::new(TransportState::default()),
        }
    }

    /// Get a handle to the shared channel.
    ///
    /// The returned [`Channel`] is a clone of the single channel owned by the
    /// manager: `lapin` channels are cheap to clone and safe to use from
    /// multiple tasks.
    pub fn channel(&self) -> Result<Channel, TransportError> {
        let state = self.state.lock().map_err(|_| TransportError::Poisoned)?;
        state.channel.clone().ok_or(TransportError::Uninitialized)
    }

    /// Health of the shared channel.
    ///
    /// An unconnected or disposed manager reports [`HealthStatus::Unhealthy`].
    pub fn status(&self) -> HealthStatus {
        match self.state.lock() {
            Ok(state) => state
                .channel
                .as_ref()
                .map(Channel::status)
                .unwrap_or(HealthStatus::Unhealthy),
            Err(_) => HealthStatus::Unhealthy,
        }
    }

    /// Release the transport resources: channel first, then connection.
    ///
    /// Safe to call more than once and safe on a partially constructed or
    /// unconnected manager - absent resources are skipped. If the channel
    /// refuses to close cleanly, the connection is still released.
    #[tracing::instrument(name = "transport_close", skip_all)]
    pub async fn close(&self) -> Result<(), TransportError> {
        let (channel, connection) = {
            let mut state = self.state.lock().map_err(|_| TransportError::Poisoned)?;
            (state.channel.take(), state.connection.take())
        };

        let channel_outcome = match channel {
            Some(channel) => channel.close().await,
            None => Ok(()),
        };
        let connection_outcome = match connection {
            Some(connection) => {
                info!("closing the broker connection");
                connection.close().await
            }
            None => Ok(()),
        };

        channel_outcome
            .and(connection_outcome)
            .map_err(TransportError::Close)
    }
}
