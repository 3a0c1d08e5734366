//! Abstractions on top of [`lapin`]'s [`Channel`] and [`Connection`]: connection
//! settings, a connection factory and the [`ConnectionManager`] owning the
//! transport primitives shared by publishers and consumers.
//!
//! [`lapin`]: https://docs.rs/crate/lapin
//! [`Channel`]: https://docs.rs/lapin/latest/lapin/struct.Channel.html
//! [`Connection`]: https://docs.rs/lapin/latest/lapin/struct.Connection.html

pub mod configuration;
mod factory;
mod manager;
mod transport;

pub use configuration::{BrokerSettings, BrokerTlsSettings};
pub use factory::ConnectionFactory;
pub use manager::ConnectionManager;
pub use transport::{Channel, Connection, HealthStatus, TransportError};

/// An AMQP message retrieved from a queue. Re-exported from `lapin`.
pub use lapin::message::Delivery;
/// The set of AMQP headers associated with a message. Re-exported from `lapin`.
pub use lapin::protocol::basic::AMQPProperties;

// Re-export protocol types from `amq-protocol-types`.
pub use lapin::types as protocol_types;
