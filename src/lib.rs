//! `mailroom` is a reliable message-delivery client, built on top of
//! [`lapin`](https://crates.io/crates/lapin), to make it easy and ergonomic to hand
//! messages to RabbitMQ and to pull them back out with sound acknowledgment
//! semantics.
//!
//! The crate provides three cooperating pieces:
//!
//! - [`ConnectionManager`](crate::amqp::ConnectionManager) owns the broker
//!   connection and the single shared channel, established eagerly and released
//!   deterministically;
//! - [`Publisher`](crate::publishers::Publisher) serializes a typed message and
//!   transmits it to a named destination queue, fire-and-forget;
//! - [`Consumer`](crate::consumers::Consumer) subscribes to a named queue in
//!   manual-acknowledgment mode, decodes each payload to text, invokes a
//!   caller-supplied handler and settles the delivery according to the outcome:
//!   acknowledge on success, reject-with-requeue on failure.
//!
//! [`Publisher`](crate::publishers::Publisher) and
//! [`Consumer`](crate::consumers::Consumer) are the best starting points to learn
//! what `mailroom` provides and how to leverage it.

pub mod amqp;
pub mod consumers;
pub mod publishers;

// Re-export the transport entrypoints for convenience.
pub use amqp::{BrokerSettings, ConnectionFactory, ConnectionManager, TransportError};
