//! Facilities to publish messages to a RabbitMq queue. Check out [`Publisher`] as a
//! starting point.
mod outgoing_message;
mod publisher;

pub use outgoing_message::OutgoingMessage;
pub use publisher::{PublishError, Publisher};
