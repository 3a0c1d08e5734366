//! Facilities to consume messages from a RabbitMq queue. Check out [`Consumer`]
//! as a starting point.
pub use consumer::{Consumer, SubscribeError};
pub use error::HandlerError;
pub use handler::{AsyncClosure, ClosureHandler, Handler};
pub use incoming_message::Incoming;

mod consumer;
mod delivery;
mod error;
mod handler;
mod incoming_message;
