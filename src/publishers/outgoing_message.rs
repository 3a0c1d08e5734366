use amq_protocol_types::{FieldTable, ShortString, Timestamp};

use crate::amqp::AMQPProperties;

/// A message to be transmitted by [`Publisher`](crate::publishers::Publisher).
///
/// The payload is an opaque sequence of bytes: the publisher does not validate or
/// interpret it.
#[derive(Default)]
pub struct OutgoingMessage {
    /// The body of the message - as a sequence of bytes.
    pub payload: Vec<u8>,
    /// The name of the destination queue.
    ///
    /// The queue is assumed to pre-exist or to be declared by configuration
    /// outside this crate; the message is routed to it through the default
    /// exchange.
    pub queue_name: String,
    /// AMQP properties attached to the message.
    /// It can be omitted by passing `None`.
    pub properties: Option<AMQPProperties>,
}

impl OutgoingMessage {
    pub fn with_payload(mut self, value: Vec<u8>) -> Self {
        self.payload = value;
        self
    }

    pub fn with_queue_name(mut self, value: String) -> Self {
        self.queue_name = value;
        self
    }

    fn props(mut self, f: impl FnOnce(AMQPProperties) -> AMQPProperties) -> Self {
        self.properties = Some(f(self.properties.unwrap_or_default()));
        self
    }

    pub fn with_content_type(self, value: ShortString) -> Self {
        self.props(|p| p.with_content_type(value))
    }

    pub fn with_headers(self, value: FieldTable) -> Self {
        self.props(|p| p.with_headers(value))
    }

    pub fn with_correlation_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_correlation_id(value))
    }

    pub fn with_message_id(self, value: ShortString) -> Self {
        self.props(|p| p.with_message_id(value))
    }

    pub fn with_expiration(self, value: ShortString) -> Self {
        self.props(|p| p.with_expiration(value))
    }

    pub fn with_timestamp(self, value: Timestamp) -> Self {
        self.props(|p| p.with_timestamp(value))
    }
}
