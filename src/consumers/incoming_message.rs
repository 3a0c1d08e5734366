use std::sync::Arc;

/// A dequeued message, decoded and enriched with some auxiliary data, ready for
/// processing.
///
/// `Incoming` is the input type of our message handler functions (check out
/// [`Handler`](crate::consumers::Handler)'s docs for more details).
pub struct Incoming<'d, C> {
    /// `context` is a set of resources that are required to process the message and
    /// are outside the lifecycle of the message itself - e.g. an HTTP client for a
    /// third-party API, a db connection pool, etc.
    ///
    /// # Ownership
    ///
    /// The context is behind an `Arc` pointer: this allows multiple messages to
    /// access the same context without having to create an ad-hoc instance of
    /// `context` for each message - it might be expensive!
    pub context: Arc<C>,
    /// The message payload, decoded as UTF-8 text.
    ///
    /// Payloads that fail to decode never reach a handler - they are rejected
    /// without requeue by the consumer.
    pub payload: &'d str,
    /// The name of the queue the message was pulled from.
    pub queue_name: &'d str,
    /// The delivery tag assigned by the broker.
    ///
    /// Tags are opaque and scoped to the channel's lifetime - never persist or
    /// reuse them across reconnects.
    pub delivery_tag: u64,
}
