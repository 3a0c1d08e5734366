use std::fmt;

/// The error type returned by message handlers.
///
/// Handler outcomes are explicit values, not control flow: the consumer decides
/// whether to acknowledge or reject a delivery purely by inspecting the
/// `Result` returned by the handler. A `HandlerError` is recovered locally -
/// it is converted into a reject-with-requeue for the failed delivery and never
/// propagated to the subscription loop.
pub struct HandlerError {
    inner: anyhow::Error,
}

impl HandlerError {
    /// Wrap any error as a handler failure.
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: error.into(),
        }
    }

    /// Build a handler failure from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            inner: anyhow::Error::msg(message),
        }
    }

    /// The underlying cause.
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }
}

// `HandlerError` deliberately does not implement `std::error::Error`: that keeps
// the blanket `From` below coherent, mirroring how `anyhow::Error` does it.
impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self {
            inner: error.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}
