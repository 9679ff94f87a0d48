/// Errors produced by the relay while admitting and resolving a request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The admission queue was already holding its full capacity of requests.
    ///
    /// Raised synchronously by the ingress, the request never entered the queue.
    #[error("Admission queue is full; request shed")]
    Overloaded,

    /// The request deadline elapsed before an outcome was delivered.
    #[error("Request deadline elapsed before an outcome was delivered")]
    Timeout,

    /// The downstream provider declared the request invalid or unauthorized.
    ///
    /// `code` is the provider's first error code, when it reported one.
    #[error("Provider rejected the request: {message}")]
    Rejected { code: Option<i64>, message: String },

    /// Transport, decoding or configuration failure.
    ///
    /// The string contains the `Display` representation of the underlying error.
    #[error("Internal relay error: {0}")]
    Inner(String),

    /// The dispatch loop has stopped and no longer admits requests.
    #[error("Dispatcher is shutting down")]
    Closed,
}
