use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use pin_project_lite::pin_project;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio::time::Timeout;
use tokio::time::timeout_at;
use tower::BoxError;
use tower::Service;
use tracing::warn;

use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::queue::AdmissionQueue;
use crate::queue::SubmitError;
use crate::record::Message;
use crate::record::Outcome;
use crate::record::Receipt;
use crate::record::Request;

/// The ingress of the relay.
///
/// Every call stamps a fresh deadline, submits a record to the admission
/// queue without waiting, and returns a future racing the record's outcome
/// against that same deadline. The service is always ready: backpressure is
/// expressed by failing the call with [`RelayError::Overloaded`].
#[derive(Clone, Debug)]
pub struct DispatchService {
    queue: AdmissionQueue,
    request_timeout: Duration,
    metrics: RelayMetrics,
}

pin_project! {
    /// Resolves to the outcome of one submitted request.
    pub struct ResponseFuture {
        #[pin]
        inner: Option<Timeout<oneshot::Receiver<Outcome>>>,
        deadline: Instant,
        rejected: Option<RelayError>,
        metrics: RelayMetrics,
    }
}

impl ResponseFuture {
    fn waiting(rx: oneshot::Receiver<Outcome>, deadline: Instant, metrics: RelayMetrics) -> Self {
        Self {
            inner: Some(timeout_at(deadline, rx)),
            deadline,
            rejected: None,
            metrics,
        }
    }

    fn rejected(error: RelayError, metrics: RelayMetrics) -> Self {
        Self {
            inner: None,
            deadline: Instant::now(),
            rejected: Some(error),
            metrics,
        }
    }
}

impl Future for ResponseFuture {
    type Output = Result<Receipt, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        if let Some(error) = this.rejected.take() {
            return Poll::Ready(Err(BoxError::from(error)));
        }

        let Some(pending) = this.inner.as_mut().as_pin_mut() else {
            return Poll::Ready(Err(BoxError::from(RelayError::Inner(
                "response polled after completion".to_string(),
            ))));
        };

        let result = match pending.poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Ok(Ok(outcome))) => outcome.into_result().map_err(BoxError::from),
            // The worker gives up at the deadline and may drop the sender
            // before our own timer fires.
            Poll::Ready(Ok(Err(_))) if Instant::now() >= *this.deadline => {
                this.metrics.timed_out("ingress");
                Err(BoxError::from(RelayError::Timeout))
            }
            // Dropped unanswered before the deadline: the loop stopped first.
            Poll::Ready(Ok(Err(_))) => Err(BoxError::from(RelayError::Inner(
                "request dropped before completion".to_string(),
            ))),
            Poll::Ready(Err(_)) => {
                this.metrics.timed_out("ingress");
                Err(BoxError::from(RelayError::Timeout))
            }
        };

        this.inner.set(None);
        Poll::Ready(result)
    }
}

impl Service<Message> for DispatchService {
    type Response = Receipt;
    type Error = BoxError;
    type Future = ResponseFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: Message) -> Self::Future {
        let deadline = deadline_after(self.request_timeout);
        let (request, rx) = Request::new(message, deadline);

        match self.queue.submit(request) {
            Ok(()) => {
                self.metrics.admitted();
                ResponseFuture::waiting(rx, deadline, self.metrics.clone())
            }
            Err(SubmitError::Overloaded(request)) => {
                warn!(
                    recipient = request.message.recipient,
                    capacity = self.queue.capacity(),
                    "admission queue full; request shed"
                );
                self.metrics.shed();
                ResponseFuture::rejected(RelayError::Overloaded, self.metrics.clone())
            }
            Err(SubmitError::Closed(_)) => {
                ResponseFuture::rejected(RelayError::Closed, self.metrics.clone())
            }
        }
    }
}

/// Far enough ahead to never fire, close enough not to overflow the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, capped at [`FAR_FUTURE`] from now.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(FAR_FUTURE)).unwrap_or(now)
}

impl DispatchService {
    pub(crate) fn new(
        queue: AdmissionQueue,
        request_timeout: Duration,
        metrics: RelayMetrics,
    ) -> Self {
        Self {
            queue,
            request_timeout,
            metrics,
        }
    }

    /// Number of requests admitted but not yet dispatched.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
