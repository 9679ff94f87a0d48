use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use relay_limit::Strategy;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::ProviderService;
use crate::dispatcher::Dispatcher;
use crate::metrics::RelayMetrics;
use crate::queue::admission_queue;
use crate::record::Message;
use crate::record::ProviderReply;
use crate::service::DispatchService;
use crate::worker::DeadlinePolicy;
use crate::worker::Worker;

/// Puts an admission queue and a paced dispatch loop in front of a provider.
///
/// Layering a provider spawns the dispatch loop on the current tokio runtime,
/// so it must be called from within one.
#[derive(Debug)]
pub struct DispatchLayer<L>
where
    L: ?Sized,
{
    pacer: Arc<L>,
    buffer: NonZeroUsize,
    request_timeout: Duration,
    policy: DeadlinePolicy,
    shutdown: CancellationToken,
}

impl<L> Clone for DispatchLayer<L>
where
    L: ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            pacer: Arc::clone(&self.pacer),
            buffer: self.buffer,
            request_timeout: self.request_timeout,
            policy: self.policy,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<L> DispatchLayer<L>
where
    L: Strategy + ?Sized + Send + Sync + 'static,
{
    /// Create a DispatchLayer
    ///
    /// At most `buffer` requests wait for dispatch, the pacer decides when the
    /// next one is released, and every request is answered within `request_timeout`.
    pub fn new(pacer: Arc<L>, buffer: NonZeroUsize, request_timeout: Duration) -> Self {
        DispatchLayer {
            pacer,
            buffer,
            request_timeout,
            policy: DeadlinePolicy::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Choose what happens to a provider call still running at its deadline.
    pub fn with_deadline_policy(mut self, policy: DeadlinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop the dispatch loop when `shutdown` is cancelled.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Build the ingress service and its dispatch loop without spawning the loop.
    ///
    /// A missing provider is a valid configuration: every dispatched request
    /// then fails with an internal error.
    pub fn pair(&self, provider: Option<ProviderService>) -> (DispatchService, Dispatcher<L>) {
        let (queue, receiver) = admission_queue(self.buffer);
        let metrics = RelayMetrics::new();
        let worker = Worker {
            provider,
            policy: self.policy,
            metrics: metrics.clone(),
        };

        let dispatcher = Dispatcher::new(
            receiver,
            Arc::clone(&self.pacer),
            worker,
            self.shutdown.clone(),
        );
        let service = DispatchService::new(queue, self.request_timeout, metrics);
        (service, dispatcher)
    }

    /// Build the ingress service and spawn its dispatch loop.
    pub fn spawn(&self, provider: Option<ProviderService>) -> DispatchService {
        let (service, dispatcher) = self.pair(provider);
        tokio::spawn(dispatcher.run());
        service
    }
}

impl<L, S> Layer<S> for DispatchLayer<L>
where
    L: Strategy + ?Sized + Send + Sync + 'static,
    S: Service<Message, Response = ProviderReply, Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    type Service = DispatchService;

    fn layer(&self, provider: S) -> Self::Service {
        self.spawn(Some(BoxCloneSyncService::new(provider)))
    }
}
