use std::ops::ControlFlow;
use std::sync::Arc;

use relay_limit::Reason;
use relay_limit::Strategy;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;

use crate::queue::QueueReceiver;
use crate::record::Request;
use crate::worker::Worker;

/// The single loop releasing queued requests to workers.
///
/// Each turn takes one permit from the pacer, then pulls exactly one record
/// from the admission queue and spawns a worker for it. Downstream latency
/// lives entirely inside the workers, so the loop only ever waits on the
/// pacer and on an empty queue.
pub struct Dispatcher<L>
where
    L: ?Sized,
{
    queue: QueueReceiver,
    pacer: Arc<L>,
    worker: Worker,
    shutdown: CancellationToken,
}

impl<L> Dispatcher<L>
where
    L: Strategy + ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(
        queue: QueueReceiver,
        pacer: Arc<L>,
        worker: Worker,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            pacer,
            worker,
            shutdown,
        }
    }

    /// Runs until the shutdown token is cancelled or every ingress handle is dropped.
    ///
    /// Records still queued when the loop stops are dropped, and their callers
    /// observe an internal error.
    pub async fn run(mut self) {
        info!(pacer = ?self.pacer, "dispatcher started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = next_release(self.pacer.as_ref(), &mut self.queue) => next,
            };

            let Some(request) = next else {
                break;
            };

            debug!(
                recipient = request.message.recipient,
                remaining = ?request.deadline.checked_duration_since(tokio::time::Instant::now()),
                "dispatching request"
            );
            tokio::spawn(self.worker.clone().run(request));
        }

        self.queue.close();
        info!("dispatcher stopped");
    }
}

/// Waits for a permit, then for a record.
async fn next_release<L>(pacer: &L, queue: &mut QueueReceiver) -> Option<Request>
where
    L: Strategy + ?Sized,
{
    while let ControlFlow::Break(Reason::Overloaded { retry_after }) = pacer.process() {
        sleep(retry_after).await;
    }
    queue.next().await
}
