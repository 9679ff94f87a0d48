use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio::time::timeout_at;
use tower::ServiceExt;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::ProviderService;
use crate::metrics::RelayMetrics;
use crate::record::Outcome;
use crate::record::ProviderReply;
use crate::record::Request;

/// What happens to an in-flight provider call once its deadline elapses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeadlinePolicy {
    /// Stop waiting and let the call finish unobserved in the background.
    #[default]
    Detach,
    /// Abort the background task, dropping the transport future.
    Abort,
}

/// Executes a single dispatched request.
#[derive(Clone)]
pub(crate) struct Worker {
    pub(crate) provider: Option<ProviderService>,
    pub(crate) policy: DeadlinePolicy,
    pub(crate) metrics: RelayMetrics,
}

impl Worker {
    pub(crate) async fn run(self, request: Request) {
        let Worker {
            provider,
            policy,
            metrics,
        } = self;
        let Request {
            message,
            deadline,
            reply,
        } = request;

        let Some(provider) = provider else {
            error!(recipient = message.recipient, "no provider configured");
            deliver(&metrics, reply, Outcome::internal("API client not set"));
            return;
        };

        if deadline <= Instant::now() {
            warn!(
                recipient = message.recipient,
                "deadline elapsed while queued; provider not called"
            );
            metrics.timed_out("worker");
            return;
        }

        let recipient = message.recipient;
        let call = tokio::spawn(provider.oneshot(message));
        let abort = call.abort_handle();

        let outcome = match timeout_at(deadline, call).await {
            Ok(Ok(Ok(ProviderReply::Created(receipt)))) => Outcome::Delivered(receipt),
            Ok(Ok(Ok(ProviderReply::Rejected(faults)))) => {
                let outcome = Outcome::rejected(faults);
                warn!(recipient, ?outcome, "provider rejected request");
                outcome
            }
            Ok(Ok(Err(err))) => {
                error!(recipient, error = %err, "provider call failed");
                Outcome::internal(err.to_string())
            }
            Ok(Err(join_err)) => {
                error!(recipient, error = %join_err, "provider task did not complete");
                Outcome::internal("provider call did not complete")
            }
            Err(_) => {
                warn!(recipient, ?policy, "deadline elapsed during provider call");
                metrics.timed_out("worker");
                if policy == DeadlinePolicy::Abort {
                    abort.abort();
                }
                return;
            }
        };

        deliver(&metrics, reply, outcome);
    }
}

/// Hands the outcome over without waiting. A caller that already left is
/// not an error.
fn deliver(metrics: &RelayMetrics, reply: oneshot::Sender<Outcome>, outcome: Outcome) {
    let kind = outcome.kind();
    let delivered = reply.send(outcome).is_ok();
    metrics.outcome(kind, delivered);
    if !delivered {
        debug!(outcome = kind, "caller no longer waiting; outcome dropped");
    }
}
