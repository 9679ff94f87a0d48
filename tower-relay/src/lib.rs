//! # Tower Relay
//!
//! `tower-relay` puts a slow, rate-sensitive downstream behind a bounded, paced
//! dispatcher built for the [Tower](https://github.com/tower-rs/tower) ecosystem.
//!
//! ## The Request Lifecycle
//!
//! [`DispatchLayer`] wraps a provider service and hands back a [`DispatchService`].
//! Each request moves through the same stages:
//!
//! 1. **Admission**: the ingress stamps a deadline and tries to enqueue the request.
//!    A full queue fails the call at once with [`RelayError::Overloaded`], so memory
//!    stays bounded and callers never block on admission.
//! 2. **Pacing**: a single dispatch loop takes one permit from a
//!    [`relay_limit::Strategy`] per release, so the provider never sees more than one
//!    call per interval, however deep the queue.
//! 3. **Execution**: a worker runs the provider call on a background task and races it
//!    against the request deadline.
//! 4. **Delivery**: the outcome is handed to the waiting caller with a send that never
//!    blocks. A caller that already timed out is simply no longer listening.
//!
//! Both the caller and the worker wait on the same deadline instant, so a caller gets
//! exactly one answer within its time budget even when the provider never replies.

mod dispatcher;
mod error;
mod layer;
mod metrics;
mod queue;
mod record;
mod service;
mod worker;


use tower::BoxError;
use tower::util::BoxCloneSyncService;

pub use dispatcher::Dispatcher;
pub use error::RelayError;
pub use layer::DispatchLayer;
pub use queue::AdmissionQueue;
pub use queue::QueueReceiver;
pub use queue::SubmitError;
pub use queue::admission_queue;
pub use record::Message;
pub use record::Outcome;
pub use record::ProviderFault;
pub use record::ProviderReply;
pub use record::Receipt;
pub use record::Request;
pub use service::DispatchService;
pub use service::ResponseFuture;
pub use worker::DeadlinePolicy;

/// A type-erased provider adapter.
pub type ProviderService = BoxCloneSyncService<Message, ProviderReply, BoxError>;
