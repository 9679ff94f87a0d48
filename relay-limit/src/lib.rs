//! # relay-limit
//!
//! `relay-limit` provides the pacing strategies used by a request relay to decide when the
//! next queued request may be released to a rate-sensitive downstream.
//!
//! ## Core Philosophy
//!
//! A pacer is asked, once per release, whether one more request may go out now. It answers
//! without blocking and without locks, using atomic primitives and Compare-And-Swap (CAS)
//! loops. When the answer is "not yet" it says exactly how long to wait, so the caller can
//! sleep instead of spinning.
//!
//! ## Key Concepts
//!
//! * **Lock-Free**: No `Mutex` or `RwLock` in the hot path.
//! * **Lazy Evaluation**: Tokens are recalculated at the moment of the request,
//!   so no background ticker task is needed.
//! * **Tokio Time**: Time is read from [`tokio::time::Instant`], so a paused test clock
//!   drives the strategies deterministically.
//!
//! ## Example
//!
//! ```rust
//! use relay_limit::Reason;
//! use relay_limit::Strategy;
//! use relay_limit::TokenBucket;
//! use std::num::NonZeroUsize;
//! use std::ops::ControlFlow;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // One release per second, no credit kept beyond a single tick.
//! let pacer = TokenBucket::pacer(Duration::from_secs(1), NonZeroUsize::MIN);
//!
//! // A pacer starts empty, like a ticker waiting for its first tick.
//! match pacer.process() {
//!     ControlFlow::Continue(()) => unreachable!(),
//!     ControlFlow::Break(Reason::Overloaded { retry_after }) => {
//!         assert!(retry_after <= Duration::from_secs(1));
//!     }
//! }
//! # }
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod token_bucket;

pub use token_bucket::TokenBucket;

/// Reasons why a strategy refuses to release a request.
#[derive(Debug, PartialEq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

/// The core trait for all pacing algorithms.
///
/// Strategies must be `Send` and `Sync` to be shared with a dispatch loop
/// via `Arc`.
pub trait Strategy: Debug {
    /// Attempts to take a single release permit.
    ///
    /// This method is non-blocking and uses atomic operations to update
    /// internal state.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if no permit is available yet.
    fn process(&self) -> ControlFlow<Reason>;
}
