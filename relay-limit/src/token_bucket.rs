use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use super::Reason;
use super::Strategy;

/// A token bucket refilled in whole intervals.
///
/// `increment` tokens are added for every `interval` that has fully elapsed,
/// and the bucket never holds more than `capacity` tokens. Each permit
/// consumes one token.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: usize,
    remaining: AtomicUsize,
    interval_ns: u64,
    /// Start of the current refill interval, in nanos from `anchor`
    last: AtomicU64,
    increment: usize,
    anchor: Instant,
}

impl Strategy for TokenBucket {
    fn process(&self) -> ControlFlow<Reason> {
        let now = self.now();
        self.refill(now);

        let taken = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |val| val.checked_sub(1));

        match taken {
            Ok(_) => ControlFlow::Continue(()),
            Err(_) => {
                let next_refill = self
                    .last
                    .load(Ordering::Acquire)
                    .saturating_add(self.interval_ns);
                ControlFlow::Break(Reason::Overloaded {
                    retry_after: Duration::from_nanos(next_refill.saturating_sub(now)),
                })
            }
        }
    }
}

impl TokenBucket {
    /// Creates a full bucket.
    pub fn new(capacity: NonZeroUsize, increment: usize, interval: Duration) -> Self {
        Self::with_tokens(capacity, capacity.get(), increment, interval)
    }

    /// Creates the pacer of a dispatch loop.
    ///
    /// The bucket starts empty, so the first permit is granted one `interval`
    /// after creation. One token is added per `interval` and at most `burst`
    /// tokens are kept while nobody takes them. With a `burst` of one this
    /// behaves like a ticker that drops missed ticks: at most one release per
    /// tick, and no catching up after an idle period.
    pub fn pacer(interval: Duration, burst: NonZeroUsize) -> Self {
        Self::with_tokens(burst, 0, 1, interval)
    }

    fn with_tokens(
        capacity: NonZeroUsize,
        tokens: usize,
        increment: usize,
        interval: Duration,
    ) -> Self {
        Self {
            capacity: capacity.get(),
            remaining: AtomicUsize::new(tokens.min(capacity.get())),
            interval_ns: u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX).max(1),
            last: AtomicU64::new(0),
            increment,
            anchor: Instant::now(),
        }
    }

    fn now(&self) -> u64 {
        u64::try_from(Instant::now().duration_since(self.anchor).as_nanos()).unwrap_or(u64::MAX)
    }

    fn refill(&self, now: u64) {
        let last = self.last.load(Ordering::Acquire);
        let intervals_passed = now.saturating_sub(last) / self.interval_ns;
        if intervals_passed == 0 {
            return;
        }

        // Only the thread that advances the clock adds the tokens.
        let next = last + intervals_passed * self.interval_ns;
        if self
            .last
            .compare_exchange(last, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let added = (intervals_passed as usize).saturating_mul(self.increment);
            let _ = self
                .remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    Some(current.saturating_add(added).min(self.capacity))
                });
        }
    }
}
