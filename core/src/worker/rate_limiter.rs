//! Lock-free token bucket shared by every worker of a pool
//!
//! Tokens are stored as fixed-point units (1/1000 token) in a single `AtomicU64`, so
//! fractional refill amounts accumulate exactly and consumption is a plain
//! compare-and-swap loop. Capacity always equals the rate: the bucket holds at most one
//! second of traffic.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fixed-point units per token
const UNIT: u64 = 1_000;

/// Interval of the background refill task
pub const REFILL_INTERVAL: Duration = Duration::from_millis(10);

/// Sleep between acquisition attempts in [`RateLimiter::wait_for_token`]
pub const RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Smallest accepted rate; lower requests are raised to this
pub const MIN_RATE: u64 = 1;

/// Why [`RateLimiter::wait_for_token`] returned without a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// The caller's cancel signal fired
    #[error("token acquisition cancelled")]
    Cancelled,

    /// The limiter was stopped
    #[error("rate limiter stopped")]
    Stopped,
}

/// Token bucket admission controller
///
/// Share one instance between workers via `Arc`. All methods take `&self` and are
/// safe to call from any number of tasks or threads at once.
pub struct RateLimiter {
    /// Tokens per second (also the bucket capacity)
    rate: AtomicU64,

    /// Tokens currently in the bucket, in fixed-point units
    available: AtomicU64,

    /// Last refill, in nanoseconds since `origin`
    last_refill: AtomicU64,

    origin: Instant,

    /// Admit everything without touching the bucket
    unbounded: AtomicBool,

    stopped: AtomicBool,
    refill_started: AtomicBool,
    stop_token: CancellationToken,
}

impl RateLimiter {
    /// Create a bucket refilled at `rate` tokens per second, initially full
    ///
    /// A rate of 0 is raised to [`MIN_RATE`].
    pub fn new(rate: u64) -> Self {
        let rate = rate.max(MIN_RATE);
        Self {
            rate: AtomicU64::new(rate),
            available: AtomicU64::new(rate.saturating_mul(UNIT)),
            last_refill: AtomicU64::new(0),
            origin: Instant::now(),
            unbounded: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            refill_started: AtomicBool::new(false),
            stop_token: CancellationToken::new(),
        }
    }

    /// Create a limiter that admits every request
    pub fn unbounded() -> Self {
        let limiter = Self::new(MIN_RATE);
        limiter.unbounded.store(true, Ordering::SeqCst);
        limiter
    }

    /// Build the limiter for a configured rate, where 0 means unbounded
    pub fn for_rate(rate: u64) -> Self {
        if rate == 0 {
            Self::unbounded()
        } else {
            Self::new(rate)
        }
    }

    /// Try to take one token without waiting
    ///
    /// Returns `false` with no side effect when the bucket is empty or the limiter
    /// has been stopped.
    pub fn allow(&self) -> bool {
        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        if self.unbounded.load(Ordering::Acquire) {
            return true;
        }
        self.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current >= UNIT).then(|| current - UNIT)
            })
            .is_ok()
    }

    /// Wait until a token is available
    ///
    /// Re-checks `cancel` and the stop flag between attempts, so cancellation is
    /// observed within [`RETRY_INTERVAL`].
    pub async fn wait_for_token(&self, cancel: &CancellationToken) -> Result<(), AcquireError> {
        loop {
            if self.is_stopped() {
                return Err(AcquireError::Stopped);
            }
            if cancel.is_cancelled() {
                return Err(AcquireError::Cancelled);
            }
            if self.allow() {
                return Ok(());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AcquireError::Cancelled),
                _ = self.stop_token.cancelled() => return Err(AcquireError::Stopped),
                _ = tokio::time::sleep(RETRY_INTERVAL) => {}
            }
        }
    }

    /// Return one token taken by [`allow`](Self::allow) that was not used
    ///
    /// Never raises the bucket above capacity.
    pub fn refund(&self) {
        if self.is_stopped() || self.is_unbounded() {
            return;
        }
        let _ = self
            .available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let capacity = self.rate.load(Ordering::Acquire).saturating_mul(UNIT);
                Some(current.saturating_add(UNIT).min(capacity))
            });
    }

    /// Change rate and capacity together
    ///
    /// Available tokens are clamped down to the new capacity, never raised.
    /// A rate of 0 is raised to [`MIN_RATE`].
    pub fn set_rate(&self, rate: u64) {
        let rate = rate.max(MIN_RATE);
        let previous = self.rate.swap(rate, Ordering::SeqCst);
        self.clamp_to_capacity();
        if previous != rate {
            tracing::debug!(previous, rate, "Rate limiter rate changed");
        }
    }

    /// Switch between bucket admission and admitting everything
    pub fn set_unbounded(&self, unbounded: bool) {
        self.unbounded.store(unbounded, Ordering::SeqCst);
    }

    /// Tokens per second (and capacity)
    pub fn rate(&self) -> u64 {
        self.rate.load(Ordering::Acquire)
    }

    /// Bucket capacity in whole tokens
    pub fn capacity(&self) -> u64 {
        self.rate()
    }

    /// Whole tokens currently available
    pub fn available(&self) -> u64 {
        self.available.load(Ordering::Acquire) / UNIT
    }

    /// True when every request is admitted
    pub fn is_unbounded(&self) -> bool {
        self.unbounded.load(Ordering::Acquire)
    }

    /// True once [`stop`](Self::stop) was called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Add `rate × elapsed` tokens since the previous refill, clamped to capacity
    ///
    /// Each call claims the time slice since the previous one by swapping the
    /// timestamp, so concurrent refills never count the same interval twice.
    pub fn refill(&self) {
        if self.is_stopped() {
            return;
        }

        let now = self.origin.elapsed().as_nanos() as u64;
        let last = self.last_refill.swap(now, Ordering::SeqCst);
        if self.is_unbounded() {
            return;
        }

        let elapsed = now.saturating_sub(last);
        let rate = self.rate.load(Ordering::SeqCst);
        let added = (u128::from(rate) * u128::from(UNIT) * u128::from(elapsed) / 1_000_000_000)
            .min(u128::from(u64::MAX)) as u64;
        if added == 0 {
            return;
        }

        let capacity = rate.saturating_mul(UNIT);
        let _ = self
            .available
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < capacity).then(|| current.saturating_add(added).min(capacity))
            });

        // A concurrent set_rate may have lowered capacity after it was read above
        if self.rate.load(Ordering::SeqCst) != rate {
            self.clamp_to_capacity();
        }
    }

    /// Spawn the background refill task
    ///
    /// The task holds only a weak reference and exits when the limiter is stopped or
    /// dropped. Calling this more than once returns `None`.
    pub fn start_refill(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.refill_started.swap(true, Ordering::SeqCst) {
            return None;
        }

        // Discard the time spent before the task starts
        self.last_refill
            .store(self.origin.elapsed().as_nanos() as u64, Ordering::SeqCst);

        let limiter: Weak<Self> = Arc::downgrade(self);
        let stop = self.stop_token.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REFILL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        match limiter.upgrade() {
                            Some(limiter) => limiter.refill(),
                            None => break,
                        }
                    }
                }
            }
            tracing::trace!("Rate limiter refill task exited");
        }))
    }

    /// Stop the limiter
    ///
    /// Idempotent. Afterwards [`allow`](Self::allow) returns `false` and waiters
    /// return [`AcquireError::Stopped`].
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.stop_token.cancel();
            tracing::debug!("Rate limiter stopped");
        }
    }

    fn clamp_to_capacity(&self) {
        let _ = self
            .available
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let capacity = self.rate.load(Ordering::SeqCst).saturating_mul(UNIT);
                (current > capacity).then_some(capacity)
            });
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("rate", &self.rate())
            .field("available", &self.available())
            .field("unbounded", &self.is_unbounded())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
