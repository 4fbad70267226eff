//! Waiting primitives
//!
//! Two deliberately separate tools: [`Waiter::fixed_delay`] gives a
//! client-rendered page time to settle when no readiness signal exists, and
//! [`Waiter::bounded_poll`] waits for a specific condition with a hard
//! timeout. Both go through a [`Clock`] so tests run on virtual time.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::trace;

use crate::core::{Result, SitepilotError};

/// Source of time for waits
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock was created
    fn elapsed(&self) -> Duration;

    /// Pause for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers
#[derive(Debug, Clone)]
pub struct TokioClock {
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock: sleeping advances virtual time instantly
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sleep requested so far
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Total virtual time slept
    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn elapsed(&self) -> Duration {
        self.now.lock().map(|n| *n).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += duration;
        }
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

/// The wait strategy used between actions and for element appearance
#[derive(Clone)]
pub struct Waiter {
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
}

impl Waiter {
    pub fn new(clock: Arc<dyn Clock>, poll_interval: Duration) -> Self {
        Self {
            clock,
            poll_interval,
        }
    }

    /// Waiter on the wall clock
    pub fn real(poll_interval: Duration) -> Self {
        Self::new(Arc::new(TokioClock::new()), poll_interval)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Unconditional pause
    pub async fn fixed_delay(&self, duration: Duration) {
        if !duration.is_zero() {
            trace!(?duration, "fixed delay");
            self.clock.sleep(duration).await;
        }
    }

    /// Probe until it yields a value or `timeout` passes.
    ///
    /// The check runs at least once. `Ok(None)` means "not yet"; a check
    /// error is returned immediately. Expiry is
    /// [`SitepilotError::LoadTimeout`].
    pub async fn bounded_poll<T, F, Fut>(
        &self,
        what: &str,
        timeout: Duration,
        interval: Duration,
        mut check: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let start = self.clock.elapsed();
        let interval = interval.max(Duration::from_millis(1));

        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }

            let waited = self.clock.elapsed().saturating_sub(start);
            if waited >= timeout {
                return Err(SitepilotError::timeout(what, waited));
            }

            self.clock.sleep(interval.min(timeout - waited)).await;
        }
    }

    /// [`Waiter::bounded_poll`] for a plain condition
    pub async fn poll_until<F, Fut>(&self, what: &str, timeout: Duration, mut predicate: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        self.bounded_poll(what, timeout, self.poll_interval, || {
            let fut = predicate();
            async move { Ok::<_, SitepilotError>(fut.await?.then_some(())) }
        })
        .await
    }
}
