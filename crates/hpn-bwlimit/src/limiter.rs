use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use coarsetime::Instant;

/// Sleeps shorter than this are skipped; a limiter that woke for every
/// byte over budget would turn a bulk transfer into a syscall storm.
const MIN_SLEEP: Duration = Duration::from_millis(10);

struct Inner {
    /// Target rate in bytes/sec, or `0.0` for "unlimited".
    bytes_per_sec: f64,
    /// Bytes reported since `interval_start`.
    counted: u64,
    interval_start: Instant,
}

/// Computes how long to sleep, given a target rate, bytes counted so far
/// in the current interval, and how much wall-clock time that interval
/// has actually spanned. Pure function so the policy is testable without
/// a real clock or thread.
fn compute_sleep(bytes_per_sec: f64, counted: u64, elapsed: Duration) -> Option<Duration> {
    if bytes_per_sec <= 0.0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let allowed = bytes_per_sec * elapsed.as_secs_f64();
    #[allow(clippy::cast_precision_loss)]
    let counted = counted as f64;
    if counted <= allowed {
        return None;
    }
    let excess_secs = (counted - allowed) / bytes_per_sec;
    let sleep = Duration::from_secs_f64(excess_secs.max(0.0));
    if sleep < MIN_SLEEP {
        None
    } else {
        Some(sleep)
    }
}

/// A token-bucket bandwidth limiter for a single blocking stream.
///
/// Unlike an async rate limiter that hands out a [`Permit`] a caller must
/// wait on, this one is driven after the fact: perform the I/O, then tell
/// the limiter how many bytes it cost. The limiter sleeps the calling
/// thread directly when the running average has gotten ahead of the
/// target rate.
pub struct BwLimiter {
    inner: Mutex<Inner>,
}

impl BwLimiter {
    /// Creates a limiter targeting `rate_kbps` kilobits/sec. A rate of
    /// `0` disables throttling entirely.
    #[must_use]
    pub fn new(rate_kbps: u32) -> Self {
        let bytes_per_sec = f64::from(rate_kbps) * 1000.0 / 8.0;
        BwLimiter {
            inner: Mutex::new(Inner {
                bytes_per_sec,
                counted: 0,
                interval_start: Instant::now(),
            }),
        }
    }

    /// Reports that `n` bytes just crossed the wire on this stream,
    /// sleeping the calling thread if the running rate has gotten ahead
    /// of target. Resets the accounting interval after a sleep so rate
    /// error doesn't accumulate across calls.
    pub fn account(&self, n: usize) {
        let sleep = {
            let mut inner = self.inner.lock().expect("bandwidth limiter lock poisoned");
            inner.counted = inner.counted.saturating_add(n as u64);
            let elapsed = inner.interval_start.elapsed().into();
            let sleep = compute_sleep(inner.bytes_per_sec, inner.counted, elapsed);
            if sleep.is_some() {
                inner.counted = 0;
                inner.interval_start = Instant::now();
            }
            sleep
        };
        if let Some(sleep) = sleep {
            tracing::trace!(sleep_ms = sleep.as_millis() as u64, "throttling for bandwidth limit");
            thread::sleep(sleep);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unlimited_rate_never_sleeps() {
        assert_eq!(compute_sleep(0.0, 10_000_000, Duration::from_millis(1)), None);
    }

    #[test]
    fn within_budget_does_not_sleep() {
        // 1000 bytes/sec target; 100 bytes in 200ms is under budget.
        assert_eq!(compute_sleep(1000.0, 100, Duration::from_millis(200)), None);
    }

    #[test]
    fn over_budget_sleeps_proportionally() {
        // 1000 bytes/sec target; 1000 bytes reported with zero elapsed
        // time is entirely over budget: should sleep ~1 second.
        let sleep = compute_sleep(1000.0, 1000, Duration::from_millis(0)).expect("should sleep");
        assert!((sleep.as_secs_f64() - 1.0).abs() < 0.01);
    }

    #[test]
    fn tiny_overage_is_not_worth_a_sleep() {
        // Excess of a handful of milliseconds falls below MIN_SLEEP.
        assert_eq!(compute_sleep(1_000_000.0, 1001, Duration::from_millis(1)), None);
    }

    #[test]
    fn account_does_not_panic_when_unlimited() {
        let limiter = BwLimiter::new(0);
        limiter.account(1 << 20);
    }
}
