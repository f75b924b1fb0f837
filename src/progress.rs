//! Progress reporting for page-by-page degradation runs.
//!
//! The orchestrator calls a [`ProgressSink`] exactly once per completed page.
//! Sinks may suspend (they typically forward the event over a network channel
//! to whoever is watching), so the trait returns a boxed future.
//!
//! Two wrappers shape what a watcher actually sees:
//!
//! * [`RateLimitedReporter`] drops events that arrive less than a minimum
//!   interval after the last visible one, but always lets the final 100 %
//!   event through so the watcher gets a "done" signal.
//! * Delivery is best-effort. The orchestrator discards any error or panic
//!   coming out of a sink, and `RateLimitedReporter` swallows its inner
//!   sink's errors as well.
//!
//! # Example
//!
//! ```rust
//! use pdf_degrade::{ProgressEvent, ProgressSink, RateLimitedReporter, ReporterError};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let print = |e: ProgressEvent| -> Result<(), ReporterError> {
//!     eprintln!("{}% (page {}/{})", e.percent_complete, e.current_page, e.total_pages);
//!     Ok(())
//! };
//! let sink: Arc<dyn ProgressSink> =
//!     Arc::new(RateLimitedReporter::new(print, Duration::from_secs(2)));
//! ```

use crate::error::ReporterError;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Minimum wall-clock gap between two visible non-final progress updates.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(2);

/// One page finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// `current_page * 100 / total_pages`, rounded down. 100 on the last page.
    pub percent_complete: u8,
    /// 1-indexed page that just completed.
    pub current_page: usize,
    pub total_pages: usize,
}

impl ProgressEvent {
    pub fn new(current_page: usize, total_pages: usize) -> Self {
        let percent = if total_pages == 0 {
            100
        } else {
            (current_page.min(total_pages) * 100 / total_pages) as u8
        };
        Self {
            percent_complete: percent,
            current_page,
            total_pages,
        }
    }

    pub fn is_final(&self) -> bool {
        self.percent_complete >= 100
    }
}

/// Receives one [`ProgressEvent`] per completed page.
///
/// Implementations must be `Send + Sync`; the returned future may suspend.
/// A returned error never aborts the pipeline.
///
/// Plain closures `Fn(ProgressEvent) -> Result<(), ReporterError>` implement
/// this trait directly.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: ProgressEvent) -> BoxFuture<'_, Result<(), ReporterError>>;
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) -> Result<(), ReporterError> + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) -> BoxFuture<'_, Result<(), ReporterError>> {
        future::ready(self(event)).boxed()
    }
}

/// A sink that ignores every event. Used when the caller passes no sink.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) -> BoxFuture<'_, Result<(), ReporterError>> {
        future::ready(Ok(())).boxed()
    }
}

/// Shared handle to a sink, as accepted by [`crate::run_pipeline`].
pub type ProgressCallback = Arc<dyn ProgressSink>;

/// Decides whether an event is allowed to become visible.
///
/// Pure state machine over caller-supplied instants so it can be tested
/// without sleeping.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_emit: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: None,
        }
    }

    /// Returns `true` and records `now` if the event should be emitted.
    ///
    /// The first event always passes; a 100 % event always passes.
    pub fn admit(&mut self, now: Instant, percent_complete: u8) -> bool {
        if percent_complete < 100 {
            if let Some(last) = self.last_emit {
                if now.saturating_duration_since(last) < self.min_interval {
                    return false;
                }
            }
        }
        self.last_emit = Some(now);
        true
    }
}

/// Rate-limited, best-effort decorator around any [`ProgressSink`].
pub struct RateLimitedReporter<S> {
    inner: S,
    limiter: Mutex<RateLimiter>,
}

impl<S: ProgressSink> RateLimitedReporter<S> {
    pub fn new(inner: S, min_interval: Duration) -> Self {
        Self {
            inner,
            limiter: Mutex::new(RateLimiter::new(min_interval)),
        }
    }

    /// Wrap `inner` with the default 2-second interval.
    pub fn with_default_interval(inner: S) -> Self {
        Self::new(inner, DEFAULT_MIN_INTERVAL)
    }

    fn admit(&self, event: &ProgressEvent) -> bool {
        self.limiter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .admit(Instant::now(), event.percent_complete)
    }
}

impl<S: ProgressSink> ProgressSink for RateLimitedReporter<S> {
    fn on_progress(&self, event: ProgressEvent) -> BoxFuture<'_, Result<(), ReporterError>> {
        if !self.admit(&event) {
            return future::ready(Ok(())).boxed();
        }
        async move {
            if let Err(e) = self.inner.on_progress(event).await {
                debug!("Dropped progress update for page {}: {}", event.current_page, e);
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        seen: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ProgressSink for CountingSink {
        fn on_progress(&self, _event: ProgressEvent) -> BoxFuture<'_, Result<(), ReporterError>> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            async move {
                tokio::task::yield_now().await;
                if fail {
                    Err(ReporterError::new("channel closed"))
                } else {
                    Ok(())
                }
            }
            .boxed()
        }
    }

    #[test]
    fn percent_is_floored_and_last_page_is_100() {
        assert_eq!(ProgressEvent::new(1, 3).percent_complete, 33);
        assert_eq!(ProgressEvent::new(2, 3).percent_complete, 66);
        assert_eq!(ProgressEvent::new(3, 3).percent_complete, 100);
        assert!(ProgressEvent::new(3, 3).is_final());
        assert!(!ProgressEvent::new(99, 100).is_final());
    }

    #[test]
    fn first_event_always_emits() {
        let mut limiter = RateLimiter::new(Duration::from_secs(2));
        assert!(limiter.admit(Instant::now(), 10));
    }

    #[test]
    fn close_non_final_events_do_not_both_emit() {
        let mut limiter = RateLimiter::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(limiter.admit(t0, 20));
        assert!(!limiter.admit(t0 + Duration::from_millis(500), 40));
        assert!(!limiter.admit(t0 + Duration::from_millis(1999), 60));
        assert!(limiter.admit(t0 + Duration::from_secs(2), 80));
    }

    #[test]
    fn final_event_bypasses_interval() {
        let mut limiter = RateLimiter::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(limiter.admit(t0, 50));
        assert!(limiter.admit(t0 + Duration::from_millis(1), 100));
    }

    #[test]
    fn suppressed_events_do_not_reset_the_window() {
        let mut limiter = RateLimiter::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(limiter.admit(t0, 10));
        assert!(!limiter.admit(t0 + Duration::from_millis(1500), 20));
        // Measured from t0, not from the suppressed event.
        assert!(limiter.admit(t0 + Duration::from_millis(2100), 30));
    }

    #[test]
    fn reporter_forwards_first_and_final_only_when_burst() {
        let seen = Arc::new(AtomicUsize::new(0));
        let reporter = RateLimitedReporter::new(
            CountingSink {
                seen: Arc::clone(&seen),
                fail: false,
            },
            Duration::from_secs(60),
        );

        tokio_test::block_on(async {
            for page in 1..=5 {
                reporter
                    .on_progress(ProgressEvent::new(page, 5))
                    .await
                    .unwrap();
            }
        });

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reporter_swallows_inner_errors() {
        let seen = Arc::new(AtomicUsize::new(0));
        let reporter = RateLimitedReporter::with_default_interval(CountingSink {
            seen: Arc::clone(&seen),
            fail: true,
        });

        let result = tokio_test::block_on(reporter.on_progress(ProgressEvent::new(1, 1)));
        assert!(result.is_ok());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn closures_are_sinks() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sink: ProgressCallback = Arc::new(move |_e: ProgressEvent| -> Result<(), ReporterError> {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        tokio_test::block_on(sink.on_progress(ProgressEvent::new(1, 2))).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_sink_is_ok() {
        let sink = NoopProgress;
        assert!(tokio_test::block_on(sink.on_progress(ProgressEvent::new(2, 2))).is_ok());
    }
}
