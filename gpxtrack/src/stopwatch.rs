//! Elapsed-time accumulation across pause and resume.
//!
//! [`StopWatch::elapsed`] is always computed from the running total and the
//! instant of the last start. An optional ticker task sends the formatted
//! elapsed time on an `mpsc` channel at a fixed interval while started.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default interval between ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Buffered ticks before new ones are dropped.
const TICK_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopWatchState {
    Stopped,
    Started,
}

#[derive(Debug, Default)]
struct Inner {
    running_total: Duration,
    started_at: Option<Instant>,
    ticker: Option<CancellationToken>,
}

impl Inner {
    fn cancel_ticker(&mut self) {
        if let Some(token) = self.ticker.take() {
            token.cancel();
        }
    }
}

/// Start/stop/reset timer.
#[derive(Debug)]
pub struct StopWatch {
    inner: Mutex<Inner>,
    interval: Duration,
    ticks: Option<mpsc::Sender<String>>,
}

impl StopWatch {
    /// Creates a stopwatch without ticks.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            interval: DEFAULT_TICK_INTERVAL,
            ticks: None,
        }
    }

    /// Creates a stopwatch that sends [`format_elapsed`] strings every
    /// `interval` while started.
    ///
    /// Ticks are dropped when the receiver falls behind. Starting outside a
    /// tokio runtime records time but sends no ticks.
    pub fn with_ticker(interval: Duration) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let stopwatch = Self {
            inner: Mutex::new(Inner::default()),
            interval: interval.max(Duration::from_millis(1)),
            ticks: Some(tx),
        };
        (stopwatch, rx)
    }

    pub fn state(&self) -> StopWatchState {
        if self.inner.lock().started_at.is_some() {
            StopWatchState::Started
        } else {
            StopWatchState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == StopWatchState::Started
    }

    /// Starts timing. No-op when already started.
    pub fn start(&self) {
        let mut inner = self.inner.lock();
        if inner.started_at.is_some() {
            return;
        }
        let now = Instant::now();
        inner.started_at = Some(now);
        inner.ticker = self.spawn_ticker(inner.running_total, now);
        debug!(total_secs = inner.running_total.as_secs(), "Stopwatch started");
    }

    /// Adds the current interval to the running total and halts ticks.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if let Some(started_at) = inner.started_at.take() {
            inner.running_total += started_at.elapsed();
        }
        inner.cancel_ticker();
        debug!(total_secs = inner.running_total.as_secs(), "Stopwatch stopped");
    }

    /// Zeroes the running total and stops.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.cancel_ticker();
        inner.started_at = None;
        inner.running_total = Duration::ZERO;
    }

    pub fn elapsed(&self) -> Duration {
        let inner = self.inner.lock();
        inner.running_total + inner.started_at.map_or(Duration::ZERO, |t| t.elapsed())
    }

    fn spawn_ticker(&self, base: Duration, started_at: Instant) -> Option<CancellationToken> {
        let tx = self.ticks.clone()?;
        let handle = tokio::runtime::Handle::try_current().ok()?;

        let token = CancellationToken::new();
        let cancellation = token.clone();
        let period = self.interval;

        handle.spawn(async move {
            let mut interval = tokio::time::interval_at(started_at + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = cancellation.cancelled() => break,

                    _ = interval.tick() => {
                        let elapsed = base + started_at.elapsed();
                        match tx.try_send(format_elapsed(elapsed)) {
                            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
        });

        Some(token)
    }
}

impl Default for StopWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StopWatch {
    fn drop(&mut self) {
        self.inner.get_mut().cancel_ticker();
    }
}

/// Renders `MM:SS`, or `{h}hMM:SS` from one hour on.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}h{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00");
        assert_eq!(format_elapsed(Duration::from_millis(59_999)), "00:59");
        assert_eq!(format_elapsed(Duration::from_secs(754)), "12:34");
        assert_eq!(format_elapsed(Duration::from_secs(3599)), "59:59");
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "1h00:00");
        assert_eq!(format_elapsed(Duration::from_secs(36_000 + 65)), "10h01:05");
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_previous_time() {
        let stopwatch = StopWatch::new();

        stopwatch.start();
        tokio::time::advance(Duration::from_secs(2)).await;
        stopwatch.stop();
        assert_eq!(stopwatch.elapsed(), Duration::from_secs(2));

        stopwatch.reset();
        assert_eq!(stopwatch.elapsed(), Duration::ZERO);
        assert_eq!(stopwatch.state(), StopWatchState::Stopped);

        stopwatch.start();
        tokio::time::advance(Duration::from_secs(1)).await;
        stopwatch.stop();
        assert_eq!(stopwatch.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accumulates_across_pauses() {
        let stopwatch = StopWatch::new();

        stopwatch.start();
        tokio::time::advance(Duration::from_secs(5)).await;
        stopwatch.stop();

        tokio::time::advance(Duration::from_secs(100)).await;
        assert_eq!(stopwatch.elapsed(), Duration::from_secs(5));

        stopwatch.start();
        stopwatch.start();
        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(stopwatch.is_running());
        assert_eq!(stopwatch.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_while_started() {
        let (stopwatch, mut rx) = StopWatch::with_ticker(Duration::from_secs(1));

        stopwatch.start();
        assert_eq!(rx.recv().await.as_deref(), Some("00:01"));
        assert_eq!(rx.recv().await.as_deref(), Some("00:02"));

        stopwatch.stop();
        let after_stop = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(after_stop.is_err(), "no ticks after stop");

        stopwatch.start();
        assert_eq!(rx.recv().await.as_deref(), Some("00:03"));
    }

    #[test]
    fn test_start_outside_runtime_still_times() {
        let (stopwatch, _rx) = StopWatch::with_ticker(DEFAULT_TICK_INTERVAL);
        stopwatch.start();
        assert!(stopwatch.is_running());
        stopwatch.stop();
        assert!(!stopwatch.is_running());
    }
}
