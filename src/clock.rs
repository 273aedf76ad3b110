//! Tick scheduling.
//!
//! The timeline never reads a clock itself. It is fed elapsed deltas by a
//! `Ticker`, which is a tokio interval in production and a hand-driven
//! channel in tests.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Source of elapsed-time deltas.
pub trait Ticker: Send {
    /// Begin producing ticks. Time before `start` is never reported.
    fn start(&mut self);

    /// Stop producing ticks; `tick` pends until the next `start`.
    fn stop(&mut self);

    /// Restart the measurement from now. Called when an item's timer starts.
    fn rebase(&mut self) {}

    /// Wait for the next tick and return the time elapsed since the previous
    /// one (or since `start` or `rebase`).
    fn tick(&mut self) -> impl Future<Output = Duration> + Send;
}

/// Wall-clock ticker backed by `tokio::time::interval`.
///
/// Reported deltas are measured, not assumed, so a late wakeup reports the
/// real gap instead of the nominal period.
pub struct IntervalTicker {
    period: Duration,
    interval: Option<Interval>,
    last: Instant,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
            last: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Ticker for IntervalTicker {
    fn start(&mut self) {
        let now = Instant::now();
        let mut interval = time::interval_at(now + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.last = now;
    }

    fn stop(&mut self) {
        self.interval = None;
    }

    fn rebase(&mut self) {
        if let Some(interval) = self.interval.as_mut() {
            interval.reset();
            self.last = Instant::now();
        }
    }

    async fn tick(&mut self) -> Duration {
        match self.interval.as_mut() {
            Some(interval) => {
                let now = interval.tick().await;
                let delta = now.saturating_duration_since(self.last);
                self.last = now;
                delta
            }
            None => std::future::pending().await,
        }
    }
}

/// Ticker driven by hand through a [`ManualClock`].
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<Duration>,
    running: bool,
}

/// Handle for pushing deltas into a [`ManualTicker`].
#[derive(Clone)]
pub struct ManualClock {
    tx: mpsc::UnboundedSender<Duration>,
}

impl ManualClock {
    /// Queue one tick of `delta`.
    pub fn advance(&self, delta: Duration) {
        let _ = self.tx.send(delta);
    }

    /// Queue `count` ticks of `step` each.
    pub fn advance_by(&self, step: Duration, count: usize) {
        for _ in 0..count {
            self.advance(step);
        }
    }
}

impl ManualTicker {
    pub fn new() -> (Self, ManualClock) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { rx, running: false },
            ManualClock { tx },
        )
    }
}

impl Ticker for ManualTicker {
    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    async fn tick(&mut self) -> Duration {
        if !self.running {
            return std::future::pending().await;
        }
        match self.rx.recv().await {
            Some(delta) => delta,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn interval_reports_measured_deltas() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(100));
        ticker.start();

        assert_eq!(ticker.tick().await, Duration::from_millis(100));
        assert_eq!(ticker.tick().await, Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn rebase_drops_time_before_it() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(100));
        ticker.start();
        let started = Instant::now();

        time::sleep(Duration::from_millis(50)).await;
        ticker.rebase();

        assert_eq!(ticker.tick().await, Duration::from_millis(100));
        assert_eq!(started.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_interval_never_ticks() {
        let mut ticker = IntervalTicker::new(Duration::from_millis(100));
        let waited = time::timeout(Duration::from_secs(5), ticker.tick()).await;
        assert!(waited.is_err());

        ticker.start();
        ticker.stop();
        let waited = time::timeout(Duration::from_secs(5), ticker.tick()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn manual_ticker_replays_queued_deltas() {
        let (mut ticker, clock) = ManualTicker::new();
        ticker.start();
        clock.advance(Duration::from_millis(30));
        clock.advance_by(Duration::from_millis(10), 2);

        assert_eq!(ticker.tick().await, Duration::from_millis(30));
        assert_eq!(ticker.tick().await, Duration::from_millis(10));
        assert_eq!(ticker.tick().await, Duration::from_millis(10));
    }
}
