//! Per-item elapsed time and completion.

use std::time::Duration;

/// How long the active item should stay on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Timed(Duration),
    /// Never completes on its own; only navigation leaves the item.
    Unbounded,
}

/// Result of feeding one delta into the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing running, paused, or already completed.
    Idle,
    Progress(f32),
    /// The target was reached on this tick. Reported once per `start`.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Waiting for the item to load.
    Waiting,
    Running,
    Completed,
}

#[derive(Debug, Clone)]
pub struct TimelineController {
    phase: Phase,
    elapsed: Duration,
    target: Target,
    paused: bool,
}

impl Default for TimelineController {
    fn default() -> Self {
        Self::new()
    }
}

impl TimelineController {
    pub fn new() -> Self {
        Self {
            phase: Phase::Waiting,
            elapsed: Duration::ZERO,
            target: Target::Unbounded,
            paused: false,
        }
    }

    /// Begin timing a freshly loaded item. The pause flag is left alone so a
    /// pause issued while the item was loading still applies.
    pub fn start(&mut self, target: Target) {
        self.phase = Phase::Running;
        self.elapsed = Duration::ZERO;
        self.target = target;
    }

    /// Forget the current item and wait for the next `start`.
    pub fn reset(&mut self) {
        self.phase = Phase::Waiting;
        self.elapsed = Duration::ZERO;
        self.target = Target::Unbounded;
        self.paused = false;
    }

    pub fn tick(&mut self, delta: Duration) -> TickOutcome {
        if self.paused || self.phase != Phase::Running {
            return TickOutcome::Idle;
        }

        self.elapsed = self.elapsed.saturating_add(delta);

        match self.target {
            Target::Timed(target) if self.elapsed >= target => {
                self.phase = Phase::Completed;
                TickOutcome::Completed
            }
            _ => TickOutcome::Progress(self.progress()),
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_running(&self) -> bool {
        self.phase == Phase::Running
    }

    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn target(&self) -> Target {
        self.target
    }

    /// Fraction of the target shown so far, always within `[0, 1]`.
    pub fn progress(&self) -> f32 {
        match self.target {
            Target::Timed(target) if !target.is_zero() => {
                let ratio = self.elapsed.as_nanos() as f64 / target.as_nanos() as f64;
                ratio.clamp(0.0, 1.0) as f32
            }
            Target::Timed(_) => 1.0,
            Target::Unbounded => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS_100: Duration = Duration::from_millis(100);

    #[test]
    fn waits_until_started() {
        let mut timeline = TimelineController::new();
        assert_eq!(timeline.tick(MS_100), TickOutcome::Idle);
        assert_eq!(timeline.elapsed(), Duration::ZERO);
    }

    #[test]
    fn completes_exactly_once() {
        let mut timeline = TimelineController::new();
        timeline.start(Target::Timed(Duration::from_millis(300)));

        assert!(matches!(
            timeline.tick(MS_100),
            TickOutcome::Progress(p) if (p - 1.0 / 3.0).abs() < 1e-6
        ));
        assert!(matches!(timeline.tick(MS_100), TickOutcome::Progress(_)));
        assert_eq!(timeline.tick(MS_100), TickOutcome::Completed);
        assert_eq!(timeline.tick(MS_100), TickOutcome::Idle);
        assert_eq!(timeline.tick(MS_100), TickOutcome::Idle);
        assert!(timeline.is_completed());
    }

    #[test]
    fn overshoot_is_clamped() {
        let mut timeline = TimelineController::new();
        timeline.start(Target::Timed(Duration::from_millis(250)));

        assert_eq!(timeline.tick(Duration::from_millis(900)), TickOutcome::Completed);
        assert_eq!(timeline.progress(), 1.0);
    }

    #[test]
    fn pause_freezes_elapsed_and_resume_continues() {
        let mut timeline = TimelineController::new();
        timeline.start(Target::Timed(Duration::from_millis(1000)));
        for _ in 0..6 {
            timeline.tick(MS_100);
        }

        timeline.pause();
        assert_eq!(timeline.tick(Duration::from_secs(30)), TickOutcome::Idle);
        timeline.resume();

        assert_eq!(timeline.elapsed(), Duration::from_millis(600));
        assert!((timeline.progress() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn pause_resume_pair_is_a_no_op() {
        let mut timeline = TimelineController::new();
        timeline.start(Target::Timed(Duration::from_millis(1000)));
        timeline.tick(Duration::from_millis(420));

        let before = timeline.elapsed();
        timeline.pause();
        timeline.resume();
        assert_eq!(timeline.elapsed(), before);
    }

    #[test]
    fn pause_before_start_survives_start() {
        let mut timeline = TimelineController::new();
        timeline.pause();
        timeline.start(Target::Timed(Duration::from_millis(500)));

        assert_eq!(timeline.tick(MS_100), TickOutcome::Idle);
        timeline.resume();
        assert!(matches!(timeline.tick(MS_100), TickOutcome::Progress(_)));
    }

    #[test]
    fn unbounded_never_completes() {
        let mut timeline = TimelineController::new();
        timeline.start(Target::Unbounded);
        for _ in 0..1000 {
            assert_eq!(timeline.tick(MS_100), TickOutcome::Progress(0.0));
        }
        assert_eq!(timeline.elapsed(), Duration::from_secs(100));
    }

    #[test]
    fn progress_is_monotonic() {
        let mut timeline = TimelineController::new();
        timeline.start(Target::Timed(Duration::from_millis(730)));
        let mut last = 0.0;
        loop {
            match timeline.tick(Duration::from_millis(70)) {
                TickOutcome::Progress(p) => {
                    assert!(p >= last);
                    assert!((0.0..=1.0).contains(&p));
                    last = p;
                }
                TickOutcome::Completed => break,
                TickOutcome::Idle => unreachable!(),
            }
        }
    }
}
