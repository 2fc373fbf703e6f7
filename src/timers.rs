//! One-shot timers owned by a parkour machine.

use bevy_time::{Timer, TimerMode};
use core::time::Duration;

/// The fire-once deadlines the parkour state machine uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Blocks hang attempts right after letting go of a ledge.
    NoHang,
    /// Blocks wall-runs right after jumping off a wall.
    NoWallrun,
    /// Bounds how long after leaving the ground wall-runs are possible.
    Wallrun,
    /// Ends a slide.
    Slide,
}

impl TimerKind {
    pub const ALL: [TimerKind; 4] = [
        TimerKind::NoHang,
        TimerKind::NoWallrun,
        TimerKind::Wallrun,
        TimerKind::Slide,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Cooperative timers advanced by the owning state machine's tick.
///
/// A timer is active from [`start`](Self::start) until it fires or is cancelled.
/// Since the timers live inside the instance they belong to, nothing can fire after
/// that instance is gone.
#[derive(Clone, Debug, Default)]
pub struct ParkourTimers {
    slots: [Option<Timer>; 4],
}

impl ParkourTimers {
    /// Starts `kind`, replacing a running deadline of the same kind.
    pub fn start(&mut self, kind: TimerKind, duration: Duration) {
        self.slots[kind.index()] = Some(Timer::new(duration, TimerMode::Once));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.slots[kind.index()] = None;
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.slots[kind.index()].is_some()
    }

    pub fn remaining(&self, kind: TimerKind) -> Option<Duration> {
        self.slots[kind.index()].as_ref().map(Timer::remaining)
    }

    /// Advances every active timer and returns the ones that expired, in [`TimerKind::ALL`] order.
    /// Expired timers are no longer active when this returns.
    pub fn tick(&mut self, delta: Duration) -> Vec<TimerKind> {
        let mut fired = Vec::new();
        for kind in TimerKind::ALL {
            let slot = &mut self.slots[kind.index()];
            let Some(timer) = slot.as_mut() else {
                continue;
            };
            timer.tick(delta);
            if timer.is_finished() {
                *slot = None;
                fired.push(kind);
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_and_deactivates() {
        let mut timers = ParkourTimers::default();
        timers.start(TimerKind::Slide, Duration::from_millis(100));
        assert!(timers.is_active(TimerKind::Slide));

        assert!(timers.tick(Duration::from_millis(60)).is_empty());
        assert_eq!(timers.tick(Duration::from_millis(60)), vec![TimerKind::Slide]);
        assert!(!timers.is_active(TimerKind::Slide));
        assert!(timers.tick(Duration::from_millis(500)).is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut timers = ParkourTimers::default();
        timers.start(TimerKind::Wallrun, Duration::from_millis(10));
        timers.cancel(TimerKind::Wallrun);
        assert!(timers.tick(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn restart_replaces_deadline() {
        let mut timers = ParkourTimers::default();
        timers.start(TimerKind::NoHang, Duration::from_millis(100));
        timers.tick(Duration::from_millis(90));
        timers.start(TimerKind::NoHang, Duration::from_millis(100));
        assert!(timers.tick(Duration::from_millis(20)).is_empty());
        assert_eq!(
            timers.remaining(TimerKind::NoHang),
            Some(Duration::from_millis(80))
        );
    }

    #[test]
    fn fires_in_kind_order() {
        let mut timers = ParkourTimers::default();
        timers.start(TimerKind::Slide, Duration::from_millis(5));
        timers.start(TimerKind::NoHang, Duration::from_millis(5));
        timers.start(TimerKind::Wallrun, Duration::from_millis(5));
        assert_eq!(
            timers.tick(Duration::from_millis(5)),
            vec![TimerKind::NoHang, TimerKind::Wallrun, TimerKind::Slide]
        );
    }
}
