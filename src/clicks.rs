//! Single vs double click classification over an injected clock.

use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed { deadline: Instant },
}

/// Two-state machine: `Idle`, or `Armed` with a pending single click that
/// fires once the window elapses unless a second click lands first.
///
/// The owner drives time by calling [`ClickDisambiguator::poll`]; nothing here
/// sleeps. Every click is eventually reported as part of exactly one
/// classification.
pub struct ClickDisambiguator<C: Clock = SystemClock> {
    clock: C,
    window: Duration,
    phase: Phase,
}

impl ClickDisambiguator<SystemClock> {
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, SystemClock)
    }
}

impl<C: Clock> ClickDisambiguator<C> {
    pub fn with_clock(window: Duration, clock: C) -> Self {
        Self {
            clock,
            window,
            phase: Phase::Idle,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.phase, Phase::Armed { .. })
    }

    /// Feed one raw click. Returns a classification if this click completed one.
    pub fn on_click(&mut self) -> Option<ClickKind> {
        let now = self.clock.now();
        match self.phase {
            Phase::Idle => {
                self.phase = Phase::Armed {
                    deadline: now + self.window,
                };
                None
            }
            Phase::Armed { deadline } if now < deadline => {
                self.phase = Phase::Idle;
                Some(ClickKind::Double)
            }
            Phase::Armed { .. } => {
                // Timer expired but was never polled: the earlier click is a
                // single, and this one starts a new window.
                self.phase = Phase::Armed {
                    deadline: now + self.window,
                };
                Some(ClickKind::Single)
            }
        }
    }

    /// Timer transition. Reports the pending single once the window is over.
    pub fn poll(&mut self) -> Option<ClickKind> {
        match self.phase {
            Phase::Armed { deadline } if self.clock.now() >= deadline => {
                self.phase = Phase::Idle;
                Some(ClickKind::Single)
            }
            _ => None,
        }
    }

    /// When the owner should poll next.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Armed { deadline } => Some(deadline),
            Phase::Idle => None,
        }
    }

    /// Time left until the pending single fires, zero if overdue.
    pub fn time_to_deadline(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(self.clock.now()))
    }
}
