//! Owned, cancellable timers polled against an explicit clock.
//!
//! Components hold their timers by value and call `poll(now)` from their
//! `on_tick`. Nothing here sleeps or spawns; the host loop decides how long to
//! wait using [`next_deadline`](IntervalTimer::next_deadline).

/// Repeating timer. Fires at `start + period`, `start + 2 * period`, ...
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    period_ms: i64,
    next_due: Option<i64>,
}

impl IntervalTimer {
    pub fn new(period_ms: i64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            next_due: None,
        }
    }

    pub fn period_ms(&self) -> i64 {
        self.period_ms
    }

    /// Arms (or re-arms) the timer relative to `now`.
    pub fn start(&mut self, now: i64) {
        self.next_due = Some(now + self.period_ms);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_active(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.next_due
    }

    /// Returns true once if at least one period elapsed. Missed periods are
    /// coalesced into a single firing.
    pub fn poll(&mut self, now: i64) -> bool {
        let Some(due) = self.next_due else {
            return false;
        };
        if now < due {
            return false;
        }

        let mut next = due;
        while next <= now {
            next += self.period_ms;
        }
        self.next_due = Some(next);
        true
    }
}

/// Single-shot timer. Arming while already armed is refused so callers can
/// never stack two outstanding deadlines.
#[derive(Debug, Clone, Default)]
pub struct OneShotTimer {
    due: Option<i64>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and keeps the original deadline) if already armed.
    pub fn arm(&mut self, now: i64, delay_ms: i64) -> bool {
        if self.due.is_some() {
            return false;
        }
        self.due = Some(now + delay_ms.max(0));
        true
    }

    pub fn cancel(&mut self) {
        self.due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.due.is_some()
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.due
    }

    /// Fires and disarms when due.
    pub fn poll(&mut self, now: i64) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = None;
                true
            }
            _ => false,
        }
    }
}

/// Earliest of several optional deadlines.
pub fn earliest(deadlines: impl IntoIterator<Item = Option<i64>>) -> Option<i64> {
    deadlines.into_iter().flatten().min()
}
