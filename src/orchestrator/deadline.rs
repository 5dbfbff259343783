//! Deadline budget math.
//!
//! A `Deadline` is a wall-clock instant the whole orchestration must finish
//! by. Every worker call derives its own child budget from the remaining
//! time, never from the full end-to-end window.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    target: Instant,
}

impl Deadline {
    pub fn starting_now(total: Duration) -> Self {
        Self { target: Instant::now() + total }
    }

    /// Time left until the deadline fires; zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.target.saturating_duration_since(Instant::now())
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.target
    }

    pub fn target(&self) -> Instant {
        self.target
    }

    /// Budget to hand a single worker call: `min(remaining - reserve,
    /// per_call_max)`, floored at zero.
    pub fn child_budget(&self, reserve: Duration, per_call_max: Duration) -> Duration {
        let remaining = self.remaining();
        let after_reserve = remaining.saturating_sub(reserve);
        after_reserve.min(per_call_max)
    }
}
