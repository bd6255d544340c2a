use std::time::{Duration, Instant};

/// Wall-clock allowance for one stage of a call, started when the stage starts.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self { started: Instant::now(), limit }
    }

    pub fn limit_ms(&self) -> u64 {
        u64::try_from(self.limit.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `None` once the allowance is used up.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.checked_sub(self.elapsed()).filter(|left| !left.is_zero())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_none()
    }

    /// The tighter of `per_call` and what is left of this deadline.
    pub fn bound(&self, per_call: Duration) -> Option<Duration> {
        self.remaining().map(|left| left.min(per_call))
    }
}
