use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// Consecutive failed reconnects before giving up; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(10),
            max_attempts: Some(20),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let current = policy.initial;
        Self {
            policy,
            current,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_attempts {
            if self.attempts >= max {
                return None;
            }
        }
        self.attempts += 1;
        let delay = self.current;
        self.current = next_backoff(self.current, self.policy.max);
        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.policy.initial;
        self.attempts = 0;
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    let next = current + current;
    if next > max {
        max
    } else {
        next
    }
}
