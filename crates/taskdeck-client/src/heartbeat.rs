#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    /// Send a probe now.
    Probe,
    /// Too many consecutive probes went unanswered.
    Expired,
}

/// Counts consecutive unanswered liveness probes on one connection.
#[derive(Clone, Debug)]
pub struct Heartbeat {
    max_missed: u32,
    missed: u32,
    awaiting_reply: bool,
}

impl Heartbeat {
    pub fn new(max_missed: u32) -> Self {
        Self {
            max_missed: max_missed.max(1),
            missed: 0,
            awaiting_reply: false,
        }
    }

    pub fn tick(&mut self) -> HeartbeatVerdict {
        if self.awaiting_reply {
            self.missed += 1;
            if self.missed >= self.max_missed {
                return HeartbeatVerdict::Expired;
            }
        }
        self.awaiting_reply = true;
        HeartbeatVerdict::Probe
    }

    pub fn on_reply(&mut self) {
        self.awaiting_reply = false;
        self.missed = 0;
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }
}
