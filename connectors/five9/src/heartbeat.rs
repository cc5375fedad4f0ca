//! Application-level heartbeat accounting.

/// Outcome of recording an outbound heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulse {
    /// Within tolerance.
    Steady,
    /// Too many beats went unanswered; the connection must be revived.
    Flatlined { skipped_beats: u32 },
}

/// Counts heartbeats sent since the last acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatCounter {
    skipped: u32,
    max_skipped: u32,
}

impl HeartbeatCounter {
    /// `max_skipped` is the number of unanswered beats tolerated; one more
    /// flatlines the connection.
    #[must_use]
    pub const fn new(max_skipped: u32) -> Self {
        Self {
            skipped: 0,
            max_skipped,
        }
    }

    /// Record that a heartbeat is being sent.
    pub const fn record_send(&mut self) -> Pulse {
        self.skipped = self.skipped.saturating_add(1);
        if self.skipped > self.max_skipped {
            Pulse::Flatlined {
                skipped_beats: self.skipped,
            }
        } else {
            Pulse::Steady
        }
    }

    /// An acknowledgment arrived.
    pub const fn acknowledge(&mut self) {
        self.skipped = 0;
    }

    /// Heartbeats sent since the last acknowledgment.
    #[must_use]
    pub const fn skipped(&self) -> u32 {
        self.skipped
    }
}
