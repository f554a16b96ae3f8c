use crate::config::Reconnect;
use std::time::Duration;

/// Reconnect delay schedule for streaming connections.
///
/// The delay doubles after each failed cycle up to the configured ceiling and
/// resets once a connection is established again.
#[derive(Debug)]
pub(crate) struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub(crate) fn new(config: &Reconnect) -> Self {
        let initial = Duration::from_millis(config.initial_delay_ms);
        Self {
            initial,
            max: Duration::from_millis(config.max_delay_ms),
            next: initial,
        }
    }

    /// The delay to wait before the next attempt. Advances the schedule.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }

    /// Restores the schedule after a successful connection.
    pub(crate) fn reset(&mut self) {
        self.next = self.initial;
    }
}
