use std::time::Duration;

/// Exponential backoff for the chat socket: `base * 2^n` for attempt `n`,
/// giving up after `max_attempts`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            max_attempts,
            attempt: 0,
        }
    }

    /// Next attempt number (1-based) and the delay before it, or `None`
    /// once the attempts are used up.
    pub fn next_delay(&mut self) -> Option<(u32, Duration)> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let delay = self.base.saturating_mul(1u32 << self.attempt.min(16));
        self.attempt += 1;
        Some((self.attempt, delay))
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_until_exhausted() {
        let mut backoff = Backoff::new(Duration::from_millis(1000), 4);
        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                (1, Duration::from_millis(1000)),
                (2, Duration::from_millis(2000)),
                (3, Duration::from_millis(4000)),
                (4, Duration::from_millis(8000)),
            ]
        );
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some((1, Duration::from_millis(1000))));
    }
}
