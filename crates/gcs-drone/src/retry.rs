use std::time::Duration;

/// Bounded retry for transient datagram send failures.
///
/// Attempt `n` (1-based) waits `backoff * n` before retrying, so a dead link
/// is declared fatal after `retries` extra attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRetry {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for SendRetry {
    fn default() -> Self {
        Self { retries: 2, backoff: Duration::from_millis(20) }
    }
}

impl SendRetry {
    pub fn none() -> Self {
        Self { retries: 0, backoff: Duration::ZERO }
    }

    /// Delay before retry number `attempt`, or `None` when retries are used up.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        (attempt <= self.retries).then(|| self.backoff * attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_until_exhausted() {
        let r = SendRetry { retries: 3, backoff: Duration::from_millis(10) };
        assert_eq!(r.delay(1), Some(Duration::from_millis(10)));
        assert_eq!(r.delay(3), Some(Duration::from_millis(30)));
        assert_eq!(r.delay(4), None);
        assert_eq!(SendRetry::none().delay(1), None);
    }
}
