//! Reconnect delays for the realtime channel.

use std::time::Duration;

/// How long to wait before each reconnect attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    /// Fixed list of delays; retries stop once it is exhausted.
    Schedule(Vec<Duration>),

    /// Exponential backoff.
    Exponential {
        /// Delay before the first retry.
        initial_delay: Duration,

        /// Upper bound for any single delay.
        max_delay: Duration,

        /// Multiplier for each retry.
        multiplier: f64,

        /// Retries before giving up. `None` retries forever.
        max_attempts: Option<u32>,
    },
}

impl Default for ReconnectPolicy {
    /// 0 s, 2 s, 10 s, 30 s, then give up.
    fn default() -> Self {
        Self::Schedule(vec![
            Duration::ZERO,
            Duration::from_secs(2),
            Duration::from_secs(10),
            Duration::from_secs(30),
        ])
    }
}

impl ReconnectPolicy {
    /// Exponential backoff from 1 s capped at 60 s that never gives up.
    pub fn persistent() -> Self {
        Self::Exponential {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: None,
        }
    }

    /// Delay before retry `attempt` (1-based), or `None` to stop retrying.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        match self {
            Self::Schedule(delays) => delays.get(attempt as usize - 1).copied(),
            Self::Exponential {
                initial_delay,
                max_delay,
                multiplier,
                max_attempts,
            } => {
                if max_attempts.is_some_and(|max| attempt > max) {
                    return None;
                }
                // clamp the exponent so huge attempt counts stay finite
                let exponent = attempt.saturating_sub(1).min(64) as i32;
                let secs = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                let capped = secs.min(max_delay.as_secs_f64());
                Some(Duration::from_secs_f64(capped.max(0.0)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = ReconnectPolicy::default();

        let delays: Vec<_> = (1..=4).map(|n| policy.delay_for_attempt(n).unwrap()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_secs(2),
                Duration::from_secs(10),
                Duration::from_secs(30)
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));

        // Exhausted
        assert_eq!(policy.delay_for_attempt(5), None);
    }

    #[test]
    fn test_exponential_backoff() {
        let policy = ReconnectPolicy::Exponential {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: Some(8),
        };

        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for_attempt(4), Some(Duration::from_secs(8)));

        // Should cap at max_delay
        assert_eq!(policy.delay_for_attempt(8), Some(Duration::from_secs(60)));
        assert_eq!(policy.delay_for_attempt(9), None);
    }

    #[test]
    fn test_persistent_never_gives_up() {
        let policy = ReconnectPolicy::persistent();
        assert_eq!(policy.delay_for_attempt(10_000), Some(Duration::from_secs(60)));
    }
}
