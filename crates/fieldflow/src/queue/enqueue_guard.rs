// Enqueue-time checks. Anything rejected here never reaches the tasks table.

use std::time::Duration;

pub const MIN_PRIORITY: i32 = -100;
pub const MAX_PRIORITY: i32 = 100;

#[derive(Clone, Debug)]
pub struct EnqueueGuardConfig {
    pub max_payload_bytes: usize,
    /// Longest delay a producer may ask for.
    pub max_delay: Duration,
}

impl Default for EnqueueGuardConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 64 * 1024,
            max_delay: Duration::from_secs(366 * 24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardViolation {
    #[error("payload is {actual} bytes, limit is {limit}")]
    PayloadTooLarge { actual: usize, limit: usize },
    #[error("priority {0} outside {MIN_PRIORITY}..={MAX_PRIORITY}")]
    PriorityOutOfRange(i32),
    #[error("max_attempts must be at least 1, got {0}")]
    MaxAttempts(i32),
    #[error("delay of {0:?} is too far in the future")]
    DelayTooLong(Duration),
}

#[derive(Clone, Debug, Default)]
pub struct EnqueueGuard {
    cfg: EnqueueGuardConfig,
}

impl EnqueueGuard {
    pub fn new(cfg: EnqueueGuardConfig) -> Self {
        Self { cfg }
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.cfg.max_payload_bytes
    }

    pub fn check_payload(&self, payload_bytes: usize) -> Result<(), GuardViolation> {
        if payload_bytes > self.cfg.max_payload_bytes {
            return Err(GuardViolation::PayloadTooLarge {
                actual: payload_bytes,
                limit: self.cfg.max_payload_bytes,
            });
        }
        Ok(())
    }

    pub fn check_options(
        &self,
        priority: i32,
        max_attempts: i32,
        delay: Option<Duration>,
    ) -> Result<(), GuardViolation> {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(GuardViolation::PriorityOutOfRange(priority));
        }
        if max_attempts < 1 {
            return Err(GuardViolation::MaxAttempts(max_attempts));
        }
        if let Some(delay) = delay {
            if delay > self.cfg.max_delay {
                return Err(GuardViolation::DelayTooLong(delay));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_payload_is_rejected() {
        let guard = EnqueueGuard::new(EnqueueGuardConfig {
            max_payload_bytes: 10,
            ..Default::default()
        });
        assert!(guard.check_payload(10).is_ok());
        assert_eq!(
            guard.check_payload(11),
            Err(GuardViolation::PayloadTooLarge {
                actual: 11,
                limit: 10
            })
        );
    }

    #[test]
    fn options_are_bounded() {
        let guard = EnqueueGuard::default();
        assert!(guard.check_options(0, 3, None).is_ok());
        assert!(guard
            .check_options(0, 1, Some(Duration::from_secs(86_400)))
            .is_ok());
        assert_eq!(
            guard.check_options(101, 3, None),
            Err(GuardViolation::PriorityOutOfRange(101))
        );
        assert_eq!(
            guard.check_options(0, 0, None),
            Err(GuardViolation::MaxAttempts(0))
        );
        assert!(matches!(
            guard.check_options(0, 3, Some(Duration::from_secs(400 * 86_400))),
            Err(GuardViolation::DelayTooLong(_))
        ));
    }
}
