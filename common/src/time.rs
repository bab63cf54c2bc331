//! Time utilities and operation deadlines.

use chrono::{DateTime, Duration, Utc};

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check if a timestamp has expired (is in the past).
pub fn is_expired(expiry: Timestamp) -> bool {
    now() > expiry
}

/// Caller-supplied deadline for a ledger operation.
#[derive(Debug, Clone)]
pub struct Deadline {
    /// Point in time after which the operation is abandoned.
    pub expires_at: Timestamp,
    /// Operation description, carried into `Timeout` errors.
    pub operation: String,
}

impl Deadline {
    /// Create a deadline `duration` from now.
    pub fn after(duration: std::time::Duration, operation: impl Into<String>) -> Self {
        let expires_at = Duration::from_std(duration)
            .ok()
            .and_then(|d| now().checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            expires_at,
            operation: operation.into(),
        }
    }

    /// Check if the deadline has passed.
    pub fn is_exceeded(&self) -> bool {
        is_expired(self.expires_at)
    }

    /// Get remaining duration, zero once exceeded.
    pub fn remaining(&self) -> std::time::Duration {
        (self.expires_at - now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired() {
        let past = now() - Duration::seconds(10);
        assert!(is_expired(past));

        let future = now() + Duration::seconds(10);
        assert!(!is_expired(future));
    }

    #[test]
    fn test_deadline() {
        let deadline = Deadline::after(std::time::Duration::from_secs(10), "credit");
        assert!(!deadline.is_exceeded());
        assert!(deadline.remaining() > std::time::Duration::ZERO);
        assert_eq!(deadline.operation, "credit");
    }

    #[test]
    fn test_elapsed_deadline_has_no_time_left() {
        let deadline = Deadline {
            expires_at: now() - Duration::seconds(1),
            operation: "debit".to_string(),
        };
        assert!(deadline.is_exceeded());
        assert_eq!(deadline.remaining(), std::time::Duration::ZERO);
    }

    #[test]
    fn test_huge_deadline_saturates() {
        let deadline = Deadline::after(std::time::Duration::MAX, "forever");
        assert!(!deadline.is_exceeded());
    }
}
