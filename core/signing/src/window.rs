//! Validity windows for capability URLs.

use chrono::{DateTime, Duration, SubsecRound, Utc};

use filestore_common::{Error, Result};

/// Half-open interval `[starts_on, expires_on)` in UTC.
///
/// Bounds are truncated to whole seconds, the precision carried in a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessWindow {
    starts_on: DateTime<Utc>,
    expires_on: DateTime<Utc>,
}

impl AccessWindow {
    /// Build a window from explicit bounds.
    ///
    /// # Errors
    /// - `expires_on` is not after `starts_on`
    pub fn new(starts_on: DateTime<Utc>, expires_on: DateTime<Utc>) -> Result<Self> {
        let starts_on = starts_on.trunc_subsecs(0);
        let expires_on = expires_on.trunc_subsecs(0);
        if expires_on <= starts_on {
            return Err(Error::InvalidInput(format!(
                "Access window must end after it starts ({} .. {})",
                starts_on, expires_on
            )));
        }
        Ok(Self {
            starts_on,
            expires_on,
        })
    }

    /// A window opening at `now` and lasting `duration`.
    pub fn starting_at(now: DateTime<Utc>, duration: Duration) -> Result<Self> {
        if duration <= Duration::zero() {
            return Err(Error::Configuration(
                "Shared access duration must be positive".to_string(),
            ));
        }
        Self::new(now, now + duration)
    }

    /// A window opening now and lasting `duration`.
    pub fn starting_now(duration: Duration) -> Result<Self> {
        Self::starting_at(Utc::now(), duration)
    }

    pub fn starts_on(&self) -> DateTime<Utc> {
        self.starts_on
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    pub fn duration(&self) -> Duration {
        self.expires_on - self.starts_on
    }

    /// Whether `at` falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts_on <= at && at < self.expires_on
    }

    /// Whether this window lies entirely inside `outer`.
    pub fn within(&self, outer: &AccessWindow) -> bool {
        outer.starts_on <= self.starts_on && self.expires_on <= outer.expires_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_window_bounds() {
        let window = AccessWindow::starting_at(at(0), Duration::seconds(60)).unwrap();

        assert!(window.contains(at(0)));
        assert!(window.contains(at(30)));
        assert!(window.contains(at(59)));
        assert!(!window.contains(at(60)));
        assert!(!window.contains(at(-1)));
        assert_eq!(window.duration(), Duration::seconds(60));
    }

    #[test]
    fn test_non_positive_duration_fails() {
        assert!(AccessWindow::starting_at(at(0), Duration::zero()).is_err());
        assert!(AccessWindow::starting_at(at(0), Duration::seconds(-5)).is_err());
    }

    #[test]
    fn test_within() {
        let outer = AccessWindow::new(at(0), at(100)).unwrap();
        let inner = AccessWindow::new(at(10), at(90)).unwrap();
        assert!(inner.within(&outer));
        assert!(!outer.within(&inner));
    }
}
