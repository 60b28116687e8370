//! Bounded waits
//!
//! Every suspension point in the engine takes a [`Timeout`]. Unbounded
//! blocking only happens when the caller passes [`Timeout::Forever`].

use std::time::{Duration, Instant};

/// How long a blocking operation may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeout {
    /// Do not wait at all
    Immediate,

    /// Wait at most this long
    After(Duration),

    /// Wait until the operation can complete
    Forever,
}

impl Timeout {
    /// Timeout of `ms` milliseconds
    pub fn from_millis(ms: u64) -> Self {
        Duration::from_millis(ms).into()
    }

    /// Absolute deadline, `None` for [`Timeout::Forever`]
    ///
    /// A duration too large to represent as an `Instant` has no deadline and
    /// waits like [`Timeout::Forever`].
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::Immediate => Some(Instant::now()),
            Timeout::After(d) => Instant::now().checked_add(*d),
            Timeout::Forever => None,
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        if duration.is_zero() {
            Timeout::Immediate
        } else {
            Timeout::After(duration)
        }
    }
}

impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::After(d) => write!(f, "{}ms", d.as_millis()),
            Self::Forever => write!(f, "forever"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_is_immediate() {
        assert_eq!(Timeout::from(Duration::ZERO), Timeout::Immediate);
        assert_eq!(Timeout::from_millis(0), Timeout::Immediate);
        assert_eq!(
            Timeout::from_millis(5),
            Timeout::After(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_deadline() {
        assert!(Timeout::Forever.deadline().is_none());

        let before = Instant::now();
        let deadline = Timeout::from_millis(50).deadline().unwrap();
        assert!(deadline >= before + Duration::from_millis(50));
    }

    #[test]
    fn test_unrepresentable_deadline_waits_forever() {
        assert!(Timeout::After(Duration::MAX).deadline().is_none());
        assert!(Timeout::from_millis(u64::MAX).deadline().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Timeout::Immediate.to_string(), "immediate");
        assert_eq!(Timeout::from_millis(250).to_string(), "250ms");
        assert_eq!(Timeout::Forever.to_string(), "forever");
    }
}
