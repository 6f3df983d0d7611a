//! Time utilities and constants for the spot-rate cache.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Timing constants.
pub mod constants {
    use super::Duration;

    /// Default freshness window for cached rates (4 hours).
    pub fn default_max_age_cache() -> Duration {
        Duration::hours(4)
    }
}

/// A timestamp with timezone (always UTC).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Oldest `query_time` still inside a freshness window ending now.
///
/// Windows reaching past the representable range start at
/// [`DateTime::<Utc>::MIN_UTC`].
pub fn window_start(max_age: Duration) -> Timestamp {
    now()
        .checked_sub_signed(max_age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Check if a timestamp falls inside the freshness window.
pub fn is_within(timestamp: Timestamp, max_age: Duration) -> bool {
    timestamp >= window_start(max_age)
}

/// Arithmetic mean of a set of timestamps, at millisecond precision.
///
/// Returns `None` for an empty slice.
pub fn mean_timestamp(timestamps: &[Timestamp]) -> Option<Timestamp> {
    if timestamps.is_empty() {
        return None;
    }
    let total: i128 = timestamps
        .iter()
        .map(|t| i128::from(t.timestamp_millis()))
        .sum();
    let mean = total / timestamps.len() as i128;
    Utc.timestamp_millis_opt(mean as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_within() {
        let recent = now() - Duration::minutes(10);
        assert!(is_within(recent, Duration::hours(1)));

        let old = now() - Duration::hours(5);
        assert!(!is_within(old, constants::default_max_age_cache()));
    }

    #[test]
    fn test_unbounded_window_clamps() {
        assert_eq!(window_start(Duration::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(window_start(Duration::days(365 * 1_000_000)), DateTime::<Utc>::MIN_UTC);
        assert!(is_within(now() - Duration::days(365 * 100), Duration::MAX));
    }

    #[test]
    fn test_mean_timestamp() {
        let a = Utc.timestamp_opt(1000, 0).unwrap();
        let b = Utc.timestamp_opt(2000, 0).unwrap();

        assert_eq!(mean_timestamp(&[a, b]), Utc.timestamp_opt(1500, 0).single());
        assert_eq!(mean_timestamp(&[a]), Some(a));
        assert_eq!(mean_timestamp(&[]), None);
    }
}
