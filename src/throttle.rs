//! Per-key delivery throttling.
//!
//! An [`IntervalGate`] enforces a minimum spacing between accepted records
//! for each key (a source address). Rejected records are dropped, never
//! queued for later, so the gate never holds data.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Minimum-spacing rate limiter keyed by string.
///
/// The first observation of a key is always accepted. A later one is accepted
/// only once `interval` has elapsed since the last *accepted* one; rejected
/// calls leave the state untouched.
#[derive(Debug, Default)]
pub struct IntervalGate {
    /// Last accepted time for each key
    last_seen: HashMap<String, Instant>,
}

impl IntervalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `key` may pass at `now`, recording the acceptance.
    ///
    /// A zero `interval` disables throttling.
    ///
    /// # Example
    /// ```
    /// use std::time::{Duration, Instant};
    /// use ble_gateway::throttle::IntervalGate;
    ///
    /// let mut gate = IntervalGate::new();
    /// let now = Instant::now();
    /// assert!(gate.is_wait_over("aa:bb:cc:dd:ee:ff", Duration::from_secs(3), now));
    /// assert!(!gate.is_wait_over("aa:bb:cc:dd:ee:ff", Duration::from_secs(3), now));
    /// ```
    pub fn is_wait_over(&mut self, key: &str, interval: Duration, now: Instant) -> bool {
        if interval.is_zero() {
            return true;
        }

        match self.last_seen.get(key) {
            Some(last) if now.saturating_duration_since(*last) < interval => false,
            _ => {
                self.last_seen.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use ble_gateway::throttle::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // (number, unit name, milliseconds per unit)
    let (num, unit, millis) = if let Some(num) = src.strip_suffix("ms") {
        (num, "milliseconds", 1)
    } else if let Some(num) = src.strip_suffix('h') {
        (num, "hours", 3_600_000)
    } else if let Some(num) = src.strip_suffix('m') {
        (num, "minutes", 60_000)
    } else if let Some(num) = src.strip_suffix('s') {
        (num, "seconds", 1_000)
    } else {
        (src, "duration", 1_000)
    };

    let value: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid {}: {}", unit, num))?;
    value
        .checked_mul(millis)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration too large: {}", src))
}

/// Convert a non-negative number of seconds from configuration into a
/// [`Duration`]. Negative and non-finite values mean "no interval"; values
/// too large for a `Duration` saturate.
pub fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: &str = "aa:bb:cc:dd:ee:ff";
    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_gate_first_event_allowed() {
        let mut gate = IntervalGate::new();
        assert!(gate.is_wait_over(MAC, SECOND, Instant::now()));
        assert_eq!(gate.len(), 1);
    }

    #[test]
    fn test_gate_spacing() {
        let mut gate = IntervalGate::new();
        let t = Instant::now();
        assert!(gate.is_wait_over(MAC, SECOND, t));
        assert!(!gate.is_wait_over(MAC, SECOND, t + Duration::from_millis(1)));
        assert!(!gate.is_wait_over(MAC, SECOND, t + Duration::from_millis(999)));
        assert!(gate.is_wait_over(MAC, SECOND, t + SECOND));
    }

    #[test]
    fn test_gate_zero_interval_never_throttles() {
        let mut gate = IntervalGate::new();
        let t = Instant::now();
        for _ in 0..5 {
            assert!(gate.is_wait_over(MAC, Duration::ZERO, t));
        }
        assert!(gate.is_empty());
    }

    #[test]
    fn test_gate_keys_independent() {
        let mut gate = IntervalGate::new();
        let t = Instant::now();
        assert!(gate.is_wait_over(MAC, SECOND, t));
        assert!(gate.is_wait_over("11:22:33:44:55:66", SECOND, t));
        assert!(!gate.is_wait_over(MAC, SECOND, t));
        assert!(!gate.is_wait_over("11:22:33:44:55:66", SECOND, t));
    }

    #[test]
    fn test_gate_rejection_does_not_reset_timer() {
        let mut gate = IntervalGate::new();
        let t = Instant::now();
        let interval = Duration::from_millis(30);

        assert!(gate.is_wait_over(MAC, interval, t));
        assert!(!gate.is_wait_over(MAC, interval, t + Duration::from_millis(10)));
        assert!(!gate.is_wait_over(MAC, interval, t + Duration::from_millis(20)));
        // 30 ms after the accepted call, not after the rejected ones
        assert!(gate.is_wait_over(MAC, interval, t + Duration::from_millis(30)));
        assert!(!gate.is_wait_over(MAC, interval, t + Duration::from_millis(40)));
    }

    #[test]
    fn test_gate_tolerates_clock_going_backwards() {
        let mut gate = IntervalGate::new();
        let t = Instant::now() + SECOND;
        assert!(gate.is_wait_over(MAC, SECOND, t));
        assert!(!gate.is_wait_over(MAC, SECOND, t - Duration::from_millis(500)));
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_duration_with_whitespace() {
        assert_eq!(parse_duration(" 3s ").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("3 s").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("-1s").is_err());
        assert_eq!(
            parse_duration("xm").unwrap_err(),
            "invalid minutes: x".to_string()
        );
    }

    #[test]
    fn test_seconds() {
        assert_eq!(seconds(1.5), Duration::from_millis(1500));
        assert_eq!(seconds(0.0), Duration::ZERO);
        assert_eq!(seconds(-3.0), Duration::ZERO);
        assert_eq!(seconds(f64::NAN), Duration::ZERO);
        assert_eq!(seconds(1e20), Duration::MAX);
    }

    #[test]
    fn test_saturated_interval_still_gates() {
        let mut gate = IntervalGate::new();
        let now = Instant::now();
        assert!(gate.is_wait_over(MAC, seconds(1e20), now));
        assert!(!gate.is_wait_over(MAC, seconds(1e20), now + Duration::from_secs(86_400)));
    }
}
