//! Bounded-retry policy applied to every dispatch.
//!
//! The policy mirrors the transport adapter configuration: equal attempt
//! ceilings for total/read/connect/redirect failures, an exponential
//! backoff multiplier and fixed status-code and HTTP-method allow-lists.

use http::{Method, StatusCode};
use std::time::Duration;

/// Response codes that generally indicate transient failures and merit
/// client retries.
pub const STATUS_FORCELIST: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Ceiling on any single backoff delay.
pub const BACKOFF_MAX: Duration = Duration::from_secs(120);

/// Methods the policy is willing to replay.
pub const ALLOWED_METHODS: [Method; 6] = [
    Method::DELETE,
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::PUT,
    Method::POST,
];

/// An immutable retry policy consumed by the session and the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Ceiling on total retry attempts.
    pub total: u32,
    /// Ceiling on retries after a read failure.
    pub read: u32,
    /// Ceiling on retries after a connect failure.
    pub connect: u32,
    /// Ceiling on retries after a redirect.
    pub redirect: u32,
    /// Multiplier applied to the exponential retry delay. Always > 0.
    pub backoff_factor: f64,
    /// Status codes that trigger a retry.
    pub status_forcelist: [u16; 6],
}

impl RetryPolicy {
    /// Creates a policy from raw numeric configuration.
    ///
    /// `max_retries` is coerced to a non-negative integer via absolute
    /// value. `backoff_factor` is coerced to a non-negative float via
    /// absolute value and forced to `1.0` when the result is not strictly
    /// positive, preventing a zero-delay retry storm against the API
    /// servers.
    pub fn new(max_retries: i32, backoff_factor: f64) -> Self {
        let factor = backoff_factor.abs();
        let factor = if factor > 0.0 { factor } else { 1.0 };
        let retries = max_retries.unsigned_abs();

        Self {
            total: retries,
            read: retries,
            connect: retries,
            redirect: retries,
            backoff_factor: factor,
            status_forcelist: STATUS_FORCELIST,
        }
    }

    /// Whether the given response status merits a retry.
    pub fn retries_status(&self, status: StatusCode) -> bool {
        self.status_forcelist.contains(&status.as_u16())
    }

    /// Whether the given method may be replayed.
    pub fn retries_method(&self, method: &Method) -> bool {
        ALLOWED_METHODS.contains(method)
    }

    /// The backoff delay before the given retry attempt (1-indexed):
    /// `backoff_factor * 2^(attempt - 1)` seconds, capped at
    /// [`BACKOFF_MAX`]. A product that is not a representable duration
    /// (infinite factor, overflow) also clamps to the cap.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let multiplier = 2f64.powi(exponent as i32);
        Duration::try_from_secs_f64(self.backoff_factor * multiplier)
            .unwrap_or(BACKOFF_MAX)
            .min(BACKOFF_MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceilings_all_equal_max_retries() {
        let policy = RetryPolicy::new(3, 1.0);

        assert_eq!(policy.total, 3);
        assert_eq!(policy.read, 3);
        assert_eq!(policy.connect, 3);
        assert_eq!(policy.redirect, 3);
        assert_eq!(policy.status_forcelist, [408, 429, 500, 502, 503, 504]);
    }

    #[test]
    fn test_negative_inputs_coerced_via_absolute_value() {
        let policy = RetryPolicy::new(-2, -0.5);

        assert_eq!(policy.total, 2);
        assert_eq!(policy.backoff_factor, 0.5);
    }

    #[test]
    fn test_zero_backoff_normalized_to_one() {
        let policy = RetryPolicy::new(3, 0.0);
        assert_eq!(policy.backoff_factor, 1.0);
    }

    #[test]
    fn test_backoff_delays_double_per_attempt() {
        let policy = RetryPolicy::new(5, 1.0);

        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(4), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_delay_clamped_to_cap() {
        let policy = RetryPolicy::new(40, 1.0);
        assert_eq!(policy.backoff_delay(40), BACKOFF_MAX);

        let pathological = RetryPolicy::new(3, f64::INFINITY);
        assert_eq!(pathological.backoff_delay(1), BACKOFF_MAX);

        let huge = RetryPolicy::new(3, f64::MAX);
        assert_eq!(huge.backoff_delay(2), BACKOFF_MAX);
    }

    #[test]
    fn test_status_forcelist_membership() {
        let policy = RetryPolicy::default();

        assert!(policy.retries_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(policy.retries_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!policy.retries_status(StatusCode::BAD_REQUEST));
        assert!(!policy.retries_status(StatusCode::NOT_IMPLEMENTED));
    }

    #[test]
    fn test_method_allow_list() {
        let policy = RetryPolicy::default();

        assert!(policy.retries_method(&Method::GET));
        assert!(policy.retries_method(&Method::POST));
        assert!(!policy.retries_method(&Method::PATCH));
    }
}
