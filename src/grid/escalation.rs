// src/grid/escalation.rs

//! Resource escalation after resource-related job failures.

/// Memory growth factor per attempt.
pub const MEMORY_GROWTH: f64 = 1.3;

/// Scale applied on top of [`sigmoid`] when growing the time limit.
pub const TIME_SCALE: f64 = 2.7;

/// `1 / (1 - e^-t)`. Large for small `t`, tends to 1 as `t` grows.
pub fn sigmoid(t: f64) -> f64 {
    1.0 / (1.0 - (-t).exp())
}

/// Clamp a proposed resource amount to at least 1.
pub fn at_least_one(value: f64) -> u64 {
    if value.is_nan() || value < 1.0 {
        1
    } else {
        value as u64
    }
}

/// New memory request in MB after the job used `used_kb` on attempt
/// `attempt`: `(used_kb / 1024) * 1.3^attempt`.
pub fn escalate_memory(used_kb: u64, attempt: u32) -> u64 {
    let used_mb = (used_kb / 1024) as f64;
    at_least_one(used_mb * MEMORY_GROWTH.powi(attempt as i32))
}

/// New time limit in minutes after attempt `attempt` ran out of time:
/// `old * sigmoid(attempt / 10) * 2.7`.
pub fn escalate_time(time_min: u64, attempt: u32) -> u64 {
    let t = f64::from(attempt) / 10.0;
    at_least_one(time_min as f64 * sigmoid(t) * TIME_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_grows_from_observed_usage() {
        assert_eq!(escalate_memory(2_048_000, 1), 2600);
        assert_eq!(escalate_memory(2_048_000, 2), 3380);
    }

    #[test]
    fn tiny_usage_still_requests_something() {
        assert_eq!(escalate_memory(0, 3), 1);
        assert_eq!(escalate_memory(512, 1), 1);
    }

    #[test]
    fn time_rule_matches_formula() {
        let expected = (60.0 * sigmoid(1.0) * 2.7) as u64;
        assert_eq!(escalate_time(60, 10), expected);
        assert_eq!(expected, 256);
    }

    #[test]
    fn time_never_collapses_to_zero() {
        assert_eq!(escalate_time(0, 1), 1);
        assert!(escalate_time(1, 1) >= 1);
    }

    #[test]
    fn clamp_handles_non_positive_and_nan() {
        assert_eq!(at_least_one(-5.0), 1);
        assert_eq!(at_least_one(0.0), 1);
        assert_eq!(at_least_one(f64::NAN), 1);
        assert_eq!(at_least_one(7.9), 7);
    }
}
