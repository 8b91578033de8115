//! Business Rule Tests: Reconnect Backoff
//!
//! The reconnect delay doubles per attempt from the base delay and is
//! capped at the maximum delay:
//! - attempt 1: base
//! - attempt n: base * 2^(n-1), never above max
//!
//! A connection gives up once the attempt ceiling is reached.

mod common;

use common::fixtures::*;
use queue_manager::connection::RetryStrategy;
use rstest::rstest;
use std::time::Duration;
use test_case::test_case;

#[rstest]
#[case(1, 1_000)]
#[case(2, 2_000)]
#[case(3, 4_000)]
#[case(4, 8_000)]
#[case(6, 32_000)]
#[case(7, 60_000)]
#[case(50, 60_000)]
fn test_default_delay_schedule(#[case] attempt: u32, #[case] expected_ms: u64) {
    let strategy = RetryStrategy::default();
    assert_eq!(strategy.get_delay(attempt), Duration::from_millis(expected_ms));
}

#[test]
fn test_delays_never_decrease_and_respect_ceiling() {
    let strategy = RetryStrategy::new(
        64,
        Duration::from_millis(150),
        Duration::from_millis(10_000),
    );

    let mut previous = Duration::ZERO;
    for attempt in 1..=64 {
        let delay = strategy.get_delay(attempt);
        assert!(delay >= previous, "delay shrank at attempt {}", attempt);
        assert!(delay <= strategy.max_delay);
        previous = delay;
    }
    assert_eq!(previous, strategy.max_delay);
}

#[test]
fn test_huge_attempt_numbers_do_not_overflow() {
    let strategy = RetryStrategy::default();
    assert_eq!(strategy.get_delay(u32::MAX), strategy.max_delay);
}

#[test_case(0, true ; "fresh connection may retry")]
#[test_case(2, true ; "below ceiling")]
#[test_case(3, false ; "at ceiling")]
#[test_case(7, false ; "past ceiling")]
fn test_attempt_ceiling(attempts: u32, expected: bool) {
    let strategy = fast_retry(3);
    assert_eq!(strategy.should_retry(attempts), expected);
}

#[test]
fn test_zero_attempts_never_retries() {
    let strategy = fast_retry(0);
    assert!(!strategy.should_retry(0));
}
