//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use crossbeam_channel::Receiver;
use ledvis_rs::SubscriptionEvent;
use std::time::{Duration, Instant};

/// Upper bound on how long a test waits for a stream event
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Receive events until one matches `pred`, returning it along with the
/// events skipped on the way. Panics on timeout or a closed channel.
pub fn wait_for<F>(rx: &Receiver<SubscriptionEvent>, mut pred: F) -> (SubscriptionEvent, Vec<SubscriptionEvent>)
where
    F: FnMut(&SubscriptionEvent) -> bool,
{
    let deadline = Instant::now() + test_timeout();
    let mut skipped = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) if pred(&event) => return (event, skipped),
            Ok(event) => skipped.push(event),
            Err(e) => panic!("no matching event ({}); saw {:?}", e, skipped),
        }
    }
}

/// Poll `cond` until it holds or the test timeout expires
pub fn eventually<F: FnMut() -> bool>(mut cond: F) -> bool {
    let deadline = Instant::now() + test_timeout();
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
