//! S5/S6: an action's happy path, and cooperative cancellation.

use crate::action::{Action, WaitOutcome};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[test]
fn s5_happy_path_start_wait_complete_publishes_progress() {
    let action: Action<u32> = Action::new(|facet| {
        facet.publish_named_values(HashMap::from([("progress".to_string(), Value::from(0.5))]));
        std::thread::sleep(Duration::from_millis(10));
        facet.complete("", Some(HashMap::from([("result".to_string(), Value::from(42))])));
        None
    });

    let outcome = action.run(7, Instant::now() + Duration::from_secs(2));
    assert_eq!(outcome, WaitOutcome::Completed);

    let snapshot = action.state();
    assert!(snapshot.succeeded());
    // Completion's named values must merge with, not clobber, values
    // published mid-run.
    assert_eq!(snapshot.named_values.get("progress"), Some(&Value::from(0.5)));
    assert_eq!(snapshot.named_values.get("result"), Some(&Value::from(42)));
}

#[test]
fn s6_cancel_request_is_observed_and_completes_with_cancel_result() {
    let action: Action<()> = Action::new(|facet| {
        loop {
            if facet.is_cancel_requested() {
                facet.complete("Cancel Requested", None);
                return None;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    action.start(()).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    action.request_cancel();

    let outcome = action.wait_until_complete(Instant::now() + Duration::from_secs(2));
    assert_eq!(outcome, WaitOutcome::Completed);
    let snapshot = action.state();
    assert!(snapshot.failed());
    assert_eq!(snapshot.result_code, "Cancel Requested");
}
