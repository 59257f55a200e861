use std::time::Duration;

use crate::event::{EventSystemError, SubscriptionId};
use crate::kernel::error::Error;

#[test]
fn test_error_display() {
    let err = EventSystemError::QueueFull {
        topic: "t".to_string(),
        capacity: 8,
    };
    assert_eq!(
        err.to_string(),
        "Event queue is full (capacity 8); event on topic 't' was rejected"
    );

    let err = EventSystemError::SubscriptionNotFound { id: SubscriptionId(3) };
    assert_eq!(err.to_string(), "Subscription sub-3 not found");
}

#[test]
fn test_kernel_error_wraps_event_error() {
    let err: Error = EventSystemError::DrainTimeout {
        waited: Duration::from_millis(5),
        in_flight: 2,
    }
    .into();
    assert!(matches!(err, Error::EventSystem(_)));
    assert_eq!(err.kind(), "timeout");
    assert!(err.to_string().starts_with("Event system error:"));
}
