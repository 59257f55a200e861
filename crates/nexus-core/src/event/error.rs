//! # Nexus Core Event System Errors
//!
//! Defines error types specific to the Nexus event bus.
//!
//! [`EventSystemError`] covers everything a caller of the bus can observe
//! synchronously: backpressure rejections, invalid topics or patterns,
//! duplicate subscriptions and lifecycle misuse. Handler failures are not
//! returned to publishers; they travel as [`HandlerFault`](crate::event::HandlerFault)
//! records to the plugin manager.
use std::time::Duration;

use crate::event::SubscriptionId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventSystemError {
    #[error("Event queue is full (capacity {capacity}); event on topic '{topic}' was rejected")]
    QueueFull {
        topic: String,
        capacity: usize,
    },

    #[error("Event bus is not running; cannot accept event on topic '{topic}'")]
    BusNotRunning {
        topic: String,
    },

    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic {
        topic: String,
        reason: String,
    },

    #[error("Invalid topic pattern '{pattern}': {reason}")]
    InvalidTopicPattern {
        pattern: String,
        reason: String,
    },

    #[error("Owner '{owner}' already subscribed this handler to '{pattern}'")]
    DuplicateSubscription {
        owner: String,
        pattern: String,
    },

    #[error("Subscription {id} not found")]
    SubscriptionNotFound {
        id: SubscriptionId,
    },

    #[error("Event bus could not drain within {waited:?}; {in_flight} dispatch(es) still in flight")]
    DrainTimeout {
        waited: Duration,
        in_flight: usize,
    },

    #[error("No Tokio runtime available for operation '{operation}'")]
    NoRuntime {
        operation: String,
    },

    #[error("Attempted to operate on a poisoned event bus component: {component}")]
    BusPoisoned {
        component: String, // e.g., "subscriptions", "ingress"
    },
}

impl EventSystemError {
    /// Stable machine-readable kind string
    pub fn kind(&self) -> &'static str {
        match self {
            EventSystemError::QueueFull { .. } => "queue_full",
            EventSystemError::BusNotRunning { .. } => "bus_not_running",
            EventSystemError::InvalidTopic { .. } | EventSystemError::InvalidTopicPattern { .. } => "invalid_topic",
            EventSystemError::DuplicateSubscription { .. } => "duplicate_subscription",
            EventSystemError::SubscriptionNotFound { .. } => "subscription_not_found",
            EventSystemError::DrainTimeout { .. } => "timeout",
            EventSystemError::NoRuntime { .. } => "no_runtime",
            EventSystemError::BusPoisoned { .. } => "internal",
        }
    }
}
