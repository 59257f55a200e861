//! # Nexus Core Event Bus
//!
//! Topic based publish/subscribe with bounded ingress, per-subscriber ordering
//! and per-handler fault isolation.
//!
//! - **[`dispatcher`]**: the [`EventBus`] itself, its [`Publisher`] handles and
//!   the dispatch loop / subscriber workers.
//! - **[`pattern`]**: exact and prefix-wildcard [`TopicPattern`]s.
//! - **[`types`]**: [`SystemEvent`], the events the core emits on well-known topics.
//! - **[`error`]**: [`EventSystemError`](error::EventSystemError).
pub mod dispatcher;
pub mod error;
pub mod pattern;
pub mod types;

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::Serialize;

/// Opaque event payload
pub type EventPayload = serde_json::Value;

/// Error type handlers may return
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a single handler invocation
pub type HandlerResult = Result<(), BoxError>;

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SubscriptionId(pub(crate) u64);

impl SubscriptionId {
    /// Raw numeric value (also the subscription's creation order)
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// An immutable fact published on a topic
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    topic: String,
    payload: EventPayload,
    published_at: SystemTime,
    sequence: u64,
    source: String,
}

impl Event {
    pub(crate) fn new(topic: &str, payload: EventPayload, source: &str, sequence: u64) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
            published_at: SystemTime::now(),
            sequence,
            source: source.to_string(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn published_at(&self) -> SystemTime {
        self.published_at
    }

    /// Per-publisher sequence number, starting at 1
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Name of the publisher that produced this event
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Convenience accessor for a string field of an object payload
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Asynchronous event handler trait
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<Event>) -> HandlerResult;
}

/// Handler record passed to the owning plugin when a handler keeps failing
#[derive(Debug, Clone)]
pub struct HandlerFault {
    pub subscription: SubscriptionId,
    pub owner: String,
    pub topic: String,
    pub source: String,
    pub sequence: u64,
    pub message: String,
    pub panicked: bool,
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "handler {} of '{}' failed twice on '{}' #{} from '{}': {}",
            self.subscription, self.owner, self.topic, self.sequence, self.source, self.message
        )
    }
}

/// Handler built from a synchronous closure
struct SyncHandler<F> {
    f: F,
}

#[async_trait]
impl<F> EventHandler for SyncHandler<F>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle(&self, event: Arc<Event>) -> HandlerResult {
        (self.f)(&event)
    }
}

/// Handler built from a closure returning a future
struct AsyncHandler<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> EventHandler for AsyncHandler<F, Fut>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event>) -> HandlerResult {
        (self.f)(event).await
    }
}

/// Helper function to create synchronous handlers that are compatible with the async bus
pub fn sync_handler<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(SyncHandler { f })
}

/// Helper function to create handlers from async closures
pub fn async_handler<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(AsyncHandler { f, _marker: PhantomData })
}

/// Re-export important types
pub use dispatcher::{BusConfig, BusStats, EventBus, Publisher, SubscriptionInfo};
pub use error::EventSystemError;
pub use pattern::TopicPattern;
pub use types::SystemEvent;

// Test module declaration
#[cfg(test)]
mod tests;
