use std::any::Any;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

use crate::event::error::EventSystemError;
use crate::event::pattern::{validate_topic, TopicPattern};
use crate::event::{Event, EventHandler, EventPayload, HandlerFault, SubscriptionId};
use crate::kernel::component::KernelComponent;
use crate::kernel::constants;
use crate::kernel::error::Result;

/// Sizing of the bus queues and worker pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BusConfig {
    /// Capacity of the ingress queue; `publish` fails fast once it is full
    pub queue_capacity: usize,
    /// Capacity of each subscriber's private queue
    pub subscriber_queue_capacity: usize,
    /// Maximum number of handler invocations running at once
    pub worker_pool_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: constants::DEFAULT_QUEUE_CAPACITY,
            subscriber_queue_capacity: constants::DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
            worker_pool_size: constants::DEFAULT_WORKER_POOL_SIZE,
        }
    }
}

/// Point-in-time counters of the bus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub running: bool,
    pub accepted: u64,
    pub rejected: u64,
    pub delivered: u64,
    pub handler_failures: u64,
    pub dropped: u64,
    /// Handler faults that could not be handed to the fault channel
    pub faults_lost: u64,
    pub in_flight: usize,
    pub subscriptions: usize,
}

/// Public view of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub owner: String,
    pub pattern: String,
    pub priority: i32,
}

//--------------------------------------------------
// Internal state
//--------------------------------------------------

/// Accepted event plus the subscription high-water mark at acceptance time
struct Envelope {
    event: Arc<Event>,
    watermark: u64,
}

/// Start order of the handlers matched by one event.
///
/// Handlers take turns in dispatch order: each waits for its position, takes a
/// pool permit, and hands the turn on once its handler has been polled.
struct DispatchTurn {
    next: AtomicUsize,
    advanced: Notify,
}

impl DispatchTurn {
    fn new() -> Self {
        Self { next: AtomicUsize::new(0), advanced: Notify::new() }
    }

    async fn wait_for(&self, position: usize) {
        loop {
            let notified = self.advanced.notified();
            if self.next.load(Ordering::SeqCst) >= position {
                return;
            }
            notified.await;
        }
    }

    fn advance(&self) {
        self.next.fetch_add(1, Ordering::SeqCst);
        self.advanced.notify_waiters();
    }
}

/// One event queued for one subscriber
struct Job {
    event: Arc<Event>,
    turn: Arc<DispatchTurn>,
    position: usize,
}

struct SubscriptionEntry {
    id: SubscriptionId,
    owner: String,
    pattern: TopicPattern,
    priority: i32,
    handler: Arc<dyn EventHandler>,
    queue: mpsc::Sender<Job>,
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionEntry {
    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            owner: self.owner.clone(),
            pattern: self.pattern.to_string(),
            priority: self.priority,
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// What a subscriber worker needs to run its handler
struct WorkerContext {
    id: SubscriptionId,
    owner: String,
    handler: Arc<dyn EventHandler>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
    dropped: AtomicU64,
    faults_lost: AtomicU64,
}

type SubscriptionTable = Arc<Vec<Arc<SubscriptionEntry>>>;

struct BusShared {
    config: BusConfig,
    /// Copy-on-write table kept in dispatch order (priority desc, creation asc)
    subscriptions: RwLock<SubscriptionTable>,
    next_subscription_id: AtomicU64,
    ingress: RwLock<Option<mpsc::Sender<Envelope>>>,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
    pool: Arc<Semaphore>,
    /// Accepted events not yet fanned out plus queued/running handler jobs
    pending: AtomicUsize,
    idle: Notify,
    counters: Counters,
    faults_tx: mpsc::Sender<HandlerFault>,
    faults_rx: Mutex<Option<mpsc::Receiver<HandlerFault>>>,
}

fn read_lock<'a, T>(lock: &'a RwLock<T>, component: &str) -> std::result::Result<RwLockReadGuard<'a, T>, EventSystemError> {
    lock.read().map_err(|_| EventSystemError::BusPoisoned { component: component.to_string() })
}

fn write_lock<'a, T>(lock: &'a RwLock<T>, component: &str) -> std::result::Result<RwLockWriteGuard<'a, T>, EventSystemError> {
    lock.write().map_err(|_| EventSystemError::BusPoisoned { component: component.to_string() })
}

fn lock_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl BusShared {
    fn snapshot(&self) -> SubscriptionTable {
        match self.subscriptions.read() {
            Ok(table) => table.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn begin_pending(&self, n: usize) {
        self.pending.fetch_add(n, Ordering::SeqCst);
    }

    fn finish_pending(&self, n: usize) {
        let previous = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| Some(p.saturating_sub(n)))
            .unwrap_or(0);
        if previous <= n {
            self.idle.notify_waiters();
        }
    }

    fn publish(&self, source: &str, sequence: &Mutex<u64>, topic: &str, payload: EventPayload) -> std::result::Result<u64, EventSystemError> {
        validate_topic(topic)?;
        let sender = read_lock(&self.ingress, "ingress")?
            .clone()
            .ok_or_else(|| EventSystemError::BusNotRunning { topic: topic.to_string() })?;

        // Sequence assignment and enqueue happen under the publisher's lock so
        // that sequence order equals acceptance order.
        let mut last = lock_recover(sequence);
        let next = *last + 1;
        let envelope = Envelope {
            event: Arc::new(Event::new(topic, payload, source, next)),
            watermark: self.next_subscription_id.load(Ordering::SeqCst),
        };

        self.begin_pending(1);
        match sender.try_send(envelope) {
            Ok(()) => {
                *last = next;
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                log::trace!("Accepted '{}' #{} from '{}'", topic, next, source);
                Ok(next)
            }
            Err(TrySendError::Full(_)) => {
                self.finish_pending(1);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!("Event queue full; rejected '{}' from '{}'", topic, source);
                Err(EventSystemError::QueueFull {
                    topic: topic.to_string(),
                    capacity: self.config.queue_capacity,
                })
            }
            Err(TrySendError::Closed(_)) => {
                self.finish_pending(1);
                Err(EventSystemError::BusNotRunning { topic: topic.to_string() })
            }
        }
    }

    /// Fan an accepted event out to the queues of every matching subscriber
    fn dispatch(&self, envelope: Envelope) {
        let table = self.snapshot();
        let topic = envelope.event.topic();
        let turn = Arc::new(DispatchTurn::new());
        let mut position = 0;
        for entry in table.iter() {
            if entry.id.0 >= envelope.watermark || !entry.pattern.matches(topic) {
                continue;
            }
            if entry.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            self.begin_pending(1);
            let job = Job { event: envelope.event.clone(), turn: turn.clone(), position };
            match entry.queue.try_send(job) {
                Ok(()) => position += 1,
                Err(TrySendError::Full(_)) => {
                    self.finish_pending(1);
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Subscriber {} of '{}' is saturated; dropped '{}' #{}",
                        entry.id, entry.owner, topic, envelope.event.sequence()
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    self.finish_pending(1);
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Run a handler once, converting both `Err` and panics into a message.
    ///
    /// `turn` is handed on right after the first poll of the handler.
    async fn invoke_once(
        handler: &Arc<dyn EventHandler>,
        event: Arc<Event>,
        turn: Option<&DispatchTurn>,
    ) -> std::result::Result<(), (String, bool)> {
        let mut attempt = pin!(AssertUnwindSafe(handler.handle(event)).catch_unwind());
        let first = futures::poll!(attempt.as_mut());
        if let Some(turn) = turn {
            turn.advance();
        }
        let outcome = match first {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => attempt.await,
        };
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err((e.to_string(), false)),
            Err(panic) => Err((panic_message(&panic), true)),
        }
    }

    /// Invoke with a single retry; report a fault when both attempts fail
    async fn invoke(&self, ctx: &WorkerContext, event: Arc<Event>, turn: &DispatchTurn) {
        let mut failure = (String::new(), false);
        for attempt in 1..=2 {
            let turn = (attempt == 1).then_some(turn);
            match Self::invoke_once(&ctx.handler, event.clone(), turn).await {
                Ok(()) => {
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(f) => {
                    log::warn!(
                        "Handler {} of '{}' failed on '{}' #{} from '{}' (attempt {}): {}",
                        ctx.id, ctx.owner, event.topic(), event.sequence(), event.source(), attempt, f.0
                    );
                    failure = f;
                }
            }
        }

        self.counters.handler_failures.fetch_add(1, Ordering::Relaxed);
        let fault = HandlerFault {
            subscription: ctx.id,
            owner: ctx.owner.clone(),
            topic: event.topic().to_string(),
            source: event.source().to_string(),
            sequence: event.sequence(),
            message: failure.0,
            panicked: failure.1,
        };
        log::error!("Dropping event for subscriber: {}", fault);
        if self.faults_tx.try_send(fault).is_err() {
            self.counters.faults_lost.fetch_add(1, Ordering::Relaxed);
            log::warn!("Handler fault channel is full or closed; fault for '{}' not recorded", ctx.owner);
        }
    }
}

async fn dispatch_loop(shared: Arc<BusShared>, mut ingress: mpsc::Receiver<Envelope>) {
    log::debug!("Event bus dispatch loop started");
    while let Some(envelope) = ingress.recv().await {
        shared.dispatch(envelope);
        shared.finish_pending(1);
    }
    log::debug!("Event bus dispatch loop finished");
}

async fn subscriber_worker(shared: Arc<BusShared>, ctx: WorkerContext, mut queue: mpsc::Receiver<Job>) {
    while let Some(job) = queue.recv().await {
        job.turn.wait_for(job.position).await;
        if ctx.cancelled.load(Ordering::SeqCst) {
            job.turn.advance();
            shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            shared.finish_pending(1);
            continue;
        }
        // The pool semaphore is never closed, so acquisition only fails on shutdown paths.
        let permit = shared.pool.clone().acquire_owned().await;
        if permit.is_ok() {
            shared.invoke(&ctx, job.event, &job.turn).await;
        } else {
            job.turn.advance();
        }
        drop(permit);
        shared.finish_pending(1);
    }
    log::trace!("Subscriber worker {} of '{}' exited", ctx.id, ctx.owner);
}

//--------------------------------------------------
// Publisher
//--------------------------------------------------

/// Publishing handle with its own monotonically increasing sequence counter
#[derive(Clone)]
pub struct Publisher {
    source: Arc<str>,
    sequence: Arc<Mutex<u64>>,
    shared: Arc<BusShared>,
}

impl Publisher {
    /// Publish an event; returns the sequence number it was accepted with
    pub fn publish(&self, topic: &str, payload: EventPayload) -> std::result::Result<u64, EventSystemError> {
        self.shared.publish(&self.source, &self.sequence, topic, payload)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").field("source", &self.source).finish_non_exhaustive()
    }
}

//--------------------------------------------------
// EventBus (Public API)
//--------------------------------------------------

/// Bounded, fault-isolating publish/subscribe bus
#[derive(Clone)]
pub struct EventBus {
    shared: Arc<BusShared>,
    publisher: Publisher,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.shared.config)
            .field("in_flight", &self.shared.pending.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a stopped bus; call [`EventBus::start`] before publishing
    pub fn new(config: BusConfig) -> Self {
        let config = BusConfig {
            queue_capacity: config.queue_capacity.max(1),
            subscriber_queue_capacity: config.subscriber_queue_capacity.max(1),
            worker_pool_size: config.worker_pool_size.max(1),
        };
        let (faults_tx, faults_rx) = mpsc::channel(constants::FAULT_CHANNEL_CAPACITY);
        let shared = Arc::new(BusShared {
            pool: Arc::new(Semaphore::new(config.worker_pool_size)),
            config,
            subscriptions: RwLock::new(Arc::new(Vec::new())),
            next_subscription_id: AtomicU64::new(1),
            ingress: RwLock::new(None),
            dispatch_task: Mutex::new(None),
            workers: Mutex::new(HashMap::new()),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            counters: Counters::default(),
            faults_tx,
            faults_rx: Mutex::new(Some(faults_rx)),
        });
        let publisher = Publisher {
            source: Arc::from(constants::BUS_SOURCE),
            sequence: Arc::new(Mutex::new(0)),
            shared: shared.clone(),
        };
        Self { shared, publisher }
    }

    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    /// Start the dispatch loop. Starting a running bus is a no-op.
    pub fn start(&self) -> std::result::Result<(), EventSystemError> {
        let runtime = Handle::try_current().map_err(|_| EventSystemError::NoRuntime { operation: "start".to_string() })?;
        let mut ingress = write_lock(&self.shared.ingress, "ingress")?;
        if ingress.is_some() {
            return Ok(());
        }
        let (tx, rx) = mpsc::channel(self.shared.config.queue_capacity);
        self.shared.pending.store(0, Ordering::SeqCst);
        *ingress = Some(tx);
        let task = runtime.spawn(dispatch_loop(self.shared.clone(), rx));
        *lock_recover(&self.shared.dispatch_task) = Some(task);
        log::info!(
            "Event bus started (queue capacity {}, worker pool {})",
            self.shared.config.queue_capacity, self.shared.config.worker_pool_size
        );
        Ok(())
    }

    /// Whether the bus currently accepts events
    pub fn is_running(&self) -> bool {
        self.shared.ingress.read().map(|i| i.is_some()).unwrap_or(false)
    }

    /// Stop the bus, abandoning anything still queued or running.
    ///
    /// All subscriptions are torn down. Returns the number of dispatches that
    /// were abandoned.
    pub fn stop(&self) -> usize {
        let was_running = match self.shared.ingress.write() {
            Ok(mut ingress) => ingress.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        };
        if let Some(task) = lock_recover(&self.shared.dispatch_task).take() {
            task.abort();
        }

        let table = match self.shared.subscriptions.write() {
            Ok(mut table) => std::mem::take(&mut *table),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        table.iter().for_each(|entry| entry.cancel());
        for (_, worker) in lock_recover(&self.shared.workers).drain() {
            worker.abort();
        }

        let abandoned = self.shared.pending.swap(0, Ordering::SeqCst);
        self.shared.idle.notify_waiters();
        if was_running {
            if abandoned > 0 {
                log::warn!("Event bus stopped; abandoned {} in-flight dispatch(es)", abandoned);
            } else {
                log::info!("Event bus stopped");
            }
        }
        abandoned
    }

    /// Wait until every accepted event has been handled by every subscriber
    pub async fn drain(&self, grace: Duration) -> std::result::Result<(), EventSystemError> {
        let shared = &self.shared;
        let wait = async {
            loop {
                let notified = shared.idle.notified();
                if shared.pending.load(Ordering::SeqCst) == 0 {
                    return;
                }
                notified.await;
            }
        };
        match tokio::time::timeout(grace, wait).await {
            Ok(()) => Ok(()),
            Err(_) => Err(EventSystemError::DrainTimeout {
                waited: grace,
                in_flight: shared.pending.load(Ordering::SeqCst),
            }),
        }
    }

    /// Publish as the bus itself (`source = "bus"`)
    pub fn publish(&self, topic: &str, payload: EventPayload) -> std::result::Result<u64, EventSystemError> {
        self.publisher.publish(topic, payload)
    }

    /// Create a publisher handle with its own sequence counter
    pub fn publisher(&self, source: &str) -> Publisher {
        Publisher {
            source: Arc::from(source),
            sequence: Arc::new(Mutex::new(0)),
            shared: self.shared.clone(),
        }
    }

    /// Subscribe a handler owned by `owner` to a topic pattern
    pub fn subscribe(
        &self,
        owner: &str,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> std::result::Result<SubscriptionId, EventSystemError> {
        let pattern = TopicPattern::parse(pattern)?;
        let runtime = Handle::try_current().map_err(|_| EventSystemError::NoRuntime { operation: "subscribe".to_string() })?;

        let mut table = write_lock(&self.shared.subscriptions, "subscriptions")?;
        let duplicate = table.iter().any(|entry| {
            entry.owner == owner
                && entry.pattern == pattern
                && std::ptr::addr_eq(Arc::as_ptr(&entry.handler), Arc::as_ptr(&handler))
        });
        if duplicate {
            return Err(EventSystemError::DuplicateSubscription {
                owner: owner.to_string(),
                pattern: pattern.to_string(),
            });
        }

        let id = SubscriptionId(self.shared.next_subscription_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(self.shared.config.subscriber_queue_capacity);
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = Arc::new(SubscriptionEntry {
            id,
            owner: owner.to_string(),
            pattern,
            priority,
            handler: handler.clone(),
            queue: tx,
            cancelled: cancelled.clone(),
        });

        let worker = runtime.spawn(subscriber_worker(
            self.shared.clone(),
            WorkerContext { id, owner: owner.to_string(), handler, cancelled },
            rx,
        ));
        lock_recover(&self.shared.workers).insert(id, worker);

        let mut next = table.as_ref().clone();
        let position = next.partition_point(|e| (Reverse(e.priority), e.id) < (Reverse(priority), id));
        log::debug!("Subscribed {} of '{}' to '{}' (priority {})", id, owner, entry.pattern, priority);
        next.insert(position, entry);
        *table = Arc::new(next);
        Ok(id)
    }

    /// Remove a subscription; entries already queued for it are cancelled
    pub fn unsubscribe(&self, id: SubscriptionId) -> std::result::Result<(), EventSystemError> {
        let mut table = write_lock(&self.shared.subscriptions, "subscriptions")?;
        let Some(position) = table.iter().position(|e| e.id == id) else {
            return Err(EventSystemError::SubscriptionNotFound { id });
        };
        let mut next = table.as_ref().clone();
        let removed = next.remove(position);
        removed.cancel();
        *table = Arc::new(next);
        // The worker exits on its own once the queue sender is dropped.
        lock_recover(&self.shared.workers).remove(&id);
        log::debug!("Unsubscribed {} of '{}'", id, removed.owner);
        Ok(())
    }

    /// Remove every subscription held by `owner`; returns how many were removed
    pub fn unsubscribe_owner(&self, owner: &str) -> std::result::Result<usize, EventSystemError> {
        let mut table = write_lock(&self.shared.subscriptions, "subscriptions")?;
        let (removed, kept): (Vec<_>, Vec<_>) = table.iter().cloned().partition(|e| e.owner == owner);
        if removed.is_empty() {
            return Ok(0);
        }
        *table = Arc::new(kept);
        let mut workers = lock_recover(&self.shared.workers);
        for entry in &removed {
            entry.cancel();
            workers.remove(&entry.id);
        }
        log::debug!("Removed {} subscription(s) of '{}'", removed.len(), owner);
        Ok(removed.len())
    }

    /// Subscriptions in dispatch order
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.shared.snapshot().iter().map(|e| e.info()).collect()
    }

    /// Subscriptions that would receive an event on `topic`, in dispatch order
    pub fn matching(&self, topic: &str) -> Vec<SubscriptionInfo> {
        self.shared
            .snapshot()
            .iter()
            .filter(|e| e.pattern.matches(topic))
            .map(|e| e.info())
            .collect()
    }

    /// Take the receiving end of the handler fault channel (only once)
    pub fn take_fault_receiver(&self) -> Option<mpsc::Receiver<HandlerFault>> {
        lock_recover(&self.shared.faults_rx).take()
    }

    pub fn stats(&self) -> BusStats {
        let c = &self.shared.counters;
        BusStats {
            running: self.is_running(),
            accepted: c.accepted.load(Ordering::Relaxed),
            rejected: c.rejected.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            handler_failures: c.handler_failures.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            faults_lost: c.faults_lost.load(Ordering::Relaxed),
            in_flight: self.shared.pending.load(Ordering::SeqCst),
            subscriptions: self.shared.snapshot().len(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[async_trait]
impl KernelComponent for EventBus {
    fn name(&self) -> &'static str {
        "EventBus"
    }

    async fn start(&self) -> Result<()> {
        EventBus::start(self)?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        EventBus::stop(self);
        Ok(())
    }
}
