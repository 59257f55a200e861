/// Application name
pub const APP_NAME: &str = "Nexus";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source name used for events published by the bus itself
pub const BUS_SOURCE: &str = "bus";

/// Owner id used by the control surface for its temporary subscriptions
pub const CONTROL_OWNER: &str = "control";

// --- Well-known topics ---

/// A plugin reached the Active state
pub const TOPIC_PLUGIN_LOADED: &str = "plugin.loaded";

/// A plugin left the Active state and was unloaded
pub const TOPIC_PLUGIN_UNLOADED: &str = "plugin.unloaded";

/// A plugin failed to load or one of its handlers failed
pub const TOPIC_PLUGIN_ERROR: &str = "plugin.error";

/// The lifecycle controller finished starting
pub const TOPIC_LIFECYCLE_STARTED: &str = "lifecycle.started";

/// The lifecycle controller is shutting down
pub const TOPIC_LIFECYCLE_SHUTDOWN: &str = "lifecycle.shutdown";

/// Task request issued by the control surface
pub const TOPIC_TASK_REQUEST: &str = "task.request";

/// Task response correlated with a task request
pub const TOPIC_TASK_RESPONSE: &str = "task.response";

// --- Defaults ---

/// Default capacity of the bus ingress queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default capacity of each subscriber's private queue
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

/// Default number of handler invocations allowed to run at once
pub const DEFAULT_WORKER_POOL_SIZE: usize = 8;

/// Default shutdown grace period in milliseconds
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Default timeout for `execute` in milliseconds
pub const DEFAULT_EXECUTE_TIMEOUT_MS: u64 = 5_000;

/// Default number of entries kept by the resolution cache
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Number of recent plugin errors kept for status reports
pub const RECENT_ERRORS_LIMIT: usize = 16;

/// Capacity of the channel carrying handler faults from the bus to the plugin manager
pub const FAULT_CHANNEL_CAPACITY: usize = 256;
