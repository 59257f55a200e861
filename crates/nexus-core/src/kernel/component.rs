use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::kernel::error::Result;

/// Core component lifecycle trait for all kernel components.
///
/// The lifecycle controller starts components in dependency order (bus
/// before plugin manager) and stops them in reverse.
#[async_trait]
pub trait KernelComponent: Any + Send + Sync + Debug {
    fn name(&self) -> &'static str;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}
