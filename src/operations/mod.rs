pub mod builtin;
pub mod registry;

use async_trait::async_trait;

use crate::sandbox::PathSandbox;

/// Runtime context passed to operation execution.
///
/// Gives providers the sandbox they must validate paths against, and the
/// task text that selected them.
pub struct OperationContext<'a> {
    pub sandbox: &'a PathSandbox,
    pub task: &'a str,
}

/// A known operation reachable by intent keyword.
///
/// All builtin operations implement this trait. The dispatcher calls
/// `execute()` when the task text contains `keyword()`.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Unique identifier, lowercase + underscores (e.g. "fetch_data").
    fn name(&self) -> &str;

    /// Literal substring of the task text that routes to this operation.
    fn keyword(&self) -> &str;

    /// Human-readable description for the `/operations` listing.
    fn description(&self) -> &str;

    /// Performs the operation and returns a short status message.
    ///
    /// Every caller-supplied path must pass `context.sandbox` before the
    /// filesystem is touched. Sandbox rejections should be returned as the
    /// original `DispatchError` so the caller keeps the access-denied category.
    async fn execute(&self, context: &OperationContext<'_>) -> anyhow::Result<String>;
}

pub use registry::OperationRegistry;
