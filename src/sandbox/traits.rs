use async_trait::async_trait;

use crate::sandbox::{ExecutionRequest, ExecutionResult, Failure};

/// Trait for sandbox execution backends.
///
/// An implementation runs one type-check per call in an isolated environment
/// and must not leave anything allocated behind once `execute` returns,
/// whatever the outcome. Implementations hold only read-only configuration
/// and shared client handles, so a single instance serves concurrent calls.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Returns the backend name (e.g., "container", "remote")
    fn name(&self) -> &str;

    /// Run the tool against the request's source.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, Failure>;

    /// Check if the backend can currently accept executions.
    /// Default implementation assumes it can.
    async fn health_check(&self) -> bool {
        true
    }
}
