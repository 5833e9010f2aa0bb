use async_trait::async_trait;

use crate::protocol::OperationRequest;
use crate::utils::error::GatewayError;

/// Capability that actually performs a register operation against a target
/// device.
///
/// Read functions return `register_count` values; write functions return an
/// empty sequence on success. Each call manages its own connection and is
/// at-most-once: the gateway never retries.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn execute(&self, request: &OperationRequest) -> Result<Vec<u16>, GatewayError>;
}
