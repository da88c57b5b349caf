//! EndpointClient port - one claim attempt against the remote service.

use async_trait::async_trait;

use crate::domain::{Credentials, NetworkError, Operation, RawResult};

/// Performs exactly one request for `operation` on behalf of `credentials`.
///
/// Implementations must not retry internally; retries belong to the task
/// loop so every attempt is counted and observed. A response with any HTTP
/// status is `Ok`; only transport failures are `Err`.
///
/// # Thread Safety
/// - shared by every task of a run (`Arc<dyn EndpointClient>`)
#[async_trait]
pub trait EndpointClient: Send + Sync {
    async fn attempt(
        &self,
        operation: &Operation,
        credentials: &Credentials,
    ) -> Result<RawResult, NetworkError>;
}
