//! Reasoning engine port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BrainRequest, BrainResponse};

/// Reasoning engine port.
///
/// Implementations report process failures as `BrainFailed`. Timeouts are
/// applied by the caller.
#[async_trait]
pub trait Brain: Send + Sync {
    /// Short adapter name used in logs.
    fn name(&self) -> &'static str;

    /// Run one request to completion.
    async fn execute(&self, request: BrainRequest) -> DomainResult<BrainResponse>;
}
