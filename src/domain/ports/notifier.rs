//! Message delivery port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Message, Participant};

/// Fire-and-forget message delivery. Callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    async fn send(&self, message: &Message) -> DomainResult<()>;

    /// Messages addressed to `to`, newest first
    async fn inbox(&self, to: Participant, limit: i64) -> DomainResult<Vec<Message>>;
}
