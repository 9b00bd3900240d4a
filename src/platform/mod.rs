pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::MonitorError;

/// Platform-specific chat identifier
pub type ChatId = i64;

/// A conversation visible to the authenticated account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub id: ChatId,
    pub name: String,
}

/// An incoming message delivered by a chat source
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// A live chat session that delivers incoming messages
#[async_trait]
pub trait ChatSource: Send {
    /// All conversations of the authenticated account
    async fn dialogs(&mut self) -> Result<Vec<Dialog>, MonitorError>;

    /// Wait for the next incoming message. `Ok(None)` means the session has
    /// ended.
    async fn next_message(&mut self) -> Result<Option<IncomingMessage>, MonitorError>;

    async fn disconnect(&mut self) -> Result<(), MonitorError>;
}
