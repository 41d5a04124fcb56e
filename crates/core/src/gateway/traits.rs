//! Trait definitions for the gateway module.

use std::path::Path;

use async_trait::async_trait;

use super::error::GatewayError;
use super::types::{ChatId, MessageHandle};

/// Delivers messages and files to chats.
///
/// Implementations are shared by every worker and must bound their own
/// resource usage (connections, concurrent requests).
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Returns the name of this gateway implementation.
    fn name(&self) -> &str;

    /// Send a plain text message.
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<MessageHandle, GatewayError>;

    /// Send a status message that will later be edited in place.
    async fn send_status(&self, chat: ChatId, text: &str) -> Result<MessageHandle, GatewayError> {
        self.send_text(chat, text).await
    }

    /// Replace the text of a status message.
    ///
    /// Fails with [`GatewayError::NotModified`] when `text` equals the
    /// current content.
    async fn edit_status(&self, message: &MessageHandle, text: &str) -> Result<(), GatewayError>;

    /// Upload a local file with a caption.
    async fn send_file(
        &self,
        chat: ChatId,
        path: &Path,
        caption: &str,
    ) -> Result<MessageHandle, GatewayError>;

    /// Delete a message. Best effort.
    async fn delete_message(&self, message: &MessageHandle) -> Result<(), GatewayError>;

    /// Release pooled connections. Later calls fail with [`GatewayError::Closed`].
    async fn close(&self);
}
