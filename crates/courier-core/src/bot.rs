//! Collaborator traits.
//!
//! The dispatch engine never talks HTTP itself. Outbound traffic goes through
//! a [`Bot`], inbound polling through an [`UpdateSource`]. The transport crate
//! provides the real implementation of both, and tests use in-memory ones.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::model::{Message, Update, User};
use crate::send::{ChatAction, OutboundContent, SendRequest};

/// The outbound send collaborator.
///
/// Concrete implementations (e.g. `HttpBot`) translate requests into API
/// calls and apply the bot-wide default options.
#[async_trait]
pub trait Bot: Send + Sync + 'static {
    /// The bot's own account, as reported by the platform at startup.
    fn identity(&self) -> &User;

    /// Sends a message and returns the message the platform created.
    async fn send(&self, request: SendRequest) -> ApiResult<Message>;

    /// Forwards `message_id` from `from_chat_id` into `chat_id`.
    async fn forward(&self, chat_id: i64, from_chat_id: i64, message_id: i64)
    -> ApiResult<Message>;

    /// Shows a transient status such as "typing..." in a chat.
    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> ApiResult<()>;

    /// Sends plain text to a chat.
    async fn send_text(&self, chat_id: i64, text: &str) -> ApiResult<Message> {
        self.send(SendRequest::new(chat_id, OutboundContent::text(text)))
            .await
    }
}

/// A boxed Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;

/// The poll-based update source collaborator.
#[async_trait]
pub trait UpdateSource: Send + Sync + 'static {
    /// Long-polls for updates with a sequence number of at least `offset`.
    async fn get_updates(&self, offset: i64, timeout: Duration) -> ApiResult<Vec<Update>>;

    /// Removes any registered push subscription so polling can proceed.
    async fn clear_webhook(&self) -> ApiResult<()>;
}

/// The push-side intake collaborator.
///
/// Sources that receive updates one at a time (the webhook) hand them over
/// here, so the same sequence cursor and filtering apply as for polling.
pub trait UpdateSink: Send + Sync + 'static {
    /// Hands `update` to intake. Returns `true` if a message was enqueued.
    fn submit(&self, update: Update) -> bool;
}

/// A shared UpdateSink trait object.
pub type BoxedSink = Arc<dyn UpdateSink>;
