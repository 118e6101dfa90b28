//! Shared fixtures for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use courier_core::{
    ApiResult, Bot, BoxedBot, Chat, ChatAction, Message, MessageContent, SendRequest, User,
};

pub(crate) struct MockBot {
    me: User,
    pub(crate) sent: Mutex<Vec<SendRequest>>,
}

impl MockBot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            me: user(1000, Some("botname")),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|r| match &r.content {
                courier_core::OutboundContent::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Bot for MockBot {
    fn identity(&self) -> &User {
        &self.me
    }

    async fn send(&self, request: SendRequest) -> ApiResult<Message> {
        let echo = message(request.chat_id, self.me.id, MessageContent::Empty);
        self.sent.lock().push(request);
        Ok(echo)
    }

    async fn forward(&self, chat_id: i64, _from: i64, _message_id: i64) -> ApiResult<Message> {
        Ok(message(chat_id, self.me.id, MessageContent::Empty))
    }

    async fn send_chat_action(&self, _chat_id: i64, _action: ChatAction) -> ApiResult<()> {
        Ok(())
    }
}

pub(crate) fn mock_bot() -> BoxedBot {
    MockBot::new()
}

pub(crate) fn user(id: i64, username: Option<&str>) -> User {
    User {
        id,
        first_name: format!("user{id}"),
        last_name: None,
        username: username.map(str::to_string),
    }
}

pub(crate) fn message(chat_id: i64, from: i64, content: MessageContent) -> Message {
    Message {
        message_id: 1,
        from: user(from, None),
        date: 1_450_000_000,
        chat: Chat {
            id: chat_id,
            first_name: None,
            last_name: None,
            username: None,
            title: None,
        },
        forward: None,
        reply_to: None,
        content,
    }
}

/// A private text message from `from`.
pub(crate) fn text(from: i64, text: &str) -> Message {
    message(from, from, MessageContent::Text(text.to_string()))
}
