//! Handler context.
//!
//! One [`Context`] is created per dispatched message and shared, behind an
//! `Arc`, by every handler invocation for that message. It gives handlers the
//! normalized message and the outbound [`Bot`].

use std::sync::Arc;

use courier_core::{
    ApiError, ApiResult, Bot, BoxedBot, ChatAction, FileSource, ForceReply, KeyboardHide,
    KeyboardMarkup, Message, OutboundContent, ParseMode, ReplyMarkup, SendRequest,
};

/// The context handed to handlers.
pub struct Context {
    message: Message,
    bot: BoxedBot,
}

impl Context {
    pub fn new(message: Message, bot: BoxedBot) -> Self {
        Self { message, bot }
    }

    /// The message being handled, after normalization.
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The message text, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        self.message.text()
    }

    pub fn bot(&self) -> &dyn Bot {
        self.bot.as_ref()
    }

    pub fn bot_arc(&self) -> BoxedBot {
        Arc::clone(&self.bot)
    }

    /// Sends `text` to the chat the message came from.
    pub async fn reply(&self, text: impl Into<String>) -> ApiResult<Message> {
        self.bot
            .send(SendRequest::text(self.message.chat_id(), text))
            .await
    }

    /// Shows a chat action in the originating chat.
    pub async fn chat_action(&self, action: ChatAction) -> ApiResult<()> {
        self.bot
            .send_chat_action(self.message.chat_id(), action)
            .await
    }

    /// Forwards the handled message to another chat.
    pub async fn forward_to(&self, chat_id: i64) -> ApiResult<Message> {
        self.bot
            .forward(chat_id, self.message.chat_id(), self.message.message_id)
            .await
    }

    /// Starts a richer answer to the originating chat.
    ///
    /// ```rust,ignore
    /// ctx.answer()
    ///     .text("Pick one")
    ///     .quote()
    ///     .keyboard(KeyboardMarkup::new([["yes", "no"]]).one_time(true))
    ///     .send()
    ///     .await?;
    /// ```
    pub fn answer(&self) -> Answer<'_> {
        Answer {
            ctx: self,
            chat_id: self.message.chat_id(),
            content: None,
            reply_to: None,
            markup: None,
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("message_id", &self.message.message_id)
            .field("chat_id", &self.message.chat_id())
            .field("bot", &self.bot.identity().id)
            .finish()
    }
}

/// Fluent builder for an outbound message.
#[must_use = "an answer does nothing until `send` is awaited"]
pub struct Answer<'a> {
    ctx: &'a Context,
    chat_id: i64,
    content: Option<OutboundContent>,
    reply_to: Option<i64>,
    markup: Option<ReplyMarkup>,
}

impl Answer<'_> {
    /// Sends to another chat instead of the originating one.
    pub fn to_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = chat_id;
        self
    }

    pub fn content(mut self, content: OutboundContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.content(OutboundContent::text(text))
    }

    /// Text with a parse mode.
    pub fn formatted(self, text: impl Into<String>, mode: ParseMode) -> Self {
        self.content(OutboundContent::Text {
            text: text.into(),
            parse_mode: Some(mode),
            disable_web_page_preview: None,
        })
    }

    pub fn photo(self, photo: impl Into<FileSource>, caption: Option<String>) -> Self {
        self.content(OutboundContent::Photo {
            photo: photo.into(),
            caption,
        })
    }

    pub fn audio(self, audio: impl Into<FileSource>) -> Self {
        self.content(OutboundContent::Audio {
            audio: audio.into(),
            duration: None,
            performer: None,
            title: None,
        })
    }

    pub fn voice(self, voice: impl Into<FileSource>) -> Self {
        self.content(OutboundContent::Voice {
            voice: voice.into(),
            duration: None,
        })
    }

    pub fn document(self, document: impl Into<FileSource>) -> Self {
        self.content(OutboundContent::Document {
            document: document.into(),
        })
    }

    pub fn sticker(self, sticker: impl Into<FileSource>) -> Self {
        self.content(OutboundContent::Sticker {
            sticker: sticker.into(),
        })
    }

    pub fn video(self, video: impl Into<FileSource>, caption: Option<String>) -> Self {
        self.content(OutboundContent::Video {
            video: video.into(),
            duration: None,
            caption,
        })
    }

    pub fn location(self, latitude: f64, longitude: f64) -> Self {
        self.content(OutboundContent::Location {
            latitude,
            longitude,
        })
    }

    pub fn reply_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    /// Replies to the message being handled.
    pub fn quote(self) -> Self {
        let id = self.ctx.message.message_id;
        self.reply_to(id)
    }

    pub fn keyboard(mut self, keyboard: KeyboardMarkup) -> Self {
        self.markup = Some(ReplyMarkup::Keyboard(keyboard));
        self
    }

    pub fn hide_keyboard(mut self) -> Self {
        self.markup = Some(ReplyMarkup::Hide(KeyboardHide::new()));
        self
    }

    pub fn force_reply(mut self) -> Self {
        self.markup = Some(ReplyMarkup::ForceReply(ForceReply::new()));
        self
    }

    /// The request this answer would send.
    pub fn build(self) -> ApiResult<SendRequest> {
        let content = self
            .content
            .ok_or_else(|| ApiError::Other("answer has no content".to_string()))?;

        Ok(SendRequest {
            chat_id: self.chat_id,
            content,
            reply_to_message_id: self.reply_to,
            reply_markup: self.markup,
        })
    }

    pub async fn send(self) -> ApiResult<Message> {
        let bot = self.ctx.bot_arc();
        let request = self.build()?;
        bot.send(request).await
    }
}
