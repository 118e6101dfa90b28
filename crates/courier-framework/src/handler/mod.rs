//! Conditional handlers.
//!
//! A conditional handler pairs a predicate over the current message with the
//! action to run when it holds. Evaluation is a single step:
//! [`ConditionalHandler::accept`] inspects the message and, when the handler
//! wants it, returns the ready-to-spawn invocation with the extracted payload
//! already bound. Nothing is re-checked when the invocation runs.
//!
//! # Variants
//!
//! | Variant | Accepts | Callback receives |
//! |---|---|---|
//! | [`TextHandler`] | text matching its pattern(s) | [`Captures`](crate::Captures) |
//! | [`ContentHandler`] | the selected message shape | the payload (photo sizes and best file id, media and file id, ...) |
//! | [`CustomHandler`] | a caller predicate | the context only |
//! | [`FallbackHandler`] | never | invoked by the dispatcher when nothing matched |

mod content;
mod custom;
mod response;
mod text;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use courier_core::{MembershipEvent, MessageContent};

use crate::context::Context;

pub use content::{ContentHandler, select};
pub use custom::{CustomHandler, FallbackHandler};
pub use response::HandleResponse;
pub use text::TextHandler;

/// A bound handler invocation, ready to be spawned.
pub type HandlerFuture = BoxFuture<'static, ()>;

/// A type-erased conditional handler stored in dispatcher and chain lists.
pub type BoxedHandler = Arc<dyn ConditionalHandler>;

/// The shape of message a handler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Text,
    Photo,
    Audio,
    Voice,
    Document,
    Sticker,
    Video,
    Location,
    Reply,
    Forward,
    NewParticipant,
    LeftParticipant,
    NewTitle,
    NewPhoto,
    PhotoDeleted,
    GroupCreated,
    Custom,
    Any,
    Fallback,
}

impl HandlerKind {
    /// The kind a content-specific handler for this payload would have.
    ///
    /// Returns `None` for messages without a payload.
    pub fn of_content(content: &MessageContent) -> Option<Self> {
        let kind = match content {
            MessageContent::Text(_) => Self::Text,
            MessageContent::Photo(_) => Self::Photo,
            MessageContent::Audio(_) => Self::Audio,
            MessageContent::Voice(_) => Self::Voice,
            MessageContent::Document(_) => Self::Document,
            MessageContent::Sticker(_) => Self::Sticker,
            MessageContent::Video(_) => Self::Video,
            MessageContent::Location(_) => Self::Location,
            MessageContent::Membership(event) => match event {
                MembershipEvent::NewParticipant(_) => Self::NewParticipant,
                MembershipEvent::LeftParticipant(_) => Self::LeftParticipant,
                MembershipEvent::NewTitle(_) => Self::NewTitle,
                MembershipEvent::NewPhoto(_) => Self::NewPhoto,
                MembershipEvent::PhotoDeleted => Self::PhotoDeleted,
                MembershipEvent::GroupCreated => Self::GroupCreated,
            },
            MessageContent::Empty => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Photo => "photo",
            Self::Audio => "audio",
            Self::Voice => "voice",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Video => "video",
            Self::Location => "location",
            Self::Reply => "reply",
            Self::Forward => "forward",
            Self::NewParticipant => "new_participant",
            Self::LeftParticipant => "left_participant",
            Self::NewTitle => "new_title",
            Self::NewPhoto => "new_photo",
            Self::PhotoDeleted => "photo_deleted",
            Self::GroupCreated => "group_created",
            Self::Custom => "custom",
            Self::Any => "any",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate+action pair tested against each inbound message.
pub trait ConditionalHandler: Send + Sync + 'static {
    /// The message shape this handler reacts to.
    fn kind(&self) -> HandlerKind;

    /// Returns `true` if [`accept`](Self::accept) would take the message.
    ///
    /// Only the matcher or selector is evaluated; the callback is not touched.
    fn can_run(&self, ctx: &Context) -> bool;

    /// Tests the message and, when it is accepted, binds the invocation.
    ///
    /// The callback is not called until the returned future is first polled,
    /// so none of its code runs on the dispatch path.
    fn accept(&self, ctx: &Arc<Context>) -> Option<HandlerFuture>;
}
