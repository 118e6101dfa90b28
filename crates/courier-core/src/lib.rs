//! # Courier Core
//!
//! Shared vocabulary of the Courier framework:
//!
//! - The inbound data model ([`Message`], [`MessageContent`], [`Update`])
//! - Outbound request types ([`SendRequest`], [`FileSource`], [`ReplyMarkup`])
//! - Bot-wide [`DefaultOptions`]
//! - The collaborator traits [`Bot`], [`UpdateSource`] and [`UpdateSink`]
//! - Error types shared by every layer

pub mod bot;
pub mod error;
pub mod model;
pub mod send;

pub use bot::{Bot, BoxedBot, BoxedSink, UpdateSink, UpdateSource};
pub use error::{ApiError, ApiResult, TransportError, TransportResult};
pub use model::{
    Audio, Chat, Document, Forward, Location, MembershipEvent, Message, MessageContent,
    PhotoSize, Sticker, Update, User, Video, Voice, largest_photo,
};
pub use send::{
    ChatAction, DefaultOptions, FileSource, ForceReply, KeyboardHide, KeyboardMarkup,
    OutboundContent, ParseMode, ReplyMarkup, SendRequest,
};
