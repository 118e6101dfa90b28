//! Inbound data model.
//!
//! The platform delivers messages as a flat object in which every kind of
//! payload (text, photo, audio, and so on) is a separate optional field. This
//! module decodes that shape into [`Message`], whose payload is a single
//! [`MessageContent`] variant, so handlers match on one enum instead of probing
//! a dozen optional fields.
//!
//! # Hierarchy
//!
//! ```text
//! Update { update_id, message? }
//! └── Message { message_id, from, date, chat, reply_to?, forward?, content }
//!     └── MessageContent
//!         ├── Text / Photo / Audio / Voice / Document / Sticker / Video / Location
//!         ├── Membership(MembershipEvent)
//!         └── Empty
//! ```

use serde::{Deserialize, Serialize};

// ============================================================================
// Identities
// ============================================================================

/// A platform user (or bot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID.
    pub id: i64,
    /// First name.
    pub first_name: String,
    /// Last name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Username, without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// The chat a message belongs to: a private conversation or a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat ID. Private chats share the peer's user ID.
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Group title. Absent for private chats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Chat {
    /// Returns `true` if this chat is a group.
    pub fn is_group(&self) -> bool {
        self.title.is_some()
    }
}

// ============================================================================
// Media
// ============================================================================

/// One size variant of a photo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl PhotoSize {
    /// Pixel area of this variant.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Returns the variant with the largest pixel area.
///
/// Ties keep the earlier variant.
pub fn largest_photo(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes
        .iter()
        .fold(None, |best: Option<&PhotoSize>, size| match best {
            Some(b) if b.area() >= size.area() => Some(b),
            _ => Some(size),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audio {
    pub file_id: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub file_id: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<PhotoSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sticker {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    /// Thumbnail in .webp or .jpg format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<PhotoSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub duration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<PhotoSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub longitude: f64,
    pub latitude: f64,
}

// ============================================================================
// Message
// ============================================================================

/// A chat-membership change reported as a service message.
#[derive(Debug, Clone, PartialEq)]
pub enum MembershipEvent {
    NewParticipant(User),
    LeftParticipant(User),
    NewTitle(String),
    NewPhoto(Vec<PhotoSize>),
    PhotoDeleted,
    GroupCreated,
}

/// The payload of a message. The platform sends at most one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    /// All size variants of one photo, as delivered. Never empty.
    Photo(Vec<PhotoSize>),
    Audio(Audio),
    Voice(Voice),
    Document(Document),
    Sticker(Sticker),
    Video(Video),
    Location(Location),
    Membership(MembershipEvent),
    /// A message with no payload this crate understands.
    Empty,
}

/// Forwarding metadata of a forwarded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    /// The original author.
    pub from: User,
    /// Unix time the original was sent.
    pub date: i64,
}

/// An inbound message.
///
/// Messages are decoded once by the intake and only mutated by the single
/// normalization pass before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireMessage", into = "WireMessage")]
pub struct Message {
    pub message_id: i64,
    pub from: User,
    /// Unix time the message was sent.
    pub date: i64,
    pub chat: Chat,
    pub forward: Option<Forward>,
    pub reply_to: Option<Box<Message>>,
    pub content: MessageContent,
}

impl Message {
    /// Returns the text of a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Mutable access to the text of a text message.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match &mut self.content {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// ID of the chat this message was posted in.
    pub fn chat_id(&self) -> i64 {
        self.chat.id
    }

    /// ID of the sender.
    pub fn sender_id(&self) -> i64 {
        self.from.id
    }
}

/// One entry of the platform's update feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonically increasing sequence number.
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl Update {
    /// Returns the message if this update is dispatchable.
    ///
    /// Only updates with a positive sequence number that carry a message with
    /// a positive identifier are processed.
    pub fn into_dispatchable(self) -> Option<Message> {
        if self.update_id <= 0 {
            return None;
        }
        self.message.filter(|m| m.message_id > 0)
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// The flat on-the-wire message shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    message_id: i64,
    from: User,
    date: i64,
    chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    forward_from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    forward_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reply_to_message: Option<Box<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio: Option<Audio>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    voice: Option<Voice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    document: Option<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    photo: Option<Vec<PhotoSize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sticker: Option<Sticker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    video: Option<Video>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_chat_participant: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    left_chat_participant: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_chat_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_chat_photo: Option<Vec<PhotoSize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete_chat_photo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group_chat_created: Option<bool>,
}

impl WireMessage {
    fn take_content(&mut self) -> MessageContent {
        if let Some(text) = self.text.take() {
            return MessageContent::Text(text);
        }
        if let Some(photo) = self.photo.take().filter(|p| !p.is_empty()) {
            return MessageContent::Photo(photo);
        }
        if let Some(audio) = self.audio.take() {
            return MessageContent::Audio(audio);
        }
        if let Some(voice) = self.voice.take() {
            return MessageContent::Voice(voice);
        }
        if let Some(document) = self.document.take() {
            return MessageContent::Document(document);
        }
        if let Some(sticker) = self.sticker.take() {
            return MessageContent::Sticker(sticker);
        }
        if let Some(video) = self.video.take() {
            return MessageContent::Video(video);
        }
        if let Some(location) = self.location.take() {
            return MessageContent::Location(location);
        }

        let membership = if let Some(user) = self.new_chat_participant.take() {
            MembershipEvent::NewParticipant(user)
        } else if let Some(user) = self.left_chat_participant.take() {
            MembershipEvent::LeftParticipant(user)
        } else if let Some(title) = self.new_chat_title.take() {
            MembershipEvent::NewTitle(title)
        } else if let Some(photo) = self.new_chat_photo.take() {
            MembershipEvent::NewPhoto(photo)
        } else if self.delete_chat_photo == Some(true) {
            MembershipEvent::PhotoDeleted
        } else if self.group_chat_created == Some(true) {
            MembershipEvent::GroupCreated
        } else {
            return MessageContent::Empty;
        };
        MessageContent::Membership(membership)
    }
}

impl From<WireMessage> for Message {
    fn from(mut wire: WireMessage) -> Self {
        let content = wire.take_content();
        let forward = match (wire.forward_from, wire.forward_date) {
            (Some(from), Some(date)) => Some(Forward { from, date }),
            _ => None,
        };

        Self {
            message_id: wire.message_id,
            from: wire.from,
            date: wire.date,
            chat: wire.chat,
            forward,
            reply_to: wire.reply_to_message,
            content,
        }
    }
}

impl From<Message> for WireMessage {
    fn from(msg: Message) -> Self {
        let (forward_from, forward_date) = match msg.forward {
            Some(f) => (Some(f.from), Some(f.date)),
            None => (None, None),
        };

        let mut wire = WireMessage {
            message_id: msg.message_id,
            from: msg.from,
            date: msg.date,
            chat: msg.chat,
            forward_from,
            forward_date,
            reply_to_message: msg.reply_to,
            text: None,
            audio: None,
            voice: None,
            document: None,
            photo: None,
            sticker: None,
            video: None,
            location: None,
            new_chat_participant: None,
            left_chat_participant: None,
            new_chat_title: None,
            new_chat_photo: None,
            delete_chat_photo: None,
            group_chat_created: None,
        };

        match msg.content {
            MessageContent::Text(t) => wire.text = Some(t),
            MessageContent::Photo(p) => wire.photo = Some(p),
            MessageContent::Audio(a) => wire.audio = Some(a),
            MessageContent::Voice(v) => wire.voice = Some(v),
            MessageContent::Document(d) => wire.document = Some(d),
            MessageContent::Sticker(s) => wire.sticker = Some(s),
            MessageContent::Video(v) => wire.video = Some(v),
            MessageContent::Location(l) => wire.location = Some(l),
            MessageContent::Membership(event) => match event {
                MembershipEvent::NewParticipant(u) => wire.new_chat_participant = Some(u),
                MembershipEvent::LeftParticipant(u) => wire.left_chat_participant = Some(u),
                MembershipEvent::NewTitle(t) => wire.new_chat_title = Some(t),
                MembershipEvent::NewPhoto(p) => wire.new_chat_photo = Some(p),
                MembershipEvent::PhotoDeleted => wire.delete_chat_photo = Some(true),
                MembershipEvent::GroupCreated => wire.group_chat_created = Some(true),
            },
            MessageContent::Empty => {}
        }

        wire
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "message_id": 7,
            "from": { "id": 42, "first_name": "Ada", "username": "ada" },
            "date": 1_450_000_000,
            "chat": { "id": 42, "first_name": "Ada" }
        })
    }

    fn with(field: &str, value: serde_json::Value) -> Message {
        let mut raw = base();
        raw[field] = value;
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_text_message_decodes_to_text_content() {
        let msg = with("text", json!("/start"));
        assert_eq!(msg.text(), Some("/start"));
        assert_eq!(msg.sender_id(), 42);
        assert!(!msg.chat.is_group());
    }

    #[test]
    fn test_empty_photo_list_is_not_photo_content() {
        let msg = with("photo", json!([]));
        assert_eq!(msg.content, MessageContent::Empty);
    }

    #[test]
    fn test_membership_fields_decode() {
        let msg = with("group_chat_created", json!(true));
        assert_eq!(
            msg.content,
            MessageContent::Membership(MembershipEvent::GroupCreated)
        );

        let msg = with("left_chat_participant", json!({ "id": 5, "first_name": "Bo" }));
        assert!(matches!(
            msg.content,
            MessageContent::Membership(MembershipEvent::LeftParticipant(ref u)) if u.id == 5
        ));
    }

    #[test]
    fn test_forward_requires_both_fields() {
        let msg = with("forward_from", json!({ "id": 9, "first_name": "Cy" }));
        assert!(msg.forward.is_none());

        let mut raw = base();
        raw["forward_from"] = json!({ "id": 9, "first_name": "Cy" });
        raw["forward_date"] = json!(1_449_999_999);
        let msg: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.forward.map(|f| f.date), Some(1_449_999_999));
    }

    #[test]
    fn test_largest_photo_uses_area() {
        let sizes = vec![
            PhotoSize { file_id: "small".into(), width: 90, height: 90, file_size: None },
            PhotoSize { file_id: "wide".into(), width: 800, height: 100, file_size: None },
            PhotoSize { file_id: "big".into(), width: 320, height: 320, file_size: None },
        ];
        assert_eq!(largest_photo(&sizes).map(|p| p.file_id.as_str()), Some("big"));
        assert!(largest_photo(&[]).is_none());
    }

    #[test]
    fn test_update_filtering() {
        let msg = with("text", json!("hi"));
        let ok = Update { update_id: 1, message: Some(msg.clone()) };
        assert!(ok.into_dispatchable().is_some());

        let zero = Update { update_id: 0, message: Some(msg.clone()) };
        assert!(zero.into_dispatchable().is_none());

        let mut bad = msg;
        bad.message_id = 0;
        let bad = Update { update_id: 3, message: Some(bad) };
        assert!(bad.into_dispatchable().is_none());
    }

    #[test]
    fn test_reply_to_is_nested_message() {
        let mut inner = base();
        inner["text"] = json!("original");
        let msg = with("reply_to_message", inner);
        assert_eq!(msg.reply_to.as_ref().and_then(|m| m.text()), Some("original"));
    }
}
