//! Outbound request types.
//!
//! A [`SendRequest`] describes one outbound message: the target chat, an
//! [`OutboundContent`] payload, and optional reply id and reply markup.
//! Files are referenced through [`FileSource`], which decides whether the
//! transport sends a plain JSON body or a multipart upload.
//!
//! Bot-wide defaults from [`DefaultOptions`] are merged with
//! [`SendRequest::apply_defaults`]: a default only fills a field the caller
//! left empty.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Options
// ============================================================================

/// Bot-wide behavior switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultOptions {
    /// Strip a leading `@botname` mention before matching.
    #[serde(default = "default_true")]
    pub strip_mention_prefix: bool,

    /// After stripping a mention, treat the rest as a command even without `/`.
    #[serde(default = "default_true")]
    pub allow_command_without_slash: bool,

    /// Lower-case message text before matching.
    #[serde(default)]
    pub lowercase_text: bool,

    /// Default for `disable_web_page_preview` on text messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_link_preview: Option<bool>,

    /// Default for `selective` on every reply markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,

    /// Default for `one_time_keyboard` on custom keyboards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_time_keyboard: Option<bool>,

    /// Catch handler panics inside the handler task.
    #[serde(default = "default_true")]
    pub recover_panic: bool,
}

impl Default for DefaultOptions {
    fn default() -> Self {
        Self {
            strip_mention_prefix: true,
            allow_command_without_slash: true,
            lowercase_text: false,
            disable_link_preview: None,
            selective: None,
            one_time_keyboard: None,
            recover_panic: true,
        }
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Small enums
// ============================================================================

/// Text formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    Markdown,
    #[serde(rename = "HTML")]
    Html,
}

/// A status shown in the chat while the bot prepares a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    Typing,
    UploadPhoto,
    RecordVideo,
    UploadVideo,
    RecordAudio,
    UploadAudio,
    UploadDocument,
    FindLocation,
}

impl ChatAction {
    /// The wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typing => "typing",
            Self::UploadPhoto => "upload_photo",
            Self::RecordVideo => "record_video",
            Self::UploadVideo => "upload_video",
            Self::RecordAudio => "record_audio",
            Self::UploadAudio => "upload_audio",
            Self::UploadDocument => "upload_document",
            Self::FindLocation => "find_location",
        }
    }
}

impl std::fmt::Display for ChatAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Files
// ============================================================================

/// Where the bytes of an outbound file come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file already stored on the platform.
    ById(String),
    /// A local file, uploaded as multipart.
    ByPath(PathBuf),
    /// In-memory bytes, uploaded as multipart under `filename`.
    ByBytes { bytes: Vec<u8>, filename: String },
}

impl FileSource {
    /// Returns `true` if sending this source needs a multipart upload.
    pub fn needs_upload(&self) -> bool {
        !matches!(self, Self::ById(_))
    }
}

impl From<&str> for FileSource {
    fn from(id: &str) -> Self {
        Self::ById(id.to_string())
    }
}

impl From<String> for FileSource {
    fn from(id: String) -> Self {
        Self::ById(id)
    }
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        Self::ByPath(path)
    }
}

// ============================================================================
// Reply markup
// ============================================================================

/// A custom reply keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyboardMarkup {
    /// Rows of button labels.
    pub keyboard: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize_keyboard: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_time_keyboard: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,
}

impl KeyboardMarkup {
    /// Creates a keyboard from rows of labels.
    pub fn new<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keyboard: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            ..Default::default()
        }
    }

    pub fn resize(mut self, resize: bool) -> Self {
        self.resize_keyboard = Some(resize);
        self
    }

    pub fn one_time(mut self, one_time: bool) -> Self {
        self.one_time_keyboard = Some(one_time);
        self
    }

    pub fn selective(mut self, selective: bool) -> Self {
        self.selective = Some(selective);
        self
    }
}

/// Removes a custom keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyboardHide {
    hide_keyboard: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,
}

impl KeyboardHide {
    pub fn new() -> Self {
        Self {
            hide_keyboard: true,
            selective: None,
        }
    }
}

impl Default for KeyboardHide {
    fn default() -> Self {
        Self::new()
    }
}

/// Asks the client to open a reply interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceReply {
    force_reply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selective: Option<bool>,
}

impl ForceReply {
    pub fn new() -> Self {
        Self {
            force_reply: true,
            selective: None,
        }
    }
}

impl Default for ForceReply {
    fn default() -> Self {
        Self::new()
    }
}

/// Reply markup attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyMarkup {
    Keyboard(KeyboardMarkup),
    Hide(KeyboardHide),
    ForceReply(ForceReply),
}

impl ReplyMarkup {
    fn apply_defaults(&mut self, defaults: &DefaultOptions) {
        match self {
            Self::Keyboard(k) => {
                fill(&mut k.one_time_keyboard, defaults.one_time_keyboard);
                fill(&mut k.selective, defaults.selective);
            }
            Self::Hide(h) => fill(&mut h.selective, defaults.selective),
            Self::ForceReply(f) => fill(&mut f.selective, defaults.selective),
        }
    }
}

fn fill(slot: &mut Option<bool>, default: Option<bool>) {
    if slot.is_none() {
        *slot = default;
    }
}

// ============================================================================
// Content and request
// ============================================================================

/// The payload of an outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundContent {
    Text {
        text: String,
        parse_mode: Option<ParseMode>,
        disable_web_page_preview: Option<bool>,
    },
    Photo {
        photo: FileSource,
        caption: Option<String>,
    },
    Audio {
        audio: FileSource,
        duration: Option<u32>,
        performer: Option<String>,
        title: Option<String>,
    },
    Voice {
        voice: FileSource,
        duration: Option<u32>,
    },
    Document {
        document: FileSource,
    },
    Sticker {
        sticker: FileSource,
    },
    Video {
        video: FileSource,
        duration: Option<u32>,
        caption: Option<String>,
    },
    Location {
        latitude: f64,
        longitude: f64,
    },
}

impl OutboundContent {
    /// Plain text with no formatting options.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            parse_mode: None,
            disable_web_page_preview: None,
        }
    }

    /// The API method that delivers this content.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Text { .. } => "sendMessage",
            Self::Photo { .. } => "sendPhoto",
            Self::Audio { .. } => "sendAudio",
            Self::Voice { .. } => "sendVoice",
            Self::Document { .. } => "sendDocument",
            Self::Sticker { .. } => "sendSticker",
            Self::Video { .. } => "sendVideo",
            Self::Location { .. } => "sendLocation",
        }
    }

    /// The file field name and its source, for file-carrying content.
    pub fn file(&self) -> Option<(&'static str, &FileSource)> {
        match self {
            Self::Photo { photo, .. } => Some(("photo", photo)),
            Self::Audio { audio, .. } => Some(("audio", audio)),
            Self::Voice { voice, .. } => Some(("voice", voice)),
            Self::Document { document } => Some(("document", document)),
            Self::Sticker { sticker } => Some(("sticker", sticker)),
            Self::Video { video, .. } => Some(("video", video)),
            Self::Text { .. } | Self::Location { .. } => None,
        }
    }

    fn write_fields(&self, fields: &mut Map<String, Value>) {
        fn put<T: Serialize>(fields: &mut Map<String, Value>, key: &str, value: &Option<T>) {
            if let Some(v) = value
                && let Ok(v) = serde_json::to_value(v)
            {
                fields.insert(key.to_string(), v);
            }
        }

        match self {
            Self::Text {
                text,
                parse_mode,
                disable_web_page_preview,
            } => {
                fields.insert("text".into(), Value::from(text.as_str()));
                put(fields, "parse_mode", parse_mode);
                put(fields, "disable_web_page_preview", disable_web_page_preview);
            }
            Self::Photo { caption, .. } => put(fields, "caption", caption),
            Self::Audio {
                duration,
                performer,
                title,
                ..
            } => {
                put(fields, "duration", duration);
                put(fields, "performer", performer);
                put(fields, "title", title);
            }
            Self::Voice { duration, .. } => put(fields, "duration", duration),
            Self::Document { .. } | Self::Sticker { .. } => {}
            Self::Video {
                duration, caption, ..
            } => {
                put(fields, "duration", duration);
                put(fields, "caption", caption);
            }
            Self::Location {
                latitude,
                longitude,
            } => {
                fields.insert("latitude".into(), Value::from(*latitude));
                fields.insert("longitude".into(), Value::from(*longitude));
            }
        }

        if let Some((name, FileSource::ById(id))) = self.file() {
            fields.insert(name.to_string(), Value::from(id.as_str()));
        }
    }
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub chat_id: i64,
    pub content: OutboundContent,
    pub reply_to_message_id: Option<i64>,
    pub reply_markup: Option<ReplyMarkup>,
}

impl SendRequest {
    pub fn new(chat_id: i64, content: OutboundContent) -> Self {
        Self {
            chat_id,
            content,
            reply_to_message_id: None,
            reply_markup: None,
        }
    }

    /// Plain text to `chat_id`.
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self::new(chat_id, OutboundContent::text(text))
    }

    /// Fills every unset option with its bot-wide default.
    pub fn apply_defaults(&mut self, defaults: &DefaultOptions) {
        if let OutboundContent::Text {
            disable_web_page_preview,
            ..
        } = &mut self.content
        {
            fill(disable_web_page_preview, defaults.disable_link_preview);
        }
        if let Some(markup) = &mut self.reply_markup {
            markup.apply_defaults(defaults);
        }
    }

    /// The request parameters, excluding an uploaded file.
    ///
    /// A file referenced by id is included as a plain field.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("chat_id".into(), Value::from(self.chat_id));
        self.content.write_fields(&mut fields);
        if let Some(id) = self.reply_to_message_id {
            fields.insert("reply_to_message_id".into(), Value::from(id));
        }
        if let Some(markup) = &self.reply_markup
            && let Ok(v) = serde_json::to_value(markup)
        {
            fields.insert("reply_markup".into(), v);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_fill_only_absent_fields() {
        let defaults = DefaultOptions {
            disable_link_preview: Some(true),
            selective: Some(true),
            one_time_keyboard: Some(true),
            ..Default::default()
        };

        let mut req = SendRequest::text(1, "hi");
        req.reply_markup = Some(ReplyMarkup::Keyboard(
            KeyboardMarkup::new([["a", "b"]]).one_time(false),
        ));
        req.apply_defaults(&defaults);

        let fields = req.to_fields();
        assert_eq!(fields["disable_web_page_preview"], json!(true));
        assert_eq!(fields["reply_markup"]["one_time_keyboard"], json!(false));
        assert_eq!(fields["reply_markup"]["selective"], json!(true));
    }

    #[test]
    fn test_explicit_preview_flag_wins() {
        let defaults = DefaultOptions {
            disable_link_preview: Some(true),
            ..Default::default()
        };
        let mut req = SendRequest::new(
            1,
            OutboundContent::Text {
                text: "x".into(),
                parse_mode: Some(ParseMode::Html),
                disable_web_page_preview: Some(false),
            },
        );
        req.apply_defaults(&defaults);

        let fields = req.to_fields();
        assert_eq!(fields["disable_web_page_preview"], json!(false));
        assert_eq!(fields["parse_mode"], json!("HTML"));
    }

    #[test]
    fn test_hide_and_force_reply_serialize_marker() {
        let hide = serde_json::to_value(ReplyMarkup::Hide(KeyboardHide::new())).unwrap();
        assert_eq!(hide, json!({ "hide_keyboard": true }));

        let force = serde_json::to_value(ReplyMarkup::ForceReply(ForceReply::new())).unwrap();
        assert_eq!(force, json!({ "force_reply": true }));
    }

    #[test]
    fn test_file_by_id_is_a_plain_field() {
        let req = SendRequest::new(
            5,
            OutboundContent::Photo {
                photo: "AgAD".into(),
                caption: Some("cat".into()),
            },
        );
        let fields = req.to_fields();
        assert_eq!(fields["photo"], json!("AgAD"));
        assert_eq!(fields["caption"], json!("cat"));
        assert_eq!(req.content.method(), "sendPhoto");
        assert!(!req.content.file().unwrap().1.needs_upload());
    }

    #[test]
    fn test_uploaded_file_is_not_in_fields() {
        let req = SendRequest::new(
            5,
            OutboundContent::Document {
                document: FileSource::ByBytes {
                    bytes: b"hello".to_vec(),
                    filename: "a.txt".into(),
                },
            },
        );
        assert!(!req.to_fields().contains_key("document"));
    }

    #[test]
    fn test_chat_action_wire_names() {
        assert_eq!(ChatAction::UploadPhoto.as_str(), "upload_photo");
        assert_eq!(
            serde_json::to_value(ChatAction::FindLocation).unwrap(),
            json!("find_location")
        );
    }
}
