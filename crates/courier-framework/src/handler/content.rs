use std::sync::Arc;

use courier_core::Message;

use super::{ConditionalHandler, HandleResponse, HandlerFuture, HandlerKind};
use crate::context::Context;

/// Extracts a handler payload from a message.
pub type Selector<T> = fn(&Message) -> Option<T>;

/// Runs a callback on messages of one shape, passing the extracted payload.
pub struct ContentHandler<T, F> {
    kind: HandlerKind,
    select: Selector<T>,
    callback: Arc<F>,
}

impl<T, F> ContentHandler<T, F> {
    pub fn new(kind: HandlerKind, select: Selector<T>, callback: F) -> Self {
        Self {
            kind,
            select,
            callback: Arc::new(callback),
        }
    }
}

impl<T, F, Fut> ConditionalHandler for ContentHandler<T, F>
where
    T: Send + 'static,
    F: Fn(Arc<Context>, T) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandleResponse + 'static,
{
    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn can_run(&self, ctx: &Context) -> bool {
        (self.select)(ctx.message()).is_some()
    }

    fn accept(&self, ctx: &Arc<Context>) -> Option<HandlerFuture> {
        let payload = (self.select)(ctx.message())?;
        let callback = Arc::clone(&self.callback);
        let ctx = Arc::clone(ctx);
        Some(Box::pin(async move {
            callback(Arc::clone(&ctx), payload)
                .await
                .into_response(ctx)
                .await;
        }))
    }
}

/// Payload selectors for the built-in content handlers.
pub mod select {
    use courier_core::{
        Audio, Document, MembershipEvent, Message, MessageContent, PhotoSize, Sticker, User,
        Video, Voice, largest_photo,
    };

    /// All photo sizes plus the file id of the largest one.
    pub fn photo(msg: &Message) -> Option<(Vec<PhotoSize>, String)> {
        let MessageContent::Photo(sizes) = &msg.content else {
            return None;
        };
        let best = largest_photo(sizes)?.file_id.clone();
        Some((sizes.clone(), best))
    }

    pub fn audio(msg: &Message) -> Option<(Audio, String)> {
        match &msg.content {
            MessageContent::Audio(a) => Some((a.clone(), a.file_id.clone())),
            _ => None,
        }
    }

    pub fn voice(msg: &Message) -> Option<(Voice, String)> {
        match &msg.content {
            MessageContent::Voice(v) => Some((v.clone(), v.file_id.clone())),
            _ => None,
        }
    }

    pub fn document(msg: &Message) -> Option<(Document, String)> {
        match &msg.content {
            MessageContent::Document(d) => Some((d.clone(), d.file_id.clone())),
            _ => None,
        }
    }

    pub fn sticker(msg: &Message) -> Option<(Sticker, String)> {
        match &msg.content {
            MessageContent::Sticker(s) => Some((s.clone(), s.file_id.clone())),
            _ => None,
        }
    }

    pub fn video(msg: &Message) -> Option<(Video, String)> {
        match &msg.content {
            MessageContent::Video(v) => Some((v.clone(), v.file_id.clone())),
            _ => None,
        }
    }

    /// Latitude and longitude.
    pub fn location(msg: &Message) -> Option<(f64, f64)> {
        match &msg.content {
            MessageContent::Location(l) => Some((l.latitude, l.longitude)),
            _ => None,
        }
    }

    /// The replied-to message.
    pub fn reply(msg: &Message) -> Option<Message> {
        msg.reply_to.as_deref().cloned()
    }

    /// The original author and date of a forward.
    pub fn forward(msg: &Message) -> Option<(User, i64)> {
        msg.forward.as_ref().map(|f| (f.from.clone(), f.date))
    }

    fn membership(msg: &Message) -> Option<&MembershipEvent> {
        match &msg.content {
            MessageContent::Membership(event) => Some(event),
            _ => None,
        }
    }

    pub fn new_participant(msg: &Message) -> Option<(i64, User)> {
        match membership(msg)? {
            MembershipEvent::NewParticipant(u) => Some((msg.chat_id(), u.clone())),
            _ => None,
        }
    }

    pub fn left_participant(msg: &Message) -> Option<(i64, User)> {
        match membership(msg)? {
            MembershipEvent::LeftParticipant(u) => Some((msg.chat_id(), u.clone())),
            _ => None,
        }
    }

    pub fn new_title(msg: &Message) -> Option<(i64, String)> {
        match membership(msg)? {
            MembershipEvent::NewTitle(t) => Some((msg.chat_id(), t.clone())),
            _ => None,
        }
    }

    pub fn new_photo(msg: &Message) -> Option<(i64, Vec<PhotoSize>)> {
        match membership(msg)? {
            MembershipEvent::NewPhoto(p) => Some((msg.chat_id(), p.clone())),
            _ => None,
        }
    }

    pub fn photo_deleted(msg: &Message) -> Option<i64> {
        matches!(membership(msg)?, MembershipEvent::PhotoDeleted).then(|| msg.chat_id())
    }

    pub fn group_created(msg: &Message) -> Option<i64> {
        matches!(membership(msg)?, MembershipEvent::GroupCreated).then(|| msg.chat_id())
    }
}
