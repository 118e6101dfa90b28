use std::sync::Arc;

use tracing::trace;

use super::{ConditionalHandler, HandleResponse, HandlerFuture, HandlerKind};
use crate::context::Context;
use crate::pattern::{Captures, TextMatch};

/// Runs a callback on text messages matching a [`TextMatch`].
///
/// The captures passed to the callback come from the same evaluation that
/// accepted the message. A non-empty `String` returned by the callback is
/// sent back to the originating chat.
pub struct TextHandler<M, F> {
    matcher: M,
    callback: Arc<F>,
}

impl<M, F> TextHandler<M, F> {
    pub fn new(matcher: M, callback: F) -> Self {
        Self {
            matcher,
            callback: Arc::new(callback),
        }
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }
}

impl<M, F, Fut> ConditionalHandler for TextHandler<M, F>
where
    M: TextMatch + std::fmt::Display,
    F: Fn(Arc<Context>, Captures) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: HandleResponse + 'static,
{
    fn kind(&self) -> HandlerKind {
        HandlerKind::Text
    }

    fn can_run(&self, ctx: &Context) -> bool {
        ctx.text().is_some_and(|text| self.matcher.is_match(text))
    }

    fn accept(&self, ctx: &Arc<Context>) -> Option<HandlerFuture> {
        let text = ctx.text()?;
        let Some(captures) = self.matcher.captures(text) else {
            trace!(pattern = %self.matcher, "Pattern did not match");
            return None;
        };

        let callback = Arc::clone(&self.callback);
        let ctx = Arc::clone(ctx);
        Some(Box::pin(async move {
            callback(Arc::clone(&ctx), captures)
                .await
                .into_response(ctx)
                .await;
        }))
    }
}
