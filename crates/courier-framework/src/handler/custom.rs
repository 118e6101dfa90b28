use std::sync::Arc;

use super::{ConditionalHandler, HandlerFuture, HandlerKind};
use crate::context::Context;

/// A caller-supplied predicate and action. No implicit reply is sent.
pub struct CustomHandler<P, F> {
    kind: HandlerKind,
    predicate: P,
    action: Arc<F>,
}

impl<P, F> CustomHandler<P, F> {
    pub fn new(predicate: P, action: F) -> Self {
        Self {
            kind: HandlerKind::Custom,
            predicate,
            action: Arc::new(action),
        }
    }
}

impl<F> CustomHandler<fn(&Context) -> bool, F> {
    /// A handler that accepts every message.
    pub fn any(action: F) -> Self {
        fn always(_: &Context) -> bool {
            true
        }
        Self {
            kind: HandlerKind::Any,
            predicate: always,
            action: Arc::new(action),
        }
    }
}

impl<P, F, Fut> ConditionalHandler for CustomHandler<P, F>
where
    P: Fn(&Context) -> bool + Send + Sync + 'static,
    F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn can_run(&self, ctx: &Context) -> bool {
        (self.predicate)(ctx)
    }

    fn accept(&self, ctx: &Arc<Context>) -> Option<HandlerFuture> {
        if !self.can_run(ctx) {
            return None;
        }
        let action = Arc::clone(&self.action);
        let ctx = Arc::clone(ctx);
        Some(Box::pin(async move { action(ctx).await }))
    }
}

/// Runs only when no other top-level handler matched a message.
///
/// Never accepted through normal matching; the dispatcher calls
/// [`invoke`](Self::invoke) directly.
#[derive(Clone)]
pub struct FallbackHandler {
    action: Arc<dyn Fn(Arc<Context>) -> HandlerFuture + Send + Sync>,
}

impl FallbackHandler {
    pub fn new<F, Fut>(action: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            action: Arc::new(move |ctx| Box::pin(action(ctx))),
        }
    }

    pub fn invoke(&self, ctx: Arc<Context>) -> HandlerFuture {
        (self.action)(ctx)
    }
}

impl ConditionalHandler for FallbackHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Fallback
    }

    fn can_run(&self, _ctx: &Context) -> bool {
        false
    }

    fn accept(&self, _ctx: &Arc<Context>) -> Option<HandlerFuture> {
        None
    }
}
