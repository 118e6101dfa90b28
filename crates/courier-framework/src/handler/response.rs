//! Handler return values.
//!
//! A handler's output is turned into outbound traffic through
//! [`HandleResponse`]: returning `()` does nothing, a non-empty `String` is sent
//! back to the originating chat, and `Option`/`Result` unwrap to their inner
//! value (errors are logged).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use courier_core::{OutboundContent, SendRequest};

use crate::context::Context;

/// A trait for types that can handle handler return values.
#[async_trait]
pub trait HandleResponse: Send {
    /// Convert this value into a response.
    async fn into_response(self, ctx: Arc<Context>);
}

/// Implementation for `()` - no response needed.
#[async_trait]
impl HandleResponse for () {
    async fn into_response(self, _ctx: Arc<Context>) {}
}

/// Implementation for `String` - sends it as a reply unless empty.
#[async_trait]
impl HandleResponse for String {
    async fn into_response(self, ctx: Arc<Context>) {
        if self.is_empty() {
            return;
        }
        if let Err(e) = ctx.reply(self).await {
            error!(chat_id = ctx.message().chat_id(), "Failed to send reply: {e}");
        }
    }
}

#[async_trait]
impl HandleResponse for &'static str {
    async fn into_response(self, ctx: Arc<Context>) {
        self.to_string().into_response(ctx).await;
    }
}

/// Implementation for `OutboundContent` - sends it to the originating chat.
#[async_trait]
impl HandleResponse for OutboundContent {
    async fn into_response(self, ctx: Arc<Context>) {
        let request = SendRequest::new(ctx.message().chat_id(), self);
        request.into_response(ctx).await;
    }
}

/// Implementation for `SendRequest` - sends it as is.
#[async_trait]
impl HandleResponse for SendRequest {
    async fn into_response(self, ctx: Arc<Context>) {
        if let Err(e) = ctx.bot().send(self).await {
            error!(chat_id = ctx.message().chat_id(), "Failed to send message: {e}");
        }
    }
}

/// Implementation for `Option<T>` where T implements HandleResponse.
///
/// On Some, the inner value's response is handled. On None, no action is taken.
#[async_trait]
impl<T: HandleResponse> HandleResponse for Option<T> {
    async fn into_response(self, ctx: Arc<Context>) {
        if let Some(t) = self {
            t.into_response(ctx).await;
        }
    }
}

/// Implementation for `Result<T, E>` where T implements HandleResponse.
///
/// On Ok, the inner value's response is handled. On Err, the error is logged.
#[async_trait]
impl<T: HandleResponse, E: std::fmt::Display + Send> HandleResponse for Result<T, E> {
    async fn into_response(self, ctx: Arc<Context>) {
        match self {
            Ok(t) => t.into_response(ctx).await,
            Err(e) => {
                error!(chat_id = ctx.message().chat_id(), "Handler error: {e}");
            }
        }
    }
}
