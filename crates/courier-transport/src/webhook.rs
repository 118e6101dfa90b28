//! Push endpoint for platform updates.
//!
//! The platform POSTs each update as JSON to a secret path. Each decoded
//! update is submitted to the same [`UpdateSink`] the polling loop feeds, so it
//! moves the sequence cursor and goes through the same filtering. Every
//! request is answered `200 OK`, including malformed ones: a non-2xx answer
//! would only make the platform redeliver a payload that will never decode.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use courier_core::{BoxedSink, TransportError, TransportResult, Update, UpdateSink};

/// The secret route for a bot: `path` joined with the token, colon removed.
///
/// `webhook_path("/hook", "123:ABC")` is `/hook/123ABC`.
pub fn webhook_path(path: &str, token: &str) -> String {
    let base = path.trim_end_matches('/');
    let base = if base.starts_with('/') {
        base.to_string()
    } else {
        format!("/{base}")
    };
    let secret = token.replace(':', "");
    if base == "/" {
        return format!("/{secret}");
    }
    format!("{base}/{secret}")
}

/// Builds the webhook router serving `route`.
pub fn router(route: &str, sink: BoxedSink) -> Router {
    Router::new()
        .route(route, post(receive))
        .with_state(sink)
}

async fn receive(State(sink): State<BoxedSink>, body: Bytes) -> impl IntoResponse {
    let update = match serde_json::from_slice::<Update>(&body) {
        Ok(update) => update,
        Err(e) => {
            debug!(error = %e, len = body.len(), "Malformed webhook body dropped");
            return (StatusCode::OK, "ok");
        }
    };

    let update_id = update.update_id;
    let enqueued = sink.submit(update);
    trace!(update_id, enqueued, "Webhook update received");
    (StatusCode::OK, "ok")
}

/// A bound webhook listener, ready to serve.
pub struct WebhookServer {
    listener: TcpListener,
    router: Router,
    route: String,
}

impl WebhookServer {
    /// Binds `addr` and prepares `route`.
    pub async fn bind(
        addr: &str,
        route: impl Into<String>,
        sink: impl UpdateSink,
    ) -> TransportResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let route = route.into();
        let router = router(&route, Arc::new(sink));
        Ok(Self {
            listener,
            router,
            route,
        })
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` is cancelled, then drains in-flight requests.
    pub async fn run(self, shutdown: CancellationToken) -> TransportResult<()> {
        let addr = self.local_addr()?;
        // The route embeds the token; log only its prefix.
        let visible = self.route.rsplit_once('/').map_or("/", |(head, _)| head);
        info!(addr = %addr, route = %format!("{visible}/<token>"), "Webhook server listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;

        info!("Webhook server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    /// Records every submitted update.
    struct ChannelSink(mpsc::UnboundedSender<Update>);

    impl UpdateSink for ChannelSink {
        fn submit(&self, update: Update) -> bool {
            self.0.send(update).is_ok()
        }
    }

    #[test]
    fn test_webhook_path() {
        assert_eq!(webhook_path("/hook", "123:ABC"), "/hook/123ABC");
        assert_eq!(webhook_path("/hook/", "123:ABC"), "/hook/123ABC");
        assert_eq!(webhook_path("hook", "123:ABC"), "/hook/123ABC");
        assert_eq!(webhook_path("/", "123:ABC"), "/123ABC");
    }

    async fn post_body(
        uri: &str,
        body: &'static str,
    ) -> (StatusCode, mpsc::UnboundedReceiver<Update>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = router("/hook/123ABC", Arc::new(ChannelSink(tx)));
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        (response.status(), rx)
    }

    #[tokio::test]
    async fn test_valid_update_is_submitted() {
        let (status, mut rx) = post_body(
            "/hook/123ABC",
            r#"{"update_id":3,"message":{"message_id":9,"date":1,
                "from":{"id":7,"first_name":"A"},"chat":{"id":7},"text":"hi"}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let update = rx.try_recv().unwrap();
        assert_eq!(update.update_id, 3);
        assert_eq!(update.message.as_ref().and_then(|m| m.text()), Some("hi"));
    }

    #[tokio::test]
    async fn test_update_without_message_still_reaches_sink() {
        let (status, mut rx) = post_body("/hook/123ABC", r#"{"update_id":4}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rx.try_recv().unwrap().update_id, 4);
    }

    #[tokio::test]
    async fn test_malformed_body_is_dropped_with_ok() {
        let (status, mut rx) = post_body("/hook/123ABC", r#"{"update_id":"#).await;
        assert_eq!(status, StatusCode::OK);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wrong_route_is_not_served() {
        let (status, mut rx) = post_body("/hook/other", r#"{"update_id":4}"#).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_server_stops_on_cancel() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let server = WebhookServer::bind("127.0.0.1:0", "/hook/x", ChannelSink(tx))
            .await
            .unwrap();
        assert!(server.local_addr().unwrap().port() > 0);

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(server.run(shutdown.clone()));
        shutdown.cancel();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let sink = ChannelSink(mpsc::unbounded_channel().0);
        let err = WebhookServer::bind("not an address", "/hook", sink)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Bind { .. }));
    }
}
