//! The intake pipeline.
//!
//! Polling and the webhook both feed one unbounded queue of messages. A
//! single dispatch loop drains it and runs each message on its own task:
//!
//! ```text
//!  poll_loop ──┐
//!              ├──> mpsc<Message> ──> run_dispatch_loop ──> task per message
//!  webhook  ───┘                                             └─ Dispatcher::dispatch
//! ```
//!
//! The sequence cursor only moves forward. Both sources go through
//! [`IntakeHandle::submit_batch`], and polling asks for `cursor + 1`, so an
//! update acknowledged once is never fetched or dispatched again.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use courier_core::{Message, Update, UpdateSink, UpdateSource};
use courier_framework::Dispatcher;

/// The intake queue together with its sequence cursor.
pub struct Intake {
    handle: IntakeHandle,
    receiver: UnboundedReceiver<Message>,
}

impl Default for Intake {
    fn default() -> Self {
        Self::new()
    }
}

impl Intake {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            handle: IntakeHandle {
                sender,
                cursor: Arc::new(AtomicI64::new(0)),
            },
            receiver,
        }
    }

    /// A producer side of the queue.
    pub fn handle(&self) -> IntakeHandle {
        self.handle.clone()
    }

    /// Splits into a producer handle and the consumer side.
    pub fn split(self) -> (IntakeHandle, UnboundedReceiver<Message>) {
        (self.handle, self.receiver)
    }
}

/// Producer side of the intake queue.
#[derive(Clone)]
pub struct IntakeHandle {
    sender: UnboundedSender<Message>,
    cursor: Arc<AtomicI64>,
}

impl IntakeHandle {
    /// The highest update sequence number seen so far.
    pub fn last_seen(&self) -> i64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// The offset the next poll should request.
    pub fn offset(&self) -> i64 {
        self.last_seen() + 1
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Advances the cursor past `updates` and enqueues their messages.
    ///
    /// The cursor moves before any message is handed off. Updates at or below
    /// the previous cursor have been delivered already and are skipped. Returns
    /// the number of messages enqueued.
    pub fn submit_batch(&self, updates: Vec<Update>) -> usize {
        let Some(max) = updates.iter().map(|u| u.update_id).max() else {
            return 0;
        };
        let previous = self.cursor.fetch_max(max, Ordering::AcqRel);

        let mut enqueued = 0;
        for update in updates {
            let update_id = update.update_id;
            if update_id <= previous {
                trace!(update_id, previous, "Update already delivered, skipping");
                continue;
            }
            let Some(message) = update.into_dispatchable() else {
                trace!(update_id, "Update without a dispatchable message skipped");
                continue;
            };
            if self.sender.send(message).is_err() {
                warn!(update_id, "Intake closed, update dropped");
                break;
            }
            enqueued += 1;
        }
        enqueued
    }

    /// Enqueues a single update.
    pub fn submit(&self, update: Update) -> bool {
        self.submit_batch(vec![update]) == 1
    }
}

impl UpdateSink for IntakeHandle {
    fn submit(&self, update: Update) -> bool {
        IntakeHandle::submit(self, update)
    }
}

/// Polling settings for [`poll_loop`].
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    /// Long-poll timeout passed to the platform.
    pub timeout: Duration,
    /// Pause after a failed poll.
    pub retry_delay: Duration,
}

/// Long-polls `source` until `shutdown` fires or the queue closes.
///
/// Errors never end the loop. The first one also clears any webhook still
/// registered, since the platform refuses to serve polls while one is set.
pub async fn poll_loop(
    source: Arc<dyn UpdateSource>,
    handle: IntakeHandle,
    settings: PollSettings,
    shutdown: CancellationToken,
) {
    info!(timeout = ?settings.timeout, "Polling for updates");
    let mut webhook_cleared = false;

    while !handle.is_closed() {
        let offset = handle.offset();
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = source.get_updates(offset, settings.timeout) => result,
        };

        match result {
            Ok(updates) => {
                let received = updates.len();
                let enqueued = handle.submit_batch(updates);
                if received > 0 {
                    debug!(offset, received, enqueued, "Updates received");
                }
            }
            Err(e) => {
                warn!(error = %e, offset, "Polling failed");
                if !webhook_cleared {
                    webhook_cleared = true;
                    match source.clear_webhook().await {
                        Ok(()) => info!("Cleared webhook so polling can resume"),
                        Err(e) => warn!(error = %e, "Failed to clear webhook"),
                    }
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(settings.retry_delay) => {}
                }
            }
        }
    }
    info!(last_seen = handle.last_seen(), "Polling stopped");
}

/// Drains `receiver`, dispatching each message on its own task.
///
/// Returns once `shutdown` fires or every sender is gone, after the tasks
/// already started have finished. Messages still queued at shutdown have
/// already moved the cursor, so they are dispatched before returning.
pub async fn run_dispatch_loop(
    mut receiver: UnboundedReceiver<Message>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) {
    let tracker = TaskTracker::new();

    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = receiver.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        spawn_message(&tracker, &dispatcher, message);
    }

    receiver.close();
    let mut drained = 0usize;
    while let Ok(message) = receiver.try_recv() {
        spawn_message(&tracker, &dispatcher, message);
        drained += 1;
    }
    if drained > 0 {
        debug!(drained, "Dispatched messages queued at shutdown");
    }

    tracker.close();
    debug!(in_flight = tracker.len(), "Waiting for in-flight messages");
    tracker.wait().await;
}

fn spawn_message(tracker: &TaskTracker, dispatcher: &Dispatcher, message: Message) {
    let dispatcher = dispatcher.clone();
    let message_id = message.message_id;
    let task = tracker.spawn(async move { dispatcher.dispatch(message).join().await });
    // The message task itself only panics if a handler escaped its own
    // task, so the watcher only has a JoinError to report.
    tracker.spawn(async move {
        match task.await {
            Ok(route) => trace!(message_id, ?route, "Message processed"),
            Err(e) => error!(message_id, error = %e, "Message task failed"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use courier_core::{
        ApiError, ApiResult, Bot, ChatAction, MessageContent, SendRequest, User,
    };
    use courier_framework::{DispatcherBuilder, Register};

    fn update(update_id: i64, text: &str) -> Update {
        serde_json::from_value(json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "date": 1,
                "from": { "id": 7, "first_name": "A" },
                "chat": { "id": 7 },
                "text": text,
            }
        }))
        .unwrap()
    }

    fn text_of(message: &Message) -> &str {
        message.text().unwrap_or_default()
    }

    #[test]
    fn test_cursor_advances_before_handoff() {
        let intake = Intake::new();
        let handle = intake.handle();
        let (_, mut rx) = intake.split();

        assert_eq!(handle.offset(), 1);
        assert_eq!(handle.submit_batch(vec![update(3, "a"), update(5, "b")]), 2);
        assert_eq!(handle.last_seen(), 5);
        assert_eq!(handle.offset(), 6);
        assert_eq!(text_of(&rx.try_recv().unwrap()), "a");
        assert_eq!(text_of(&rx.try_recv().unwrap()), "b");
    }

    #[test]
    fn test_stale_updates_are_skipped() {
        let (handle, mut rx) = Intake::new().split();
        handle.submit_batch(vec![update(10, "new")]);
        rx.try_recv().unwrap();

        assert!(!handle.submit(update(9, "old")));
        assert!(!handle.submit(update(10, "again")));
        assert_eq!(handle.last_seen(), 10);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_non_dispatchable_update_moves_cursor() {
        let (handle, mut rx) = Intake::new().split();
        let empty = Update {
            update_id: 4,
            message: None,
        };
        assert!(!handle.submit(empty));
        assert_eq!(handle.last_seen(), 4);
        assert!(rx.try_recv().is_err());
    }

    /// Serves scripted poll results, then blocks like an idle long poll.
    struct ScriptedSource {
        script: Mutex<Vec<ApiResult<Vec<Update>>>>,
        offsets: Mutex<Vec<i64>>,
        clears: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(mut script: Vec<ApiResult<Vec<Update>>>) -> Arc<Self> {
            script.reverse();
            Arc::new(Self {
                script: Mutex::new(script),
                offsets: Mutex::new(Vec::new()),
                clears: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn get_updates(&self, offset: i64, _timeout: Duration) -> ApiResult<Vec<Update>> {
            self.offsets.lock().push(offset);
            let next = self.script.lock().pop();
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }

        async fn clear_webhook(&self) -> ApiResult<()> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings() -> PollSettings {
        PollSettings {
            timeout: Duration::from_secs(60),
            retry_delay: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_recovers_and_clears_webhook_once() {
        let source = ScriptedSource::new(vec![
            Err(ApiError::Timeout),
            Err(ApiError::Timeout),
            Ok(vec![update(1, "one"), update(2, "two")]),
        ]);
        let (handle, mut rx) = Intake::new().split();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            source.clone(),
            handle.clone(),
            settings(),
            shutdown.clone(),
        ));

        assert_eq!(text_of(&rx.recv().await.unwrap()), "one");
        assert_eq!(text_of(&rx.recv().await.unwrap()), "two");
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(source.clears.load(Ordering::SeqCst), 1);
        assert_eq!(*source.offsets.lock(), vec![1, 1, 1, 3]);
        assert_eq!(handle.last_seen(), 2);
    }

    #[tokio::test]
    async fn test_poll_loop_stops_when_queue_closes() {
        let source = ScriptedSource::new(vec![Ok(vec![update(1, "one")])]);
        let (handle, rx) = Intake::new().split();
        drop(rx);
        poll_loop(source.clone(), handle, settings(), CancellationToken::new()).await;
        assert_eq!(source.offsets.lock().len(), 1);
    }

    struct SilentBot {
        me: User,
    }

    #[async_trait]
    impl Bot for SilentBot {
        fn identity(&self) -> &User {
            &self.me
        }

        async fn send(&self, request: SendRequest) -> ApiResult<Message> {
            Err(ApiError::Other(format!("unexpected send to {}", request.chat_id)))
        }

        async fn forward(&self, _chat_id: i64, _from: i64, _message_id: i64) -> ApiResult<Message> {
            Err(ApiError::NotConnected)
        }

        async fn send_chat_action(&self, _chat_id: i64, _action: ChatAction) -> ApiResult<()> {
            Ok(())
        }
    }

    fn counting_dispatcher(seen: &Arc<AtomicUsize>) -> Dispatcher {
        let counter = seen.clone();
        let bot = Arc::new(SilentBot {
            me: User {
                id: 1,
                first_name: "bot".into(),
                last_name: None,
                username: Some("bot".into()),
            },
        });
        DispatcherBuilder::new(bot)
            .on_any(move |_ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_loop_drains_queue() {
        let seen = Arc::new(AtomicUsize::new(0));
        let (handle, rx) = Intake::new().split();
        handle.submit_batch(vec![update(1, "a"), update(2, "b"), update(3, "c")]);
        drop(handle);

        run_dispatch_loop(rx, counting_dispatcher(&seen), CancellationToken::new()).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_queued_messages_are_dispatched_on_shutdown() {
        let seen = Arc::new(AtomicUsize::new(0));
        let (handle, rx) = Intake::new().split();
        handle.submit_batch(vec![update(1, "a"), update(2, "b"), update(3, "c")]);

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        run_dispatch_loop(rx, counting_dispatcher(&seen), shutdown).await;

        assert_eq!(handle.last_seen(), 3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_moves_past_undeliverable_update() {
        let bare = Update {
            update_id: 11,
            message: None,
        };
        let source = ScriptedSource::new(vec![Ok(vec![update(10, "ten"), bare])]);
        let (handle, mut rx) = Intake::new().split();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            source.clone(),
            handle.clone(),
            settings(),
            shutdown.clone(),
        ));

        assert_eq!(text_of(&rx.recv().await.unwrap()), "ten");
        // Let the loop issue its next poll.
        tokio::task::yield_now().await;
        shutdown.cancel();
        task.await.unwrap();

        assert_eq!(handle.last_seen(), 11);
        assert_eq!(*source.offsets.lock(), vec![1, 12]);
    }

    async fn post_update(app: axum::Router, body: String) {
        use tower::ServiceExt;
        let request = axum::http::Request::post("/hook/1x")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_webhook_updates_share_the_cursor() {
        let (handle, mut rx) = Intake::new().split();
        let app = courier_transport::webhook::router("/hook/1x", Arc::new(handle.clone()));
        let body = |id: i64| serde_json::to_string(&update(id, "pushed")).unwrap();

        post_update(app.clone(), body(8)).await;
        assert_eq!(handle.last_seen(), 8);
        assert_eq!(text_of(&rx.try_recv().unwrap()), "pushed");

        // A redelivered or older update is not dispatched twice.
        post_update(app.clone(), body(8)).await;
        post_update(app, body(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.offset(), 9);
    }

    #[test]
    fn test_message_content_is_text() {
        let message = update(1, "hello").into_dispatchable().unwrap();
        assert!(matches!(message.content, MessageContent::Text(_)));
    }
}
