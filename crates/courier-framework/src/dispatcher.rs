//! Message dispatcher for the Courier framework.
//!
//! The [`Dispatcher`] receives inbound messages and distributes them to the
//! registered chains and handlers. For each message:
//!
//! 1. The text is normalized (mention stripping, implicit slash, lower-casing).
//! 2. Chains are offered the message in registration order. The first chain
//!    that claims it (the user is tracked, or stage 0 accepts) handles it and
//!    dispatch stops.
//! 3. Otherwise every top-level handler that accepts the message runs
//!    (fan-out, not first-match).
//! 4. If nothing accepted the message, the fallback handlers run.
//!
//! Every accepted invocation runs on its own task, bounded by a shared
//! concurrency ceiling. A panicking handler never takes the dispatcher down.
//!
//! ```rust,ignore
//! use courier_framework::{DispatcherBuilder, Register};
//!
//! let dispatcher = DispatcherBuilder::new(bot)
//!     .simple_command("start", |_ctx, _text| async { "Hello!" })
//!     .on_any(|ctx| async move { tracing::info!(chat_id = ctx.message().chat_id(), "seen") })
//!     .build()?;
//!
//! dispatcher.dispatch(message).join().await;
//! ```

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::Poll;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, debug, debug_span, error, span, trace};

use courier_core::{BoxedBot, Message};

use crate::chain::{Chain, ChainRoute};
use crate::context::Context;
use crate::handler::{BoxedHandler, FallbackHandler, HandlerFuture};
use crate::normalize::Normalizer;

/// Where a dispatched message ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A chain stage accepted the message.
    ChainStage { chain: String, stage: usize },
    /// A chain's cancel handler accepted the message.
    ChainCancelled { chain: String },
    /// A chain tracks the sender but nothing accepted; the message was dropped.
    Captured { chain: String },
    /// This many top-level handlers accepted the message.
    Handlers(usize),
    /// Nothing accepted; this many fallback handlers ran.
    Fallback(usize),
    /// Nothing accepted and no fallback is registered.
    Unmatched,
}

/// The result of [`Dispatcher::dispatch`]: the routing decision plus the
/// spawned handler tasks.
#[must_use = "handler tasks keep running when dropped; call `join` to wait for them"]
pub struct Dispatched {
    route: Route,
    tasks: Vec<JoinHandle<()>>,
}

impl Dispatched {
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Returns `true` if a chain, handler, or fallback took the message.
    pub fn is_handled(&self) -> bool {
        !matches!(self.route, Route::Unmatched | Route::Captured { .. })
    }

    /// Waits for every spawned handler to finish.
    ///
    /// A task that failed (panicked with panic recovery disabled, or was
    /// aborted) is logged and does not affect the others.
    pub async fn join(self) -> Route {
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Handler task failed: {e}");
            }
        }
        self.route
    }
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatched")
            .field("route", &self.route)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

pub(crate) struct DispatcherInner {
    pub(crate) handlers: Vec<BoxedHandler>,
    pub(crate) chains: Vec<Chain>,
    pub(crate) fallbacks: Vec<FallbackHandler>,
    pub(crate) normalizer: Normalizer,
    pub(crate) bot: BoxedBot,
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) recover_panic: bool,
}

/// The central message dispatcher.
///
/// Registration lists are fixed once built; the only runtime-mutable state is
/// each chain's per-user progress. Cloning is cheap and clones share that
/// state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub(crate) fn from_inner(inner: DispatcherInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn bot(&self) -> &BoxedBot {
        &self.inner.bot
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.len()
    }

    pub fn chains(&self) -> &[Chain] {
        &self.inner.chains
    }

    /// Looks up a chain by name.
    pub fn chain(&self, name: &str) -> Option<&Chain> {
        self.inner.chains.iter().find(|c| c.name() == name)
    }

    /// Normalizes and routes one message, spawning the accepted invocations.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, mut message: Message) -> Dispatched {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            chat_id = message.chat_id(),
            user_id = message.sender_id(),
            message_id = message.message_id
        );
        let _enter = span.enter();

        self.inner.normalizer.normalize(&mut message);
        let ctx = Arc::new(Context::new(message, Arc::clone(&self.inner.bot)));

        for chain in &self.inner.chains {
            let route = match chain.route(&ctx) {
                ChainRoute::Unclaimed => continue,
                ChainRoute::Captured => Dispatched {
                    route: Route::Captured {
                        chain: chain.name().to_string(),
                    },
                    tasks: Vec::new(),
                },
                ChainRoute::Stage { stage, work } => Dispatched {
                    route: Route::ChainStage {
                        chain: chain.name().to_string(),
                        stage,
                    },
                    tasks: vec![self.spawn(work, "chain")],
                },
                ChainRoute::Cancelled { work } => Dispatched {
                    route: Route::ChainCancelled {
                        chain: chain.name().to_string(),
                    },
                    tasks: vec![self.spawn(work, "cancel")],
                },
            };
            debug!(route = ?route.route, "Message claimed by chain");
            return route;
        }

        let tasks: Vec<_> = self
            .inner
            .handlers
            .iter()
            .filter_map(|handler| {
                let work = handler.accept(&ctx)?;
                Some(self.spawn(work, handler.kind().as_str()))
            })
            .collect();

        if !tasks.is_empty() {
            debug!(count = tasks.len(), "Message accepted by handlers");
            return Dispatched {
                route: Route::Handlers(tasks.len()),
                tasks,
            };
        }

        if self.inner.fallbacks.is_empty() {
            trace!("No handler matched");
            return Dispatched {
                route: Route::Unmatched,
                tasks,
            };
        }

        let tasks: Vec<_> = self
            .inner
            .fallbacks
            .iter()
            .map(|fallback| self.spawn(fallback.invoke(Arc::clone(&ctx)), "fallback"))
            .collect();
        debug!(count = tasks.len(), "No handler matched, running fallbacks");
        Dispatched {
            route: Route::Fallback(tasks.len()),
            tasks,
        }
    }

    fn spawn(&self, work: HandlerFuture, kind: &'static str) -> JoinHandle<()> {
        let limiter = Arc::clone(&self.inner.limiter);
        let recover_panic = self.inner.recover_panic;

        tokio::spawn(
            async move {
                // The semaphore is never closed.
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return;
                };
                if !recover_panic {
                    work.await;
                    return;
                }
                if let Err(panic) = AssertUnwindSafe(work).catch_unwind().await {
                    error!("Handler panicked: {}", panic_message(panic.as_ref()));
                }
            }
            .instrument(debug_span!("handler", kind)),
        )
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// A dispatcher is a `Service<Message>` that resolves once every handler the
/// message reached has finished.
impl tower::Service<Message> for Dispatcher {
    type Response = Route;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Route, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, message: Message) -> Self::Future {
        let dispatched = self.dispatch(message);
        Box::pin(async move { Ok(dispatched.join().await) })
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler_count", &self.inner.handlers.len())
            .field("chain_count", &self.inner.chains.len())
            .field("fallback_count", &self.inner.fallbacks.len())
            .field("normalizer", &self.inner.normalizer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ChainBuilder, DispatcherBuilder, Register};
    use crate::pattern::Captures;
    use crate::testing::{MockBot, message, text, user};
    use courier_core::{DefaultOptions, MembershipEvent, MessageContent, PhotoSize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn bump(counter: &Arc<AtomicUsize>) -> impl Fn(Arc<Context>) -> BoxFuture<'static, ()> + use<> {
        let counter = Arc::clone(counter);
        move |_ctx| {
            let c = Arc::clone(&counter);
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn order_chain(chain: ChainBuilder) -> ChainBuilder {
        chain
            .name("order")
            .simple_command("/order", |_ctx, _text| async { "What would you like?" })
            .simple_regex("^[a-z]+$", |_ctx, _text| async { "Noted." })
            .cancel_command("/cancel", |_ctx, _caps| async { "Cancelled." })
    }

    async fn boom(_ctx: Arc<Context>) {
        panic!("boom");
    }

    #[tokio::test]
    async fn test_dispatch_no_handlers() {
        let dispatcher = DispatcherBuilder::new(MockBot::new()).build().unwrap();
        let route = dispatcher.dispatch(text(7, "hi")).join().await;
        assert_eq!(route, Route::Unmatched);
    }

    #[tokio::test]
    async fn test_all_matching_handlers_run() {
        let any = counter();
        let custom = counter();
        let never = counter();
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .on_any(bump(&any))
            .custom(|ctx| ctx.text() == Some("hi"), bump(&custom))
            .custom(|_| false, bump(&never))
            .build()
            .unwrap();

        let route = dispatcher.dispatch(text(7, "hi")).join().await;
        assert_eq!(route, Route::Handlers(2));
        assert_eq!(any.load(Ordering::SeqCst), 1);
        assert_eq!(custom.load(Ordering::SeqCst), 1);
        assert_eq!(never.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_runs_only_when_nothing_matched() {
        let fallback = counter();
        let bot = MockBot::new();
        let dispatcher = DispatcherBuilder::new(bot.clone())
            .simple_command("/start", |_ctx, _text| async { "welcome" })
            .not_matched(bump(&fallback))
            .build()
            .unwrap();

        let route = dispatcher.dispatch(text(7, "/start")).join().await;
        assert_eq!(route, Route::Handlers(1));
        assert_eq!(fallback.load(Ordering::SeqCst), 0);
        assert_eq!(bot.sent_texts(), vec!["welcome".to_string()]);

        let route = dispatcher.dispatch(text(7, "/unknown")).join().await;
        assert_eq!(route, Route::Fallback(1));
        assert_eq!(fallback.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_help_alternation_reply() {
        let bot = MockBot::new();
        let dispatcher = DispatcherBuilder::new(bot.clone())
            .commands(["/help", "/h", "/помощь"], |_ctx, _caps: Captures| async {
                "Available commands: ...".to_string()
            })
            .build()
            .unwrap();

        for input in ["/h", "/help", "/помощь", "@botname /help"] {
            dispatcher.dispatch(text(7, input)).join().await;
        }
        assert_eq!(bot.sent_texts().len(), 4);

        let route = dispatcher.dispatch(text(7, "/helpme")).join().await;
        assert_eq!(route, Route::Unmatched);
    }

    #[tokio::test]
    async fn test_command_captures_arguments() {
        let bot = MockBot::new();
        let dispatcher = DispatcherBuilder::new(bot.clone())
            .command("/echo (.+)", |_ctx, caps: Captures| async move {
                caps.get(1).unwrap_or_default().to_string()
            })
            .build()
            .unwrap();

        dispatcher.dispatch(text(7, "/echo hello world")).join().await;
        dispatcher.dispatch(text(7, "/echo@botname again")).join().await;
        assert_eq!(bot.sent_texts(), vec!["hello world", "again"]);
    }

    #[tokio::test]
    async fn test_chain_claims_before_top_level_handlers() {
        let top = counter();
        let bot = MockBot::new();
        let dispatcher = DispatcherBuilder::new(bot.clone())
            .chain(order_chain)
            .on_any(bump(&top))
            .build()
            .unwrap();

        let route = dispatcher.dispatch(text(7, "/order")).join().await;
        assert_eq!(
            route,
            Route::ChainStage {
                chain: "order".into(),
                stage: 0
            }
        );

        // Off-script text is captured, not handed to on_any.
        let route = dispatcher.dispatch(text(7, "NOPE")).join().await;
        assert_eq!(
            route,
            Route::Captured {
                chain: "order".into()
            }
        );
        assert_eq!(top.load(Ordering::SeqCst), 0);

        let route = dispatcher.dispatch(text(7, "pizza")).join().await;
        assert_eq!(
            route,
            Route::ChainStage {
                chain: "order".into(),
                stage: 1
            }
        );

        // The chain is complete; the next message reaches the top level.
        let route = dispatcher.dispatch(text(7, "pizza")).join().await;
        assert_eq!(route, Route::Handlers(1));
        assert_eq!(top.load(Ordering::SeqCst), 1);
        assert_eq!(bot.sent_texts(), vec!["What would you like?", "Noted."]);
    }

    #[tokio::test]
    async fn test_chain_cancel() {
        let bot = MockBot::new();
        let dispatcher = DispatcherBuilder::new(bot.clone())
            .chain(order_chain)
            .build()
            .unwrap();

        dispatcher.dispatch(text(7, "/order")).join().await;
        let route = dispatcher.dispatch(text(7, "/cancel")).join().await;
        assert_eq!(
            route,
            Route::ChainCancelled {
                chain: "order".into()
            }
        );
        assert_eq!(dispatcher.chain("order").unwrap().stage_of(7), None);
    }

    #[tokio::test]
    async fn test_photo_handler_receives_largest_size() {
        let best = Arc::new(parking_lot::Mutex::new(String::new()));
        let seen = Arc::clone(&best);
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .on_photo(move |_ctx, (_sizes, id): (Vec<PhotoSize>, String)| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock() = id;
                }
            })
            .build()
            .unwrap();

        let size = |id: &str, width, height| PhotoSize {
            file_id: id.into(),
            width,
            height,
            file_size: None,
        };
        let photo = MessageContent::Photo(vec![
            size("small", 90, 90),
            size("large", 800, 600),
            size("medium", 320, 240),
        ]);
        dispatcher.dispatch(message(7, 7, photo)).join().await;
        assert_eq!(*best.lock(), "large");
    }

    #[tokio::test]
    async fn test_membership_handler() {
        let joined = counter();
        let counter = Arc::clone(&joined);
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .on_new_participant(move |_ctx, (chat_id, member): (i64, courier_core::User)| {
                let c = Arc::clone(&counter);
                async move {
                    assert_eq!(chat_id, -100);
                    assert_eq!(member.id, 55);
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap();

        let event = MessageContent::Membership(MembershipEvent::NewParticipant(user(55, None)));
        let route = dispatcher.dispatch(message(-100, 7, event)).join().await;
        assert_eq!(route, Route::Handlers(1));
        assert_eq!(joined.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let survivor = counter();
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .on_any(boom)
            .on_any(bump(&survivor))
            .build()
            .unwrap();

        let route = dispatcher.dispatch(text(7, "hi")).join().await;
        assert_eq!(route, Route::Handlers(2));
        assert_eq!(survivor.load(Ordering::SeqCst), 1);

        // The dispatcher keeps working.
        dispatcher.dispatch(text(7, "again")).join().await;
        assert_eq!(survivor.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_panic_before_the_first_await_is_isolated() {
        let survivor = counter();
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .on_any(|_ctx: Arc<Context>| -> std::future::Ready<()> { panic!("eager boom") })
            .on_any(bump(&survivor))
            .build()
            .unwrap();

        let route = dispatcher.dispatch(text(7, "hi")).join().await;
        assert_eq!(route, Route::Handlers(2));
        assert_eq!(survivor.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_registered_chain_wins_shared_entry() {
        let first = counter();
        let second = counter();
        let (f, s) = (Arc::clone(&first), Arc::clone(&second));
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .chain(move |chain| {
                chain.name("first").simple_command("/order", move |_ctx, _text| {
                    let f = Arc::clone(&f);
                    async move {
                        f.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .chain(move |chain| {
                chain.name("second").simple_command("/order", move |_ctx, _text| {
                    let s = Arc::clone(&s);
                    async move {
                        s.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .build()
            .unwrap();

        let route = dispatcher.dispatch(text(7, "/order")).join().await;
        assert_eq!(
            route,
            Route::ChainStage {
                chain: "first".into(),
                stage: 0
            }
        );
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.chain("first").unwrap().stage_of(7), Some(1));
        assert_eq!(dispatcher.chain("second").unwrap().stage_of(7), None);
    }

    #[tokio::test]
    async fn test_user_tracked_by_later_chain_passes_earlier_one() {
        let bot = MockBot::new();
        let dispatcher = DispatcherBuilder::new(bot.clone())
            .chain(|chain| {
                chain
                    .name("greet")
                    .simple_command("/greet", |_ctx, _text| async { "Hi!" })
            })
            .chain(order_chain)
            .build()
            .unwrap();

        dispatcher.dispatch(text(7, "/order")).join().await;
        assert_eq!(dispatcher.chain("order").unwrap().stage_of(7), Some(1));

        let route = dispatcher.dispatch(text(7, "pizza")).join().await;
        assert_eq!(
            route,
            Route::ChainStage {
                chain: "order".into(),
                stage: 1
            }
        );
        assert_eq!(dispatcher.chain("greet").unwrap().stage_of(7), None);
        assert_eq!(bot.sent_texts(), vec!["What would you like?", "Noted."]);
    }

    #[tokio::test]
    async fn test_reply_handler_receives_original() {
        let original = Arc::new(parking_lot::Mutex::new(None));
        let seen = Arc::clone(&original);
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .on_reply(move |_ctx, replied_to: Message| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock() = replied_to.text().map(str::to_string);
                }
            })
            .build()
            .unwrap();

        let mut reply = text(7, "agreed");
        reply.reply_to = Some(Box::new(text(8, "shall we?")));
        let route = dispatcher.dispatch(reply).join().await;
        assert_eq!(route, Route::Handlers(1));
        assert_eq!(original.lock().as_deref(), Some("shall we?"));

        let route = dispatcher.dispatch(text(7, "not a reply")).join().await;
        assert_eq!(route, Route::Unmatched);
    }

    #[tokio::test]
    async fn test_forward_handler_receives_original_author() {
        let bot = MockBot::new();
        let dispatcher = DispatcherBuilder::new(bot.clone())
            .on_forward(|_ctx, (author, date): (courier_core::User, i64)| async move {
                format!("{} at {date}", author.first_name)
            })
            .build()
            .unwrap();

        let mut forwarded = text(7, "look at this");
        forwarded.forward = Some(courier_core::Forward {
            from: user(9, None),
            date: 1_449_999_999,
        });
        let route = dispatcher.dispatch(forwarded).join().await;
        assert_eq!(route, Route::Handlers(1));
        assert_eq!(bot.sent_texts(), vec!["user9 at 1449999999"]);
    }

    #[tokio::test]
    async fn test_panic_without_recovery_surfaces_in_join() {
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .options(DefaultOptions {
                recover_panic: false,
                ..Default::default()
            })
            .on_any(boom)
            .build()
            .unwrap();

        let route = dispatcher.dispatch(text(7, "hi")).join().await;
        assert_eq!(route, Route::Handlers(1));
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let active = counter();
        let peak = counter();
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .max_concurrent_handlers(2)
            .on_any(move |_ctx| {
                let (a, p) = (Arc::clone(&a), Arc::clone(&p));
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap();

        let all: Vec<_> = (0..8).map(|i| dispatcher.dispatch(text(i, "x"))).collect();
        for dispatched in all {
            dispatched.join().await;
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_dispatcher_as_service() {
        let dispatcher = DispatcherBuilder::new(MockBot::new())
            .simple_command("/ping", |_ctx, _text| async { "pong" })
            .build()
            .unwrap();

        let route = dispatcher.oneshot(text(7, "/ping")).await.unwrap();
        assert_eq!(route, Route::Handlers(1));
    }

    #[test]
    fn test_dispatcher_debug() {
        let dispatcher = DispatcherBuilder::new(MockBot::new()).build().unwrap();
        let debug = format!("{dispatcher:?}");
        assert!(debug.contains("handler_count: 0"));
    }
}
