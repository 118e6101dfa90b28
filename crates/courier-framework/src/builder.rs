//! Dispatcher and chain builders.
//!
//! Both builders share the registration family through [`Register`]. Every
//! registration call returns the builder, so configuration reads as one
//! fluent expression; pattern errors are collected and reported by
//! [`DispatcherBuilder::build`].
//!
//! ```rust,ignore
//! use courier_framework::{DispatcherBuilder, Register};
//!
//! let dispatcher = DispatcherBuilder::new(bot)
//!     .command(r"echo (.+)", |_ctx, caps| async move {
//!         caps.get(1).unwrap_or_default().to_string()
//!     })
//!     .chain(|chain| {
//!         chain
//!             .name("guess")
//!             .simple_command("guess", |_ctx, _text| async { "Cat or dog?" })
//!             .simple_regex("^(cat|dog)$", |_ctx, text| async move { format!("A {text}!") })
//!             .cancel_command("cancel", |_ctx, _caps| async { "Cancelled." })
//!     })
//!     .not_matched(|ctx| async move { tracing::debug!(?ctx, "unhandled") })
//!     .build()?;
//! ```

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use courier_core::{
    Audio, BoxedBot, DefaultOptions, Document, Message, PhotoSize, Sticker, User, Video, Voice,
};

use crate::chain::Chain;
use crate::context::Context;
use crate::dispatcher::{Dispatcher, DispatcherInner};
use crate::error::{BuildError, BuildResult};
use crate::handler::{
    BoxedHandler, ConditionalHandler, ContentHandler, CustomHandler, FallbackHandler,
    HandleResponse, HandlerKind, TextHandler, select,
};
use crate::normalize::Normalizer;
use crate::pattern::{Captures, Pattern, PatternSet, TextMatch, command_pattern};

/// Default ceiling on concurrently running handler invocations.
pub const DEFAULT_MAX_CONCURRENT_HANDLERS: usize = 64;

/// Handlers collected by a builder, plus the first registration error.
pub struct Registrations {
    handlers: Vec<BoxedHandler>,
    username: Option<String>,
    error: Option<BuildError>,
}

impl Registrations {
    fn new(username: Option<String>) -> Self {
        Self {
            handlers: Vec::new(),
            username,
            error: None,
        }
    }

    fn fail(&mut self, error: BuildError) {
        debug!(%error, "Registration rejected");
        self.error.get_or_insert(error);
    }

    fn finish(self) -> BuildResult<Vec<BoxedHandler>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.handlers),
        }
    }

    /// Compiles a command pattern with the bot's `@username` suffix.
    fn command(&self, pattern: &str) -> BuildResult<Pattern> {
        Pattern::new(&command_pattern(pattern, self.username.as_deref()))
    }

    fn commands<I, S>(&self, patterns: I) -> BuildResult<PatternSet>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let username = self.username.as_deref();
        PatternSet::new(
            patterns
                .into_iter()
                .map(|p| command_pattern(p.as_ref(), username))
                .collect::<Vec<_>>(),
        )
    }
}

/// The registration family shared by [`DispatcherBuilder`] and [`ChainBuilder`].
///
/// Callbacks receive the message [`Context`] plus the payload of the handler
/// variant. Text callbacks may return anything implementing
/// [`HandleResponse`]: a non-empty `String` is sent back to the chat.
pub trait Register: Sized {
    #[doc(hidden)]
    fn registrations(&mut self) -> &mut Registrations;

    /// Registers a pre-built handler.
    fn handler<H: ConditionalHandler>(mut self, handler: H) -> Self {
        self.registrations().handlers.push(Arc::new(handler));
        self
    }

    /// Registers a text handler, or records the matcher's build error.
    fn text_handler<M, F, Fut>(mut self, matcher: BuildResult<M>, callback: F) -> Self
    where
        M: TextMatch + std::fmt::Display,
        F: Fn(Arc<Context>, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        match matcher {
            Ok(matcher) => self.handler(TextHandler::new(matcher, callback)),
            Err(e) => {
                self.registrations().fail(e);
                self
            }
        }
    }

    /// A command: `help (\w+)` matches `/help topic` and `/help@bot topic`.
    fn command<F, Fut>(mut self, pattern: &str, callback: F) -> Self
    where
        F: Fn(Arc<Context>, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        let matcher = self.registrations().command(pattern);
        self.text_handler(matcher, callback)
    }

    /// A command whose callback only needs the message text.
    fn simple_command<F, Fut>(self, pattern: &str, callback: F) -> Self
    where
        F: Fn(Arc<Context>, String) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.command(pattern, move |ctx, caps| callback(ctx, caps.into_text()))
    }

    /// Several command spellings sharing one callback. The first pattern that
    /// matches supplies the captures.
    fn commands<I, S, F, Fut>(mut self, patterns: I, callback: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(Arc<Context>, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        let matcher = self.registrations().commands(patterns);
        self.text_handler(matcher, callback)
    }

    /// A raw regular expression, used as given.
    fn regex<F, Fut>(self, pattern: &str, callback: F) -> Self
    where
        F: Fn(Arc<Context>, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.text_handler(Pattern::new(pattern), callback)
    }

    fn simple_regex<F, Fut>(self, pattern: &str, callback: F) -> Self
    where
        F: Fn(Arc<Context>, String) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.regex(pattern, move |ctx, caps| callback(ctx, caps.into_text()))
    }

    fn regexes<I, S, F, Fut>(self, patterns: I, callback: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(Arc<Context>, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.text_handler(PatternSet::new(patterns), callback)
    }

    /// A content handler for messages `select` extracts a payload from.
    fn on_content<T, F, Fut>(self, kind: HandlerKind, select: fn(&Message) -> Option<T>, callback: F) -> Self
    where
        T: Send + 'static,
        F: Fn(Arc<Context>, T) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.handler(ContentHandler::new(kind, select, callback))
    }

    /// Photos. The callback receives every size and the file id of the largest.
    fn on_photo<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (Vec<PhotoSize>, String)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Photo, select::photo, callback)
    }

    fn on_audio<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (Audio, String)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Audio, select::audio, callback)
    }

    fn on_voice<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (Voice, String)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Voice, select::voice, callback)
    }

    fn on_document<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (Document, String)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Document, select::document, callback)
    }

    fn on_sticker<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (Sticker, String)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Sticker, select::sticker, callback)
    }

    fn on_video<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (Video, String)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Video, select::video, callback)
    }

    /// Locations, as `(latitude, longitude)`.
    fn on_location<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (f64, f64)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Location, select::location, callback)
    }

    /// Replies. The callback receives the message being replied to.
    fn on_reply<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, Message) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Reply, select::reply, callback)
    }

    /// Forwards, as the original sender and the original date.
    fn on_forward<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (User, i64)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::Forward, select::forward, callback)
    }

    /// A user joined a group, as `(chat_id, user)`.
    fn on_new_participant<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (i64, User)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::NewParticipant, select::new_participant, callback)
    }

    fn on_left_participant<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (i64, User)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::LeftParticipant, select::left_participant, callback)
    }

    fn on_new_title<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (i64, String)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::NewTitle, select::new_title, callback)
    }

    fn on_new_photo<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, (i64, Vec<PhotoSize>)) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::NewPhoto, select::new_photo, callback)
    }

    fn on_delete_photo<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, i64) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::PhotoDeleted, select::photo_deleted, callback)
    }

    fn on_group_created<F, Fut>(self, callback: F) -> Self
    where
        F: Fn(Arc<Context>, i64) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        self.on_content(HandlerKind::GroupCreated, select::group_created, callback)
    }

    /// A caller predicate. No reply is sent implicitly.
    fn custom<P, F, Fut>(self, predicate: P, action: F) -> Self
    where
        P: Fn(&Context) -> bool + Send + Sync + 'static,
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handler(CustomHandler::new(predicate, action))
    }

    /// Every message. Useful for logging and other side effects.
    fn on_any<F, Fut>(self, action: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handler(CustomHandler::any(action))
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Assembles an immutable [`Dispatcher`].
pub struct DispatcherBuilder {
    bot: BoxedBot,
    registrations: Registrations,
    chains: Vec<BuildResult<Chain>>,
    fallbacks: Vec<FallbackHandler>,
    options: DefaultOptions,
    max_concurrent_handlers: usize,
}

impl DispatcherBuilder {
    /// Starts a builder for `bot`. Its username feeds command patterns and
    /// mention stripping.
    pub fn new(bot: BoxedBot) -> Self {
        let username = bot.identity().username.clone();
        Self {
            bot,
            registrations: Registrations::new(username),
            chains: Vec::new(),
            fallbacks: Vec::new(),
            options: DefaultOptions::default(),
            max_concurrent_handlers: DEFAULT_MAX_CONCURRENT_HANDLERS,
        }
    }

    pub fn options(mut self, options: DefaultOptions) -> Self {
        self.options = options;
        self
    }

    /// Caps the number of handler invocations running at once. Zero is
    /// treated as one.
    pub fn max_concurrent_handlers(mut self, limit: usize) -> Self {
        self.max_concurrent_handlers = limit.max(1);
        self
    }

    /// Registers a chain, configured inside `scope`.
    ///
    /// Chains are offered each message in registration order.
    pub fn chain<F>(mut self, scope: F) -> Self
    where
        F: FnOnce(ChainBuilder) -> ChainBuilder,
    {
        let index = self.chains.len();
        let builder = ChainBuilder::new(index, self.registrations.username.clone());
        self.chains.push(scope(builder).finish());
        self
    }

    /// Registers a "not matched" handler, run when nothing else took a message.
    pub fn not_matched<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(Arc<Context>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.fallbacks.push(FallbackHandler::new(action));
        self
    }

    /// Validates every registration and freezes the configuration.
    pub fn build(self) -> BuildResult<Dispatcher> {
        let handlers = self.registrations.finish()?;
        let chains = self.chains.into_iter().collect::<BuildResult<Vec<_>>>()?;
        let normalizer = Normalizer::new(&self.options, self.bot.identity().username.as_deref());

        debug!(
            handlers = handlers.len(),
            chains = chains.len(),
            fallbacks = self.fallbacks.len(),
            "Dispatcher built"
        );

        Ok(Dispatcher::from_inner(DispatcherInner {
            handlers,
            chains,
            fallbacks: self.fallbacks,
            normalizer,
            bot: self.bot,
            limiter: Arc::new(Semaphore::new(self.max_concurrent_handlers)),
            recover_panic: self.options.recover_panic,
        }))
    }
}

impl Register for DispatcherBuilder {
    fn registrations(&mut self) -> &mut Registrations {
        &mut self.registrations
    }
}

// ============================================================================
// ChainBuilder
// ============================================================================

/// The scope in which one chain's stages are registered, in order.
pub struct ChainBuilder {
    name: String,
    registrations: Registrations,
    cancel: Option<BoxedHandler>,
    looping: bool,
}

impl ChainBuilder {
    fn new(index: usize, username: Option<String>) -> Self {
        Self {
            name: format!("chain-{index}"),
            registrations: Registrations::new(username),
            cancel: None,
            looping: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restart at stage 0 after the last stage instead of releasing the user.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// A command that evicts the user from the chain at any stage.
    pub fn cancel_command<F, Fut>(mut self, pattern: &str, callback: F) -> Self
    where
        F: Fn(Arc<Context>, Captures) -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: HandleResponse + 'static,
    {
        match self.registrations.command(pattern) {
            Ok(matcher) => self.cancel_with(TextHandler::new(matcher, callback)),
            Err(e) => {
                self.registrations.fail(e);
                self
            }
        }
    }

    /// Uses an arbitrary handler as the cancel condition.
    pub fn cancel_with<H: ConditionalHandler>(mut self, handler: H) -> Self {
        self.cancel = Some(Arc::new(handler));
        self
    }

    fn finish(self) -> BuildResult<Chain> {
        let stages = self.registrations.finish()?;
        if stages.is_empty() {
            return Err(BuildError::EmptyChain { name: self.name });
        }
        Ok(Chain::new(self.name, stages, self.cancel, self.looping))
    }
}

impl Register for ChainBuilder {
    fn registrations(&mut self) -> &mut Registrations {
        &mut self.registrations
    }
}
