//! Runtime orchestration: identity check, intake and dispatch.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//! use courier_framework::Register;
//!
//! let runtime = CourierRuntime::builder().build()?;
//! let bot = runtime.connect().await?;
//! let dispatcher = runtime
//!     .dispatcher_builder(bot.clone())
//!     .simple_command("start", |ctx, _| async move {
//!         let _ = ctx.reply("hello").await;
//!     })
//!     .build()?;
//! runtime.run(bot, dispatcher).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use courier_core::UpdateSource;
use courier_framework::{Dispatcher, DispatcherBuilder};
use courier_transport::{HttpBot, WebhookServer, webhook_path};

use crate::config::{ConfigLoader, ConfigResult, CourierConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::intake::{Intake, PollSettings, poll_loop, run_dispatch_loop};
use crate::logging;

/// Runs one bot from a loaded [`CourierConfig`].
pub struct CourierRuntime {
    config: CourierConfig,
}

impl CourierRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime and initializes logging from `config`.
    pub fn from_config(config: CourierConfig) -> Self {
        logging::init_from_config(&config.logging);
        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            webhook = config.webhook.enabled,
            "Runtime initialized from configuration"
        );
        Self { config }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// Verifies the token with `getMe` and returns the connected bot.
    ///
    /// Failure is fatal: nothing should be dispatched without an identity.
    pub async fn connect(&self) -> RuntimeResult<Arc<HttpBot>> {
        let bot = HttpBot::connect(self.config.http_bot_config())
            .await
            .map_err(|e| {
                error!(error = %e, api_url = %self.config.api_url, "Bot identity check failed");
                RuntimeError::Identity(e)
            })?;
        Ok(Arc::new(bot))
    }

    /// A dispatcher builder carrying the configured options and worker ceiling.
    pub fn dispatcher_builder(&self, bot: Arc<HttpBot>) -> DispatcherBuilder {
        DispatcherBuilder::new(bot)
            .options(self.config.options.clone())
            .max_concurrent_handlers(self.config.dispatch.max_concurrent_handlers)
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self, bot: Arc<HttpBot>, dispatcher: Dispatcher) -> RuntimeResult<()> {
        info!("Courier runtime is now running. Press Ctrl+C to stop.");
        self.run_until(bot, dispatcher, wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes.
    ///
    /// Updates arrive through the webhook when it is enabled, otherwise
    /// through long polling.
    pub async fn run_until<F>(
        &self,
        bot: Arc<HttpBot>,
        dispatcher: Dispatcher,
        shutdown: F,
    ) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        if !self.config.webhook.enabled {
            return self.run_polling_until(bot, dispatcher, shutdown).await;
        }

        let token = CancellationToken::new();
        let (handle, receiver) = Intake::new().split();

        let route = webhook_path(&self.config.webhook.path, &self.config.token);
        let server =
            WebhookServer::bind(&self.config.webhook.listen, route, handle.clone()).await?;
        bot.set_webhook(&self.webhook_url()?).await?;

        let dispatch = tokio::spawn(run_dispatch_loop(receiver, dispatcher, token.clone()));
        let serve = tokio::spawn(server.run(token.clone()));
        drop(handle);

        shutdown.await;
        info!("Stopping Courier runtime");
        token.cancel();

        let served = serve.await;
        if let Err(e) = dispatch.await {
            error!(error = %e, "Dispatch loop failed");
        }
        match served {
            Ok(result) => result?,
            Err(e) => error!(error = %e, "Webhook server task failed"),
        }
        info!("Runtime stopped");
        Ok(())
    }

    /// Long-polls `source` until `shutdown` completes.
    pub async fn run_polling_until<S, F>(
        &self,
        source: Arc<S>,
        dispatcher: Dispatcher,
        shutdown: F,
    ) -> RuntimeResult<()>
    where
        S: UpdateSource,
        F: Future<Output = ()>,
    {
        let token = CancellationToken::new();
        let (handle, receiver) = Intake::new().split();
        let settings = PollSettings {
            timeout: self.config.polling.timeout(),
            retry_delay: self.config.polling.retry_delay(),
        };

        let dispatch = tokio::spawn(run_dispatch_loop(receiver, dispatcher, token.clone()));
        let poll = tokio::spawn(poll_loop(source, handle, settings, token.clone()));

        shutdown.await;
        info!("Stopping Courier runtime");
        token.cancel();

        for (name, task) in [("poll", poll), ("dispatch", dispatch)] {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Runtime task failed");
            }
        }
        info!("Runtime stopped");
        Ok(())
    }

    /// The URL registered with the platform: public base plus secret route.
    pub fn webhook_url(&self) -> RuntimeResult<String> {
        let webhook = &self.config.webhook;
        let base = webhook
            .public_url
            .as_deref()
            .ok_or_else(|| crate::config::ConfigError::missing_field("webhook.public_url"))?;
        Ok(format!(
            "{}{}",
            base.trim_end_matches('/'),
            webhook_path(&webhook.path, &self.config.token)
        ))
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal as unix_signal};
        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = signal::ctrl_c() => log_ctrl_c(result),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    let result = signal::ctrl_c().await;
    let failed = result.is_err();
    log_ctrl_c(result);
    if failed {
        // Without a signal source the process can only be stopped externally.
        std::future::pending::<()>().await;
    }
}

fn log_ctrl_c(result: std::io::Result<()>) {
    match result {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
    }
}

/// Builder for a [`CourierRuntime`] wrapping a [`ConfigLoader`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration, then creates the runtime.
    pub fn build(self) -> ConfigResult<CourierRuntime> {
        let config = self.config_loader.load()?;
        Ok(CourierRuntime::from_config(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use courier_core::{
        ApiError, ApiResult, Bot, ChatAction, Message, SendRequest, Update, User,
    };
    use courier_framework::Register;

    use crate::config::ConfigError;

    fn config(token: &str) -> CourierConfig {
        CourierConfig {
            token: token.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_requires_token() {
        figment::Jail::expect_with(|jail| {
            let result = CourierRuntime::builder()
                .search_path(jail.directory())
                .without_env()
                .build();
            assert!(matches!(result, Err(ConfigError::MissingField { .. })));
            Ok(())
        });
    }

    #[test]
    fn test_webhook_url() {
        let mut config = config("123:ABC");
        config.webhook.enabled = true;
        config.webhook.path = "/hook".into();
        config.webhook.public_url = Some("https://bot.example.org/".into());
        let runtime = CourierRuntime { config };
        assert_eq!(
            runtime.webhook_url().unwrap(),
            "https://bot.example.org/hook/123ABC"
        );
    }

    #[test]
    fn test_webhook_url_requires_public_url() {
        let runtime = CourierRuntime {
            config: config("1:x"),
        };
        assert!(matches!(
            runtime.webhook_url(),
            Err(RuntimeError::Config(ConfigError::MissingField { .. }))
        ));
    }

    struct OneShotSource {
        polls: AtomicUsize,
    }

    #[async_trait]
    impl UpdateSource for OneShotSource {
        async fn get_updates(&self, _offset: i64, _timeout: Duration) -> ApiResult<Vec<Update>> {
            if self.polls.fetch_add(1, Ordering::SeqCst) > 0 {
                return std::future::pending().await;
            }
            Ok(vec![serde_json::from_value(json!({
                "update_id": 1,
                "message": {
                    "message_id": 1, "date": 1,
                    "from": { "id": 5, "first_name": "A" },
                    "chat": { "id": 5 },
                    "text": "/ping",
                }
            }))?])
        }

        async fn clear_webhook(&self) -> ApiResult<()> {
            Ok(())
        }
    }

    struct NullBot(User);

    #[async_trait]
    impl Bot for NullBot {
        fn identity(&self) -> &User {
            &self.0
        }

        async fn send(&self, _request: SendRequest) -> ApiResult<Message> {
            Err(ApiError::NotConnected)
        }

        async fn forward(&self, _chat_id: i64, _from: i64, _message_id: i64) -> ApiResult<Message> {
            Err(ApiError::NotConnected)
        }

        async fn send_chat_action(&self, _chat_id: i64, _action: ChatAction) -> ApiResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_polling_run_dispatches_until_shutdown() {
        let runtime = CourierRuntime {
            config: config("1:x"),
        };
        let bot = Arc::new(NullBot(User {
            id: 1,
            first_name: "bot".into(),
            last_name: None,
            username: Some("bot".into()),
        }));

        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let done_tx = parking_lot::Mutex::new(Some(done_tx));
        let dispatcher = DispatcherBuilder::new(bot)
            .simple_command("ping", move |_ctx, _text| {
                let sender = done_tx.lock().take();
                async move {
                    if let Some(sender) = sender {
                        let _ = sender.send(());
                    }
                }
            })
            .build()
            .unwrap();

        let source = Arc::new(OneShotSource {
            polls: AtomicUsize::new(0),
        });
        let shutdown = async {
            let _ = done_rx.await;
        };
        tokio_test::assert_ok!(
            runtime
                .run_polling_until(source.clone(), dispatcher, shutdown)
                .await
        );
        assert!(source.polls.load(Ordering::SeqCst) >= 1);
    }
}
