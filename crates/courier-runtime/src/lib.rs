//! Courier Runtime - orchestration layer for the Courier bot framework.
//!
//! This crate provides:
//! - Layered configuration loading and validation ([`config`])
//! - Logging setup on `tracing-subscriber` ([`logging`])
//! - The intake pipeline shared by polling and the webhook ([`intake`])
//! - [`CourierRuntime`], which checks the bot identity and runs until shutdown
//!
//! ```ignore
//! use courier_framework::Register;
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::builder().build()?;
//!     let bot = runtime.connect().await?;
//!     let dispatcher = runtime
//!         .dispatcher_builder(bot.clone())
//!         .simple_command("start", |ctx, _| async move {
//!             let _ = ctx.reply("Hi!").await;
//!         })
//!         .build()?;
//!     runtime.run(bot, dispatcher).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod intake;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, CourierConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use intake::{Intake, IntakeHandle, PollSettings};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{CourierRuntime, RuntimeBuilder, wait_for_shutdown};

pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
