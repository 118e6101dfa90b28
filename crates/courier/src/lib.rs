//! # Courier
//!
//! An async framework for building chat bots on a messaging-platform HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────┐     ┌────────────┐     ┌──────────────────────────┐
//! │ poll/webhook │────▶│  intake  │────▶│ Dispatcher │────▶│ chain stage  (own task)  │──▶ Bot
//! │  (transport) │     │  queue   │     │            │────▶│ handler ...  (own task)  │──▶ Bot
//! └──────────────┘     └──────────┘     └────────────┘────▶│ fallback     (own task)  │──▶ Bot
//!                                                          └──────────────────────────┘
//! ```
//!
//! - **Transport**: the HTTP client for the bot API and the webhook server
//! - **Intake**: one queue fed by either source, with the update cursor
//! - **Dispatcher**: normalizes each message, gives chains the first claim,
//!   fans out to matching handlers, and falls back when nothing matched
//! - **Chains**: per-user multi-step conversations
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = CourierRuntime::builder().build()?;
//!     let bot = runtime.connect().await?;
//!
//!     let dispatcher = runtime
//!         .dispatcher_builder(bot.clone())
//!         .simple_command("start", |ctx, _| async move {
//!             let _ = ctx.reply("Hello!").await;
//!         })
//!         .not_matched(|ctx| async move {
//!             let _ = ctx.reply("Try /start").await;
//!         })
//!         .build()?;
//!
//!     runtime.run(bot, dispatcher).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;
pub use courier_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{CourierConfig, CourierRuntime};

    // Building a dispatcher
    pub use courier_framework::{
        Captures, ChainBuilder, Context, Dispatcher, DispatcherBuilder, HandleResponse, Register,
    };

    // Data model and outbound requests
    pub use courier_core::{
        Bot, ChatAction, FileSource, KeyboardMarkup, Message, MessageContent, ParseMode,
        PhotoSize, SendRequest, User,
    };

    pub use courier_transport::HttpBot;

    pub use courier_runtime::prelude::*;
}
