//! # Courier Transport
//!
//! Network implementations of the collaborators defined in `courier-core`.
//!
//! ## Features
//!
//! - `http-client` (default): [`HttpBot`], a reqwest client for the bot API
//!   implementing both [`Bot`](courier_core::Bot) and
//!   [`UpdateSource`](courier_core::UpdateSource)
//! - `webhook` (default): [`WebhookServer`], an axum endpoint receiving
//!   pushed updates
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  courier-runtime    │  (intake, polling loop, startup)
//! ├─────────────────────┤
//! │  courier-core       │  (Bot / UpdateSource traits)
//! ├─────────────────────┤
//! │  courier-transport  │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (HTTP)     │
//! └─────────────────────┘
//! ```

#[cfg(feature = "http-client")]
pub mod client;

#[cfg(feature = "webhook")]
pub mod webhook;

#[cfg(feature = "http-client")]
pub use client::{DEFAULT_API_URL, HttpBot, HttpBotConfig};

#[cfg(feature = "webhook")]
pub use webhook::{WebhookServer, webhook_path};
