//! Echo Bot Example
//!
//! Demonstrates the Courier dispatch model:
//!
//! - Commands, with captures or with the full message text
//! - A two-step `/order` conversation (a chain) that `/cancel` aborts
//! - Media handlers for photos and locations
//! - A logging handler that sees every message
//! - A fallback for anything nothing else handled
//!
//! # Usage
//!
//! ```bash
//! COURIER_TOKEN=123:ABC cargo run --package echo-bot
//! cargo run --package echo-bot -- --config ./courier.toml --profile production
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use courier::prelude::*;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(about = "A simple echo bot built on Courier")]
struct Args {
    /// Configuration file. Searched in the current directory when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`.
    #[arg(short, long)]
    profile: Option<String>,
}

// ============================================================================
// Handler Functions
// ============================================================================

async fn log_message(ctx: Arc<Context>) {
    let message = ctx.message();
    info!(
        chat_id = message.chat_id(),
        user_id = message.from.id,
        text = ctx.text().unwrap_or("<non-text>"),
        "Message received"
    );
}

/// `/echo <text>` sends the text back.
async fn echo(_ctx: Arc<Context>, caps: Captures) -> String {
    caps.get(1).unwrap_or_default().to_string()
}

async fn help(_ctx: Arc<Context>, _text: String) -> &'static str {
    "Commands:\n\
     /echo <text> - Echo text\n\
     /ping        - Pong!\n\
     /order       - Start an order\n\
     /cancel      - Abort the order"
}

async fn largest_photo_size(ctx: Arc<Context>, (sizes, best_id): (Vec<PhotoSize>, String)) {
    let caption = format!("Largest of {} sizes", sizes.len());
    if let Err(e) = ctx
        .answer()
        .photo(best_id, Some(caption))
        .quote()
        .send()
        .await
    {
        error!("Failed to echo photo: {e}");
    }
}

async fn location(_ctx: Arc<Context>, (latitude, longitude): (f64, f64)) -> String {
    format!("You are at {latitude:.4}, {longitude:.4}")
}

async fn order_start(ctx: Arc<Context>, _text: String) {
    let keyboard = KeyboardMarkup::new([["Coffee", "Tea"]]);
    if let Err(e) = ctx
        .answer()
        .text("What would you like?")
        .keyboard(keyboard)
        .send()
        .await
    {
        error!("Failed to ask for the order: {e}");
    }
}

async fn order_item(ctx: Arc<Context>, item: String) {
    if let Err(e) = ctx
        .answer()
        .text(format!("One {item}, coming up!"))
        .hide_keyboard()
        .send()
        .await
    {
        error!("Failed to confirm the order: {e}");
    }
}

async fn order_cancel(_ctx: Arc<Context>, _caps: Captures) -> &'static str {
    "Order cancelled."
}

async fn not_matched(ctx: Arc<Context>) {
    if let Err(e) = ctx.reply("I did not understand that. Try /help").await {
        error!("Failed to send fallback reply: {e}");
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = CourierRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build()?;

    let bot = runtime.connect().await?;
    let dispatcher = runtime
        .dispatcher_builder(bot.clone())
        .chain(|chain| {
            chain
                .name("order")
                .simple_command("order", order_start)
                .simple_regex("^(?:Coffee|Tea)$", order_item)
                .cancel_command("cancel", order_cancel)
        })
        .on_any(log_message)
        .command("echo (.+)", echo)
        .simple_command("ping", |_ctx, _text| async { "Pong!" })
        .commands(["help", "start"], |ctx, _caps| help(ctx, String::new()))
        .on_photo(largest_photo_size)
        .on_location(location)
        .not_matched(not_matched)
        .build()?;

    info!(handlers = dispatcher.handler_count(), "Dispatcher ready");
    runtime.run(bot, dispatcher).await?;
    Ok(())
}
