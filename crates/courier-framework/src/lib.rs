//! # Courier Framework
//!
//! The dispatch engine of the Courier bot framework.
//!
//! This layer provides:
//! - Text matchers: single [`Pattern`]s and ordered [`PatternSet`] alternations
//! - Conditional handlers for text, media, membership events and custom predicates
//! - Multi-step conversations through [`Chain`]s
//! - Message [`Normalizer`] (mention stripping, implicit commands, case folding)
//! - The immutable [`Dispatcher`], assembled by [`DispatcherBuilder`]
//!
//! Everything here is transport-agnostic: the dispatcher only needs a
//! [`Bot`](courier_core::Bot) for replies and a stream of messages.

pub mod builder;
pub mod chain;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod normalize;
pub mod pattern;

#[cfg(test)]
mod testing;

pub use builder::{ChainBuilder, DEFAULT_MAX_CONCURRENT_HANDLERS, DispatcherBuilder, Register};
pub use chain::{Chain, ChainRoute};
pub use context::{Answer, Context};
pub use dispatcher::{Dispatched, Dispatcher, Route};
pub use error::{BuildError, BuildResult};
pub use handler::{
    BoxedHandler, ConditionalHandler, ContentHandler, CustomHandler, FallbackHandler,
    HandleResponse, HandlerFuture, HandlerKind, TextHandler, select,
};
pub use normalize::Normalizer;
pub use pattern::{
    Captures, Pattern, PatternSet, TextMatch, add_username_command, command_pattern,
    convert_to_command,
};
