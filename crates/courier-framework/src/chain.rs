//! Multi-step conversations.
//!
//! A [`Chain`] is an ordered list of stages (conditional handlers). Each user
//! is either not in the chain or at stage `i`:
//!
//! ```text
//!             stage 0 accepts                stage i accepts
//! NOT_IN_CHAIN ──────────────▶ AT_STAGE(1) ─ ··· ─────────────▶ AT_STAGE(i+1)
//!      ▲                              │
//!      └──────── cancel accepts ──────┘
//! ```
//!
//! While a user is tracked, the chain captures all of their messages: anything
//! that matches neither the cancel handler nor the current stage is dropped.
//!
//! The index advances right after a stage accepts, even past the last stage.
//! The next message from that user finds an out-of-range index and either
//! wraps to stage 0 (looping chains) or evicts the user and tries stage 0 as
//! a fresh entry.
//!
//! Every routing decision for a chain happens under the chain's lock, so two
//! concurrent messages from one user can never observe the same stage.
//! Actions run after the lock is released, and a failing action does not roll
//! the index back.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::context::Context;
use crate::handler::{BoxedHandler, HandlerFuture};

/// The outcome of offering a message to a chain.
pub enum ChainRoute {
    /// The user is not tracked and stage 0 did not accept.
    Unclaimed,
    /// The user is tracked but nothing accepted; the message is dropped.
    Captured,
    /// Stage `stage` accepted; its invocation is bound in `work`.
    Stage { stage: usize, work: HandlerFuture },
    /// The cancel handler accepted and the user was evicted.
    Cancelled { work: HandlerFuture },
}

impl ChainRoute {
    /// Whether the chain claimed the message, stopping further dispatch.
    pub fn is_claimed(&self) -> bool {
        !matches!(self, Self::Unclaimed)
    }
}

impl std::fmt::Debug for ChainRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unclaimed => f.write_str("Unclaimed"),
            Self::Captured => f.write_str("Captured"),
            Self::Stage { stage, .. } => f.debug_struct("Stage").field("stage", stage).finish(),
            Self::Cancelled { .. } => f.write_str("Cancelled"),
        }
    }
}

/// An ordered, stateful sequence of handlers modeling a conversation.
pub struct Chain {
    name: String,
    stages: Vec<BoxedHandler>,
    cancel: Option<BoxedHandler>,
    looping: bool,
    /// User id to index of the next stage to test.
    progress: Mutex<HashMap<i64, usize>>,
}

impl Chain {
    pub(crate) fn new(
        name: String,
        stages: Vec<BoxedHandler>,
        cancel: Option<BoxedHandler>,
        looping: bool,
    ) -> Self {
        Self {
            name,
            stages,
            cancel,
            looping,
            progress: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// The stored stage index for `user_id`.
    ///
    /// May equal [`stage_count`](Self::stage_count) right after the last
    /// stage ran; the entry is cleaned up on the user's next message.
    pub fn stage_of(&self, user_id: i64) -> Option<usize> {
        self.progress.lock().get(&user_id).copied()
    }

    /// Returns `true` if the user's next message will be captured by this chain.
    pub fn is_tracking(&self, user_id: i64) -> bool {
        self.stage_of(user_id)
            .is_some_and(|index| self.looping || index < self.stages.len())
    }

    /// Number of users with a stored entry.
    pub fn tracked_users(&self) -> usize {
        self.progress.lock().len()
    }

    /// Drops the user's progress.
    pub fn reset(&self, user_id: i64) {
        self.progress.lock().remove(&user_id);
    }

    /// Routes one message and applies the resulting transition.
    pub fn route(&self, ctx: &Arc<Context>) -> ChainRoute {
        let user = ctx.message().sender_id();
        let mut progress = self.progress.lock();

        let Some(index) = progress.get(&user).copied() else {
            return self.enter(&mut progress, user, ctx);
        };

        if let Some(cancel) = &self.cancel
            && let Some(work) = cancel.accept(ctx)
        {
            progress.remove(&user);
            debug!(chain = %self.name, user_id = user, stage = index, "Chain cancelled");
            return ChainRoute::Cancelled { work };
        }

        if index >= self.stages.len() {
            if self.looping {
                trace!(chain = %self.name, user_id = user, "Chain wrapped to first stage");
                return self.try_stage(&mut progress, user, 0, ctx);
            }
            progress.remove(&user);
            trace!(chain = %self.name, user_id = user, "Chain completed, user evicted");
            return self.enter(&mut progress, user, ctx);
        }

        self.try_stage(&mut progress, user, index, ctx)
    }

    /// Offers stage 0 to an untracked user.
    fn enter(
        &self,
        progress: &mut HashMap<i64, usize>,
        user: i64,
        ctx: &Arc<Context>,
    ) -> ChainRoute {
        match self.stages.first().and_then(|stage| stage.accept(ctx)) {
            Some(work) => {
                progress.insert(user, 1);
                debug!(chain = %self.name, user_id = user, "User entered chain");
                ChainRoute::Stage { stage: 0, work }
            }
            None => ChainRoute::Unclaimed,
        }
    }

    /// Tests stage `index` for a tracked user.
    fn try_stage(
        &self,
        progress: &mut HashMap<i64, usize>,
        user: i64,
        index: usize,
        ctx: &Arc<Context>,
    ) -> ChainRoute {
        match self.stages.get(index).and_then(|stage| stage.accept(ctx)) {
            Some(work) => {
                progress.insert(user, index + 1);
                debug!(chain = %self.name, user_id = user, stage = index, "Chain stage accepted");
                ChainRoute::Stage { stage: index, work }
            }
            None => {
                progress.insert(user, index);
                trace!(chain = %self.name, user_id = user, stage = index, "Off-script message dropped");
                ChainRoute::Captured
            }
        }
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("name", &self.name)
            .field("stage_count", &self.stages.len())
            .field("has_cancel", &self.cancel.is_some())
            .field("looping", &self.looping)
            .field("tracked_users", &self.tracked_users())
            .finish()
    }
}
