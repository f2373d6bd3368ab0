//! Trigger rules evaluated against every console line.
//!
//! A trigger is a cheap `condition` (substring or prefix test) paired with an
//! async action. The registry is built once at startup and never changes.

pub mod dispatcher;
pub mod rules;

use std::sync::Arc;

use async_trait::async_trait;

use crate::audit::AuditLogger;
use crate::error::SentinelResult;
use crate::notifier::Notifier;
use crate::tracker::PlayerTracker;

pub use dispatcher::StreamDispatcher;

/// Collaborators shared by every trigger action.
pub struct TriggerContext {
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<AuditLogger>,
    pub tracker: Option<Arc<PlayerTracker>>,
}

/// One console line, tagged with the server whose stream produced it.
#[derive(Debug, Clone, Copy)]
pub struct LineEvent<'a> {
    pub server_id: Option<i64>,
    pub line: &'a str,
}

#[async_trait]
pub trait TriggerAction: Send + Sync {
    async fn run(&self, ctx: &TriggerContext, event: LineEvent<'_>) -> SentinelResult<()>;
}

pub struct Trigger {
    pub name: &'static str,
    pub condition: fn(&str) -> bool,
    pub action: Box<dyn TriggerAction>,
}

impl Trigger {
    pub fn new(name: &'static str, condition: fn(&str) -> bool, action: impl TriggerAction + 'static) -> Self {
        Self {
            name,
            condition,
            action: Box::new(action),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        (self.condition)(line)
    }
}

/// Ordered, immutable list of triggers.
pub struct TriggerRegistry {
    triggers: Vec<Trigger>,
}

impl TriggerRegistry {
    pub fn new(triggers: Vec<Trigger>) -> Self {
        Self { triggers }
    }

    /// The compiled-in console triggers.
    pub fn builtin() -> Self {
        Self::new(rules::builtin_triggers())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.iter()
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }
}
