// src/triggers/dispatcher.rs
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};

use crate::error::SentinelError;

use super::{LineEvent, TriggerContext, TriggerRegistry};

#[derive(Debug, Default)]
struct Counters {
    lines: AtomicU64,
    matched: AtomicU64,
    parse_errors: AtomicU64,
    handler_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub lines: u64,
    pub matched: u64,
    pub parse_errors: u64,
    pub handler_errors: u64,
}

/// Sequential dispatcher for one server's console stream.
///
/// `dispatch` awaits every matching action before returning, so lines from
/// one stream are handled strictly in order. Action errors are counted and
/// logged; nothing here stops the stream.
pub struct StreamDispatcher {
    server_id: Option<i64>,
    registry: Arc<TriggerRegistry>,
    ctx: Arc<TriggerContext>,
    counters: Counters,
}

impl StreamDispatcher {
    pub fn new(server_id: Option<i64>, registry: Arc<TriggerRegistry>, ctx: Arc<TriggerContext>) -> Self {
        Self {
            server_id,
            registry,
            ctx,
            counters: Counters::default(),
        }
    }

    pub fn server_id(&self) -> Option<i64> {
        self.server_id
    }

    /// Runs every trigger whose condition holds for `line`, in registration
    /// order. Returns how many triggers matched.
    pub async fn dispatch(&self, line: &str) -> usize {
        self.counters.lines.fetch_add(1, Ordering::Relaxed);
        let event = LineEvent {
            server_id: self.server_id,
            line,
        };

        let mut matched = 0;
        for trigger in self.registry.iter().filter(|t| t.matches(line)) {
            matched += 1;
            debug!("Trigger {} matched on server {:?}", trigger.name, self.server_id);

            match trigger.action.run(&self.ctx, event).await {
                Ok(()) => {}
                Err(e @ SentinelError::Parse { .. }) => {
                    self.counters.parse_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("{}", e);
                }
                Err(e) => {
                    self.counters.handler_errors.fetch_add(1, Ordering::Relaxed);
                    error!("Trigger {} failed on server {:?}: {}", trigger.name, self.server_id, e);
                }
            }
        }

        if matched > 0 {
            self.counters.matched.fetch_add(1, Ordering::Relaxed);
        }
        matched
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            lines: self.counters.lines.load(Ordering::Relaxed),
            matched: self.counters.matched.load(Ordering::Relaxed),
            parse_errors: self.counters.parse_errors.load(Ordering::Relaxed),
            handler_errors: self.counters.handler_errors.load(Ordering::Relaxed),
        }
    }
}
