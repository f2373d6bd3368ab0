// src/triggers/rules.rs
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

use crate::audit::AuditCategory;
use crate::error::{SentinelError, SentinelResult};
use crate::notifier::notify_best_effort;

use super::{LineEvent, Trigger, TriggerAction, TriggerContext};

lazy_static! {
    static ref PLAYER_JOINED: Regex =
        Regex::new(r"\[(\d{2}:\d{2}:\d{2})\] \[Server thread/INFO\]: (.+) joined the game")
            .expect("player joined pattern");
    static ref PLAYER_DISCONNECTED: Regex = Regex::new(
        r"\[(\d{2}:\d{2}:\d{2})\] \[Server thread/INFO\]: (.+) lost connection: Disconnected"
    )
    .expect("player disconnected pattern");
}

pub const JOINED_MARKER: &str = "joined the game";
pub const DISCONNECTED_MARKER: &str = "lost connection: Disconnected";
pub const ERROR_TAG: &str = "[ERROR]";

pub fn builtin_triggers() -> Vec<Trigger> {
    vec![
        Trigger::new("player-joined", |line| line.contains(JOINED_MARKER), PlayerJoined),
        Trigger::new(
            "player-disconnected",
            |line| line.contains(DISCONNECTED_MARKER),
            PlayerDisconnected,
        ),
        Trigger::new("error-line", |line| line.starts_with(ERROR_TAG), ErrorLine),
    ]
}

/// Player name captured by `pattern`, or a parse error naming `trigger`.
fn capture_name<'a>(pattern: &Regex, trigger: &'static str, line: &'a str) -> SentinelResult<&'a str> {
    pattern
        .captures(line)
        .and_then(|caps| caps.get(2))
        .map(|name| name.as_str())
        .ok_or_else(|| SentinelError::Parse {
            trigger,
            line: line.to_string(),
        })
}

pub struct PlayerJoined;

#[async_trait]
impl TriggerAction for PlayerJoined {
    async fn run(&self, ctx: &TriggerContext, event: LineEvent<'_>) -> SentinelResult<()> {
        let name = capture_name(&PLAYER_JOINED, "player-joined", event.line)?;
        info!("Player joined: {}", name);

        notify_best_effort(ctx.notifier.as_ref(), &format!("Player joined: {}", name)).await;
        ctx.audit.record(AuditCategory::Joined, name).await;

        if let (Some(tracker), Some(server_id)) = (ctx.tracker.as_ref(), event.server_id) {
            tracker.record_join(server_id, name).await?;
        }
        Ok(())
    }
}

pub struct PlayerDisconnected;

#[async_trait]
impl TriggerAction for PlayerDisconnected {
    async fn run(&self, ctx: &TriggerContext, event: LineEvent<'_>) -> SentinelResult<()> {
        let name = capture_name(&PLAYER_DISCONNECTED, "player-disconnected", event.line)?;
        info!("Player disconnected: {}", name);

        notify_best_effort(ctx.notifier.as_ref(), &format!("Player disconnected: {}", name)).await;
        ctx.audit.record(AuditCategory::Disconnected, name).await;
        Ok(())
    }
}

pub struct ErrorLine;

#[async_trait]
impl TriggerAction for ErrorLine {
    async fn run(&self, ctx: &TriggerContext, event: LineEvent<'_>) -> SentinelResult<()> {
        warn!("Error detected: {}", event.line);
        ctx.audit.record(AuditCategory::Errors, event.line).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(name: &str) -> fn(&str) -> bool {
        builtin_triggers()
            .into_iter()
            .find(|t| t.name == name)
            .map(|t| t.condition)
            .unwrap()
    }

    #[test]
    fn builtin_order_is_join_disconnect_error() {
        let names: Vec<&str> = builtin_triggers().iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["player-joined", "player-disconnected", "error-line"]);
    }

    #[test]
    fn conditions_are_coarse_substring_tests() {
        let joined = condition("player-joined");
        let disconnected = condition("player-disconnected");
        let error = condition("error-line");

        assert!(joined("garbage joined the game garbage"));
        assert!(!joined("[12:04:11] [Server thread/INFO]: Notch left the game"));
        assert!(disconnected("x lost connection: Disconnected"));
        assert!(!disconnected("x lost connection: Timed out"));
        assert!(error("[ERROR] Disk full"));
        assert!(!error("[12:00:00] [ERROR] not at the start"));
    }

    #[test]
    fn captures_player_names() {
        let line = "[12:04:11] [Server thread/INFO]: Notch joined the game";
        assert_eq!(capture_name(&PLAYER_JOINED, "player-joined", line).unwrap(), "Notch");

        let line = "[12:05:02] [Server thread/INFO]: Notch lost connection: Disconnected";
        assert_eq!(
            capture_name(&PLAYER_DISCONNECTED, "player-disconnected", line).unwrap(),
            "Notch"
        );
    }

    #[test]
    fn malformed_join_is_a_parse_error() {
        let err = capture_name(&PLAYER_JOINED, "player-joined", "[Server thread/INFO]: joined the game")
            .unwrap_err();
        assert!(matches!(err, SentinelError::Parse { trigger: "player-joined", .. }));
    }
}
