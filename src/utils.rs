// src/utils.rs
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Seconds since the Unix epoch. A clock set before 1970 reads as 0.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Canonical hyphenated form of an account UUID. Identity services hand out
/// both the simple (32 hex digits) and hyphenated spellings; anything that is
/// not a UUID is returned trimmed but otherwise untouched.
pub fn normalize_account_id(raw: &str) -> String {
    let raw = raw.trim();
    match Uuid::parse_str(raw) {
        Ok(id) => id.hyphenated().to_string(),
        Err(_) => raw.to_string(),
    }
}
