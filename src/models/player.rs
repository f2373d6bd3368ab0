// src/models/player.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub game: String,
    pub account_id: String,
    pub first_seen: u64,
    pub last_seen: u64,
}
