// src/models/stats.rs
use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Cumulative statistics sampled for one player at one point in time.
///
/// Values are totals, not deltas: storing a snapshot replaces whatever was
/// recorded before.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSnapshot {
    pub play_time: i64,
    pub deaths: i64,
    pub kills: i64,
    pub player_kills: i64,
    pub mobs_killed: HashMap<String, i64>,
    pub blocks_destroyed: i64,
    pub blocks_placed: i64,
    pub distance_total: i64,
    pub distance_on_foot: i64,
    pub distance_glider: i64,
    pub distance_flight: i64,
    pub items_crafted: HashMap<String, i64>,
    pub items_broken: HashMap<String, i64>,
    pub achievements: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub server_id: i64,
    pub account_id: String,
    #[serde(flatten)]
    pub snapshot: StatsSnapshot,
    pub last_recorded: u64,
}
