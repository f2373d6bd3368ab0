// src/stats_sync.rs
//! Periodic import of Minecraft's per-player statistics files.
//!
//! A Minecraft world keeps `stats/<uuid>.json` and `advancements/<uuid>.json`
//! for every player that ever joined. Each sweep reads them for every
//! provisioned Minecraft server and stores the totals through the tracker.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use serde::Deserialize;
use tokio::io;
use tokio::time::MissedTickBehavior;

use crate::error::{SnapshotError, StorageError};
use crate::identity::MINECRAFT;
use crate::models::server::Server;
use crate::models::stats::StatsSnapshot;
use crate::storage::ServerCatalog;
use crate::tracker::PlayerTracker;
use crate::utils::normalize_account_id;

#[derive(Debug, Default, Deserialize)]
struct StatsFile {
    #[serde(default)]
    stats: HashMap<String, HashMap<String, i64>>,
}

const ON_FOOT: [&str; 3] = [
    "minecraft:walk_one_cm",
    "minecraft:sprint_one_cm",
    "minecraft:crouch_one_cm",
];

/// Maps a `stats/<uuid>.json` document onto a snapshot. Achievements are
/// left empty; they live in a separate file.
///
/// `blocks_placed` counts every item use, which is the closest the game
/// records to placements.
pub fn parse_stats(raw: &str) -> Result<StatsSnapshot, serde_json::Error> {
    let mut file: StatsFile = serde_json::from_str(raw)?;
    let mut take = |category: &str| file.stats.remove(category).unwrap_or_default();

    let custom = take("minecraft:custom");
    let killed = take("minecraft:killed");
    let mined = take("minecraft:mined");
    let used = take("minecraft:used");
    let crafted = take("minecraft:crafted");
    let broken = take("minecraft:broken");

    let stat = |key: &str| custom.get(key).copied().unwrap_or(0);
    let play_time = custom
        .get("minecraft:play_time")
        .or_else(|| custom.get("minecraft:play_one_minute"))
        .copied()
        .unwrap_or(0);

    Ok(StatsSnapshot {
        play_time,
        deaths: stat("minecraft:deaths"),
        kills: stat("minecraft:mob_kills"),
        player_kills: stat("minecraft:player_kills"),
        blocks_destroyed: mined.values().sum(),
        blocks_placed: used.values().sum(),
        distance_total: custom
            .iter()
            .filter(|(key, _)| key.ends_with("_one_cm"))
            .map(|(_, cm)| cm)
            .sum(),
        distance_on_foot: ON_FOOT.iter().map(|key| stat(*key)).sum(),
        distance_glider: stat("minecraft:aviate_one_cm"),
        distance_flight: stat("minecraft:fly_one_cm"),
        mobs_killed: killed,
        items_crafted: crafted,
        items_broken: broken,
        achievements: BTreeSet::new(),
    })
}

/// Completed advancements from an `advancements/<uuid>.json` document.
/// Recipe unlocks are not achievements and are skipped.
pub fn parse_advancements(raw: &str) -> Result<BTreeSet<String>, serde_json::Error> {
    let entries: HashMap<String, serde_json::Value> = serde_json::from_str(raw)?;
    Ok(entries
        .into_iter()
        .filter(|(key, _)| !key.starts_with("minecraft:recipes/"))
        .filter(|(_, value)| value.get("done").and_then(serde_json::Value::as_bool).unwrap_or(false))
        .map(|(key, _)| key)
        .collect())
}

/// Reads one player's stats, adding advancements when the file exists.
pub async fn read_snapshot(stats_path: &Path, advancements_path: &Path) -> Result<StatsSnapshot, SnapshotError> {
    let mut snapshot = parse_stats(&tokio::fs::read_to_string(stats_path).await?)?;
    match tokio::fs::read_to_string(advancements_path).await {
        Ok(raw) => snapshot.achievements = parse_advancements(&raw)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(snapshot)
}

/// Syncs every player file of `server`'s world. Unreadable files and failed
/// writes are logged and skipped. Returns how many players were stored.
pub async fn sweep_server(tracker: &PlayerTracker, server: &Server) -> Result<usize, SnapshotError> {
    let world = Path::new(&server.path).join(&server.world_name);
    let mut entries = match tokio::fs::read_dir(world.join("stats")).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Server {} has no stats at {}", server.id, world.display());
            return Ok(0);
        }
        Err(e) => return Err(e.into()),
    };

    let mut synced = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        let advancements = world.join("advancements").join(format!("{}.json", stem));
        let snapshot = match read_snapshot(&path, &advancements).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let account_id = normalize_account_id(stem);
        match tracker.sync_stats(server.id, &account_id, snapshot).await {
            Ok(()) => synced += 1,
            Err(e) => error!("Failed to sync stats of {} on server {}: {}", account_id, server.id, e),
        }
    }

    info!("Synced stats of {} players on server {}", synced, server.id);
    Ok(synced)
}

async fn minecraft_servers(catalog: &Arc<dyn ServerCatalog>) -> Result<Vec<Server>, StorageError> {
    let catalog = Arc::clone(catalog);
    tokio::task::spawn_blocking(move || catalog.servers_for_game(MINECRAFT))
        .await
        .map_err(|e| StorageError::Backend(format!("Catalog task failed: {}", e)))?
}

/// Sweeps every Minecraft server in `catalog` once per `interval`, starting
/// immediately. Never returns; failures are logged and retried next tick.
pub async fn run_periodic(tracker: Arc<PlayerTracker>, catalog: Arc<dyn ServerCatalog>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Syncing player stats every {:?}", interval);

    loop {
        ticker.tick().await;

        let servers = match minecraft_servers(&catalog).await {
            Ok(servers) => servers,
            Err(e) => {
                error!("Failed to list servers for stats sync: {}", e);
                continue;
            }
        };
        for server in &servers {
            if let Err(e) = sweep_server(&tracker, server).await {
                error!("Stats sync failed for server {}: {}", server.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityResolver;
    use crate::storage::sqlite::SqliteStorage;
    use std::fs;

    const NOTCH: &str = "069a79f4-44e9-4726-a5be-fca90e38aaf5";

    const STATS: &str = r#"{
        "stats": {
            "minecraft:custom": {
                "minecraft:play_time": 72000,
                "minecraft:deaths": 3,
                "minecraft:mob_kills": 12,
                "minecraft:player_kills": 1,
                "minecraft:walk_one_cm": 1000,
                "minecraft:sprint_one_cm": 500,
                "minecraft:crouch_one_cm": 20,
                "minecraft:aviate_one_cm": 4000,
                "minecraft:fly_one_cm": 300,
                "minecraft:boat_one_cm": 80,
                "minecraft:jump": 44
            },
            "minecraft:killed": { "minecraft:zombie": 10, "minecraft:creeper": 2 },
            "minecraft:mined": { "minecraft:stone": 40, "minecraft:dirt": 2 },
            "minecraft:used": { "minecraft:torch": 5 },
            "minecraft:crafted": { "minecraft:torch": 8 },
            "minecraft:broken": { "minecraft:wooden_pickaxe": 1 }
        },
        "DataVersion": 3955
    }"#;

    const ADVANCEMENTS: &str = r#"{
        "minecraft:story/root": { "criteria": {}, "done": true },
        "minecraft:story/mine_stone": { "criteria": {}, "done": false },
        "minecraft:recipes/misc/torch": { "criteria": {}, "done": true },
        "DataVersion": 3955
    }"#;

    #[test]
    fn maps_minecraft_stats() {
        let snapshot = parse_stats(STATS).unwrap();

        assert_eq!(snapshot.play_time, 72000);
        assert_eq!(snapshot.deaths, 3);
        assert_eq!(snapshot.kills, 12);
        assert_eq!(snapshot.player_kills, 1);
        assert_eq!(snapshot.mobs_killed.get("minecraft:zombie"), Some(&10));
        assert_eq!(snapshot.blocks_destroyed, 42);
        assert_eq!(snapshot.blocks_placed, 5);
        assert_eq!(snapshot.distance_on_foot, 1520);
        assert_eq!(snapshot.distance_glider, 4000);
        assert_eq!(snapshot.distance_flight, 300);
        assert_eq!(snapshot.distance_total, 1000 + 500 + 20 + 4000 + 300 + 80);
        assert_eq!(snapshot.items_crafted.get("minecraft:torch"), Some(&8));
        assert_eq!(snapshot.items_broken.len(), 1);
        assert!(snapshot.achievements.is_empty());
    }

    #[test]
    fn older_worlds_report_play_one_minute() {
        let raw = r#"{"stats":{"minecraft:custom":{"minecraft:play_one_minute":600}}}"#;
        assert_eq!(parse_stats(raw).unwrap().play_time, 600);
        assert_eq!(parse_stats("{}").unwrap(), StatsSnapshot::default());
    }

    #[test]
    fn only_completed_advancements_count() {
        let done = parse_advancements(ADVANCEMENTS).unwrap();
        assert_eq!(done.into_iter().collect::<Vec<_>>(), vec!["minecraft:story/root".to_string()]);
    }

    fn setup() -> (tempfile::TempDir, Server, PlayerTracker, Arc<SqliteStorage>) {
        let dir = tempfile::tempdir().unwrap();
        let server = Server {
            id: 1,
            name: "survival".to_string(),
            game: MINECRAFT.to_string(),
            version: "1.21.1".to_string(),
            modpack: "Vanilla".to_string(),
            modpack_url: None,
            world_name: "world".to_string(),
            color: "#000000".to_string(),
            path: dir.path().to_string_lossy().into_owned(),
            start_command: "start.sh".to_string(),
            active: true,
            global: true,
        };
        let storage = Arc::new(SqliteStorage::in_memory().unwrap());
        storage.provision_server(&server).unwrap();
        let tracker = PlayerTracker::new(IdentityResolver::new(), storage.clone(), storage.clone(), storage.clone());
        (dir, server, tracker, storage)
    }

    fn write_world_file(dir: &Path, kind: &str, name: &str, contents: &str) {
        let folder = dir.join("world").join(kind);
        fs::create_dir_all(&folder).unwrap();
        fs::write(folder.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn sweep_stores_every_player_file() {
        let (dir, server, tracker, storage) = setup();
        write_world_file(dir.path(), "stats", "069a79f444e94726a5befca90e38aaf5.json", STATS);
        write_world_file(dir.path(), "advancements", "069a79f444e94726a5befca90e38aaf5.json", ADVANCEMENTS);
        write_world_file(dir.path(), "stats", "853c80ef-3c37-49fd-aa49-938b674adae6.json", "{}");
        write_world_file(dir.path(), "stats", "broken.json", "{ not json");
        write_world_file(dir.path(), "stats", "notes.txt", "ignored");

        assert_eq!(sweep_server(&tracker, &server).await.unwrap(), 2);

        let row = storage.stats(1, NOTCH).unwrap();
        assert_eq!(row.snapshot.kills, 12);
        assert!(row.snapshot.achievements.contains("minecraft:story/root"));
        assert!(storage.check_stats_exist(1, "853c80ef-3c37-49fd-aa49-938b674adae6"));
        assert_eq!(storage.stats_count(), 2);
    }

    #[tokio::test]
    async fn world_without_stats_is_skipped() {
        let (_dir, server, tracker, storage) = setup();

        assert_eq!(sweep_server(&tracker, &server).await.unwrap(), 0);
        assert_eq!(storage.stats_count(), 0);
    }

    #[tokio::test]
    async fn periodic_sync_reaches_the_store() {
        let (dir, _server, tracker, storage) = setup();
        write_world_file(dir.path(), "stats", "069a79f444e94726a5befca90e38aaf5.json", STATS);

        let sync = tokio::spawn(run_periodic(
            Arc::new(tracker),
            storage.clone(),
            Duration::from_millis(10),
        ));
        for _ in 0..200 {
            if storage.check_stats_exist(1, NOTCH) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sync.abort();

        assert_eq!(storage.stats(1, NOTCH).unwrap().snapshot.deaths, 3);
    }
}
