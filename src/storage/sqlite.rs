// src/storage/sqlite.rs
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use crate::error::StorageError;
use crate::models::player::Player;
use crate::models::server::{Server, ServerParameters};
use crate::models::stats::{PlayerStats, StatsSnapshot};
use crate::storage::{PlayerStore, ServerCatalog, StatsStore};
use crate::utils::now_secs;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS servers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    game TEXT NOT NULL,
    version TEXT NOT NULL,
    modpack TEXT NOT NULL DEFAULT 'Vanilla',
    modpack_url TEXT,
    world_name TEXT NOT NULL DEFAULT 'world',
    color TEXT NOT NULL DEFAULT '#000000',
    path TEXT NOT NULL,
    start_command TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 0,
    global INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS server_parameters (
    singleton INTEGER PRIMARY KEY CHECK (singleton = 1),
    primary_id INTEGER NOT NULL,
    secondary_id INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS players (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    game TEXT NOT NULL,
    account_id TEXT NOT NULL,
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    UNIQUE (game, account_id)
);
CREATE TABLE IF NOT EXISTS connection_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    server_id INTEGER NOT NULL,
    player_id INTEGER NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS player_stats (
    server_id INTEGER NOT NULL,
    account_id TEXT NOT NULL,
    play_time INTEGER NOT NULL DEFAULT 0,
    deaths INTEGER NOT NULL DEFAULT 0,
    kills INTEGER NOT NULL DEFAULT 0,
    player_kills INTEGER NOT NULL DEFAULT 0,
    mobs_killed TEXT NOT NULL DEFAULT '{}',
    blocks_destroyed INTEGER NOT NULL DEFAULT 0,
    blocks_placed INTEGER NOT NULL DEFAULT 0,
    distance_total INTEGER NOT NULL DEFAULT 0,
    distance_on_foot INTEGER NOT NULL DEFAULT 0,
    distance_glider INTEGER NOT NULL DEFAULT 0,
    distance_flight INTEGER NOT NULL DEFAULT 0,
    items_crafted TEXT NOT NULL DEFAULT '{}',
    items_broken TEXT NOT NULL DEFAULT '{}',
    achievements TEXT NOT NULL DEFAULT '[]',
    last_recorded INTEGER NOT NULL,
    PRIMARY KEY (server_id, account_id)
);
"#;

const SERVER_COLUMNS: &str = "id, name, game, version, modpack, modpack_url, world_name, color, \
                              path, start_command, active, global";

/// SQLite-backed store for servers, players, connections and stats.
///
/// Uniqueness lives in the schema (`UNIQUE (game, account_id)` and the
/// `(server_id, account_id)` primary key); every write is one upsert or one
/// transaction, so several processes may share the same database file.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                StorageError::Backend(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        info!("Opened database {}", path.display());
        Self::bootstrap(conn)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StorageError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts or replaces a server row. Administrative, not reachable from
    /// the dispatcher.
    pub fn provision_server(&self, server: &Server) -> Result<(), StorageError> {
        debug!("Provisioning server {} ({})", server.id, server.name);
        self.conn.lock().execute(
            "
            INSERT INTO servers (
                id, name, game, version, modpack, modpack_url, world_name, color,
                path, start_command, active, global
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                game = excluded.game,
                version = excluded.version,
                modpack = excluded.modpack,
                modpack_url = excluded.modpack_url,
                world_name = excluded.world_name,
                color = excluded.color,
                path = excluded.path,
                start_command = excluded.start_command,
                active = excluded.active,
                global = excluded.global
            ",
            params![
                server.id,
                server.name,
                server.game,
                server.version,
                server.modpack,
                server.modpack_url,
                server.world_name,
                server.color,
                server.path,
                server.start_command,
                server.active,
                server.global,
            ],
        )?;
        Ok(())
    }

    /// Seeds the catalog from a JSON array of server rows.
    pub fn provision_from_file(&self, path: &Path) -> Result<usize, StorageError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Backend(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let servers: Vec<Server> = serde_json::from_str(&raw).map_err(|e| {
            StorageError::Backend(format!("Invalid server list in {}: {}", path.display(), e))
        })?;

        for server in &servers {
            self.provision_server(server)?;
        }
        info!("Loaded {} servers from {}", servers.len(), path.display());
        Ok(servers.len())
    }

    pub fn set_server_parameters(&self, parameters: ServerParameters) -> Result<(), StorageError> {
        self.conn.lock().execute(
            "
            INSERT INTO server_parameters (singleton, primary_id, secondary_id) VALUES (1, ?1, ?2)
            ON CONFLICT(singleton) DO UPDATE SET
                primary_id = excluded.primary_id,
                secondary_id = excluded.secondary_id
            ",
            params![parameters.primary_id, parameters.secondary_id],
        )?;
        Ok(())
    }

    fn map_server(row: &Row<'_>) -> rusqlite::Result<Server> {
        Ok(Server {
            id: row.get(0)?,
            name: row.get(1)?,
            game: row.get(2)?,
            version: row.get(3)?,
            modpack: row.get(4)?,
            modpack_url: row.get(5)?,
            world_name: row.get(6)?,
            color: row.get(7)?,
            path: row.get(8)?,
            start_command: row.get(9)?,
            active: row.get(10)?,
            global: row.get(11)?,
        })
    }

    fn map_player(row: &Row<'_>) -> rusqlite::Result<Player> {
        Ok(Player {
            id: row.get(0)?,
            game: row.get(1)?,
            account_id: row.get(2)?,
            first_seen: row.get::<_, i64>(3)? as u64,
            last_seen: row.get::<_, i64>(4)? as u64,
        })
    }

    fn upsert_stats(&self, row: &PlayerStats) -> Result<(), StorageError> {
        let to_json = |value: Result<String, serde_json::Error>| {
            value.map_err(|e| StorageError::Backend(format!("Failed to encode stats: {}", e)))
        };
        let snapshot = &row.snapshot;
        let mobs_killed = to_json(serde_json::to_string(&snapshot.mobs_killed))?;
        let items_crafted = to_json(serde_json::to_string(&snapshot.items_crafted))?;
        let items_broken = to_json(serde_json::to_string(&snapshot.items_broken))?;
        let achievements = to_json(serde_json::to_string(&snapshot.achievements))?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "
            INSERT INTO player_stats (
                server_id, account_id, play_time, deaths, kills, player_kills,
                mobs_killed, blocks_destroyed, blocks_placed, distance_total, distance_on_foot,
                distance_glider, distance_flight, items_crafted, items_broken, achievements,
                last_recorded
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            ON CONFLICT(server_id, account_id) DO UPDATE SET
                play_time = excluded.play_time,
                deaths = excluded.deaths,
                kills = excluded.kills,
                player_kills = excluded.player_kills,
                mobs_killed = excluded.mobs_killed,
                blocks_destroyed = excluded.blocks_destroyed,
                blocks_placed = excluded.blocks_placed,
                distance_total = excluded.distance_total,
                distance_on_foot = excluded.distance_on_foot,
                distance_glider = excluded.distance_glider,
                distance_flight = excluded.distance_flight,
                items_crafted = excluded.items_crafted,
                items_broken = excluded.items_broken,
                achievements = excluded.achievements,
                last_recorded = excluded.last_recorded
            ",
            params![
                row.server_id,
                row.account_id,
                snapshot.play_time,
                snapshot.deaths,
                snapshot.kills,
                snapshot.player_kills,
                mobs_killed,
                snapshot.blocks_destroyed,
                snapshot.blocks_placed,
                snapshot.distance_total,
                snapshot.distance_on_foot,
                snapshot.distance_glider,
                snapshot.distance_flight,
                items_crafted,
                items_broken,
                achievements,
                row.last_recorded as i64,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }
}

impl ServerCatalog for SqliteStorage {
    fn all_servers(&self) -> Result<Vec<Server>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM servers ORDER BY id", SERVER_COLUMNS))?;
        let servers = stmt
            .query_map([], Self::map_server)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(servers)
    }

    fn servers_for_game(&self, game: &str) -> Result<Vec<Server>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM servers WHERE game = ?1 ORDER BY id",
            SERVER_COLUMNS
        ))?;
        let servers = stmt
            .query_map(params![game], Self::map_server)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(servers)
    }

    fn server_by_id(&self, id: i64) -> Result<Server, StorageError> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM servers WHERE id = ?1", SERVER_COLUMNS),
                params![id],
                Self::map_server,
            )
            .optional()?
            .ok_or(StorageError::ServerNotFound(id))
    }

    fn server_parameters(&self) -> Result<Option<ServerParameters>, StorageError> {
        let parameters = self
            .conn
            .lock()
            .query_row(
                "SELECT primary_id, secondary_id FROM server_parameters WHERE singleton = 1",
                [],
                |row| {
                    Ok(ServerParameters {
                        primary_id: row.get(0)?,
                        secondary_id: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(parameters)
    }
}

impl PlayerStore for SqliteStorage {
    fn ensure_player(&self, game: &str, account_id: &str) -> Result<i64, StorageError> {
        let now = now_secs() as i64;
        let mut conn = self.conn.lock();
        // Immediate so that writers from other connections queue on the
        // busy timeout instead of failing a lock upgrade.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = tx.query_row(
            "
            INSERT INTO players (game, account_id, first_seen, last_seen) VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(game, account_id) DO UPDATE SET last_seen = last_seen
            RETURNING id
            ",
            params![game, account_id, now],
            |row| row.get(0),
        )?;
        tx.commit()?;
        debug!("{} account {} is player {}", game, account_id, id);
        Ok(id)
    }

    fn record_connection(&self, server_id: i64, player_id: i64) -> Result<Player, StorageError> {
        let now = now_secs() as i64;
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let player = tx
            .query_row(
                "
                UPDATE players SET last_seen = ?1 WHERE id = ?2
                RETURNING id, game, account_id, first_seen, last_seen
                ",
                params![now, player_id],
                Self::map_player,
            )
            .optional()?
            .ok_or(StorageError::PlayerNotFound(player_id))?;

        tx.execute(
            "INSERT INTO connection_log (server_id, player_id, timestamp) VALUES (?1, ?2, ?3)",
            params![server_id, player_id, now],
        )?;
        tx.commit()?;

        debug!("Connection of player {} recorded on server {}", player_id, server_id);
        Ok(player)
    }
}

impl StatsStore for SqliteStorage {
    fn sync_stats(
        &self,
        server_id: i64,
        account_id: &str,
        snapshot: StatsSnapshot,
    ) -> Result<(), StorageError> {
        let row = PlayerStats {
            server_id,
            account_id: account_id.to_string(),
            snapshot,
            last_recorded: now_secs(),
        };
        self.upsert_stats(&row)?;
        debug!("Stats synced for {} on server {}", account_id, server_id);
        Ok(())
    }
}

#[cfg(test)]
impl SqliteStorage {
    pub fn player(&self, player_id: i64) -> Option<Player> {
        self.conn
            .lock()
            .query_row(
                "SELECT id, game, account_id, first_seen, last_seen FROM players WHERE id = ?1",
                params![player_id],
                Self::map_player,
            )
            .optional()
            .unwrap()
    }

    pub fn player_count(&self) -> usize {
        self.count("SELECT COUNT(*) FROM players")
    }

    pub fn stats_count(&self) -> usize {
        self.count("SELECT COUNT(*) FROM player_stats")
    }

    /// `(server_id, player_id)` of every logged connection, oldest first.
    pub fn connections(&self) -> Vec<(i64, i64)> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT server_id, player_id FROM connection_log ORDER BY id")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    pub fn check_stats_exist(&self, server_id: i64, account_id: &str) -> bool {
        self.conn
            .lock()
            .query_row(
                "SELECT 1 FROM player_stats WHERE server_id = ?1 AND account_id = ?2",
                params![server_id, account_id],
                |_| Ok(()),
            )
            .optional()
            .unwrap()
            .is_some()
    }

    pub fn stats(&self, server_id: i64, account_id: &str) -> Option<PlayerStats> {
        self.conn
            .lock()
            .query_row(
                "
                SELECT play_time, deaths, kills, player_kills, mobs_killed, blocks_destroyed,
                       blocks_placed, distance_total, distance_on_foot, distance_glider,
                       distance_flight, items_crafted, items_broken, achievements, last_recorded
                FROM player_stats WHERE server_id = ?1 AND account_id = ?2
                ",
                params![server_id, account_id],
                |row| {
                    let json = |idx: usize| -> rusqlite::Result<String> { row.get(idx) };
                    Ok(PlayerStats {
                        server_id,
                        account_id: account_id.to_string(),
                        snapshot: StatsSnapshot {
                            play_time: row.get(0)?,
                            deaths: row.get(1)?,
                            kills: row.get(2)?,
                            player_kills: row.get(3)?,
                            mobs_killed: serde_json::from_str(&json(4)?).unwrap(),
                            blocks_destroyed: row.get(5)?,
                            blocks_placed: row.get(6)?,
                            distance_total: row.get(7)?,
                            distance_on_foot: row.get(8)?,
                            distance_glider: row.get(9)?,
                            distance_flight: row.get(10)?,
                            items_crafted: serde_json::from_str(&json(11)?).unwrap(),
                            items_broken: serde_json::from_str(&json(12)?).unwrap(),
                            achievements: serde_json::from_str(&json(13)?).unwrap(),
                        },
                        last_recorded: row.get::<_, i64>(14)? as u64,
                    })
                },
            )
            .optional()
            .unwrap()
    }

    fn count(&self, sql: &str) -> usize {
        let count: i64 = self.conn.lock().query_row(sql, [], |row| row.get(0)).unwrap();
        count as usize
    }
}
