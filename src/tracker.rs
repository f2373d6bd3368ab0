// src/tracker.rs
use std::sync::Arc;

use log::{debug, info};

use crate::error::{SentinelResult, StorageError};
use crate::identity::IdentityResolver;
use crate::models::stats::StatsSnapshot;
use crate::storage::{PlayerStore, ServerCatalog, StatsStore};

/// Identity resolution feeding the player and stats stores.
///
/// Every step propagates its error: a failed lookup abandons the persistence
/// side of the event and leaves earlier steps as they were. Store calls run
/// on the blocking pool.
pub struct PlayerTracker {
    identity: IdentityResolver,
    servers: Arc<dyn ServerCatalog>,
    players: Arc<dyn PlayerStore>,
    stats: Arc<dyn StatsStore>,
}

async fn blocking<T, F>(op: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| StorageError::Backend(format!("Storage task failed: {}", e)))?
}

impl PlayerTracker {
    pub fn new(
        identity: IdentityResolver,
        servers: Arc<dyn ServerCatalog>,
        players: Arc<dyn PlayerStore>,
        stats: Arc<dyn StatsStore>,
    ) -> Self {
        Self {
            identity,
            servers,
            players,
            stats,
        }
    }

    async fn game_of(&self, server_id: i64) -> Result<String, StorageError> {
        let servers = Arc::clone(&self.servers);
        blocking(move || servers.game_of(server_id)).await
    }

    /// Resolves `display_name` in the game run by `server_id`.
    pub async fn account_for(&self, server_id: i64, display_name: &str) -> SentinelResult<(String, String)> {
        let game = self.game_of(server_id).await?;
        let account_id = self.identity.resolve(display_name, &game).await?;
        Ok((game, account_id))
    }

    /// Records a join: ensures the player row exists, then logs the connection.
    /// Returns the internal player id.
    pub async fn record_join(&self, server_id: i64, display_name: &str) -> SentinelResult<i64> {
        let (game, account_id) = self.account_for(server_id, display_name).await?;

        let players = Arc::clone(&self.players);
        let player = blocking(move || {
            let player_id = players.ensure_player(&game, &account_id)?;
            players.record_connection(server_id, player_id)
        })
        .await?;

        info!(
            "Saved connection of {} (player {}, {} account {}) on server {}",
            display_name, player.id, player.game, player.account_id, server_id
        );
        Ok(player.id)
    }

    /// Stores the latest cumulative `snapshot` for `account_id` on `server_id`.
    /// The server must be provisioned.
    pub async fn sync_stats(
        &self,
        server_id: i64,
        account_id: &str,
        snapshot: StatsSnapshot,
    ) -> SentinelResult<()> {
        self.game_of(server_id).await?;

        let stats = Arc::clone(&self.stats);
        let account = account_id.to_string();
        blocking(move || stats.sync_stats(server_id, &account, snapshot)).await?;

        debug!("Synced stats of {} on server {}", account_id, server_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IdentityError, SentinelError, StorageError};
    use crate::identity::{AccountResolver, MINECRAFT};
    use crate::models::server::Server;
    use crate::storage::sqlite::SqliteStorage;
    use async_trait::async_trait;

    struct TableResolver;

    #[async_trait]
    impl AccountResolver for TableResolver {
        async fn resolve(&self, display_name: &str) -> Result<String, IdentityError> {
            match display_name {
                "Notch" => Ok("uuid-notch".to_string()),
                "jeb_" => Ok("uuid-jeb".to_string()),
                "Offline" => Err(IdentityError::LookupFailed {
                    name: display_name.to_string(),
                    reason: "status 503".to_string(),
                }),
                _ => Err(IdentityError::NotFound(display_name.to_string())),
            }
        }
    }

    fn server(id: i64, game: &str) -> Server {
        Server {
            id,
            name: format!("server-{}", id),
            game: game.to_string(),
            version: "1.21.1".to_string(),
            modpack: "Vanilla".to_string(),
            modpack_url: None,
            world_name: "world".to_string(),
            color: "#000000".to_string(),
            path: "/srv".to_string(),
            start_command: "start.sh".to_string(),
            active: true,
            global: true,
        }
    }

    fn tracker() -> (PlayerTracker, Arc<SqliteStorage>) {
        let storage = Arc::new(SqliteStorage::in_memory().unwrap());
        storage.provision_server(&server(1, MINECRAFT)).unwrap();
        storage.provision_server(&server(2, MINECRAFT)).unwrap();
        storage.provision_server(&server(3, "Terraria")).unwrap();

        let identity = IdentityResolver::new().with(MINECRAFT, Arc::new(TableResolver));
        let tracker = PlayerTracker::new(identity, storage.clone(), storage.clone(), storage.clone());
        (tracker, storage)
    }

    #[tokio::test]
    async fn join_creates_player_once_and_logs_every_connection() {
        let (tracker, storage) = tracker();

        let first = tracker.record_join(1, "Notch").await.unwrap();
        let second = tracker.record_join(2, "Notch").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(storage.player_count(), 1);
        let servers: Vec<i64> = storage.connections().iter().map(|c| c.0).collect();
        assert_eq!(servers, vec![1, 2]);
    }

    #[tokio::test]
    async fn concurrent_joins_from_two_streams_share_one_player() {
        let (tracker, storage) = tracker();
        let tracker = Arc::new(tracker);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                tokio::spawn(async move { tracker.record_join(1 + i % 2, "jeb_").await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(storage.player_count(), 1);
        assert_eq!(storage.connections().len(), 8);
    }

    #[tokio::test]
    async fn unknown_game_abandons_persistence() {
        let (tracker, storage) = tracker();

        let err = tracker.record_join(3, "Notch").await.unwrap_err();
        assert!(matches!(err, SentinelError::Identity(IdentityError::UnknownGame(_))));
        assert_eq!(storage.player_count(), 0);
        assert!(storage.connections().is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_abandons_persistence() {
        let (tracker, storage) = tracker();

        let err = tracker.record_join(1, "Offline").await.unwrap_err();
        assert!(matches!(err, SentinelError::Identity(IdentityError::LookupFailed { .. })));
        assert_eq!(storage.player_count(), 0);
    }

    #[tokio::test]
    async fn unknown_server_is_a_storage_error() {
        let (tracker, _) = tracker();

        let err = tracker.record_join(99, "Notch").await.unwrap_err();
        assert!(matches!(err, SentinelError::Storage(StorageError::ServerNotFound(99))));
    }

    #[tokio::test]
    async fn stats_sync_keeps_only_latest_snapshot() {
        let (tracker, storage) = tracker();

        tracker
            .sync_stats(1, "uuid-notch", StatsSnapshot { kills: 5, ..Default::default() })
            .await
            .unwrap();
        tracker
            .sync_stats(1, "uuid-notch", StatsSnapshot { kills: 9, deaths: 2, ..Default::default() })
            .await
            .unwrap();

        let row = storage.stats(1, "uuid-notch").unwrap();
        assert_eq!(row.snapshot.kills, 9);
        assert_eq!(row.snapshot.deaths, 2);
        assert_eq!(storage.stats_count(), 1);
    }

    #[tokio::test]
    async fn stats_for_unknown_server_are_rejected() {
        let (tracker, storage) = tracker();

        let err = tracker
            .sync_stats(99, "uuid-notch", StatsSnapshot::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SentinelError::Storage(StorageError::ServerNotFound(99))));
        assert_eq!(storage.stats_count(), 0);
    }

    #[tokio::test]
    async fn stats_sync_needs_no_identity_lookup() {
        let (tracker, storage) = tracker();

        // Terraria has no resolver; stats are keyed by account id directly.
        tracker
            .sync_stats(3, "terraria-account", StatsSnapshot { deaths: 1, ..Default::default() })
            .await
            .unwrap();
        assert!(storage.check_stats_exist(3, "terraria-account"));
    }
}
