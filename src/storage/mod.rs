//! Persistence seams shared by every monitored stream.
//!
//! Each mutating operation is a single atomic step at the storage layer:
//! callers never compose a lookup with a later write.

pub mod sqlite;

use crate::error::StorageError;
use crate::models::player::Player;
use crate::models::server::{Server, ServerParameters};
use crate::models::stats::StatsSnapshot;

/// Read-only view of provisioned servers.
pub trait ServerCatalog: Send + Sync {
    fn all_servers(&self) -> Result<Vec<Server>, StorageError>;

    fn servers_for_game(&self, game: &str) -> Result<Vec<Server>, StorageError> {
        Ok(self
            .all_servers()?
            .into_iter()
            .filter(|server| server.game == game)
            .collect())
    }

    fn server_by_id(&self, id: i64) -> Result<Server, StorageError>;

    fn game_of(&self, id: i64) -> Result<String, StorageError> {
        self.server_by_id(id).map(|server| server.game)
    }

    fn server_parameters(&self) -> Result<Option<ServerParameters>, StorageError>;
}

pub trait PlayerStore: Send + Sync {
    /// Returns the internal id for `(game, account_id)`, creating the row if
    /// and only if none exists. Concurrent callers for the same key all get
    /// the same id.
    fn ensure_player(&self, game: &str, account_id: &str) -> Result<i64, StorageError>;

    /// Bumps the player's last-seen timestamp and appends a connection log
    /// entry in one transaction. Returns the updated player. An unknown
    /// player leaves both untouched.
    fn record_connection(&self, server_id: i64, player_id: i64) -> Result<Player, StorageError>;
}

pub trait StatsStore: Send + Sync {
    /// Replaces (or inserts) the stats row for `(server_id, account_id)` with
    /// `snapshot`, stamped with the current time.
    fn sync_stats(
        &self,
        server_id: i64,
        account_id: &str,
        snapshot: StatsSnapshot,
    ) -> Result<(), StorageError>;
}
