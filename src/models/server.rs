// src/models/server.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub game: String,
    pub version: String,
    #[serde(default = "default_modpack")]
    pub modpack: String,
    #[serde(default)]
    pub modpack_url: Option<String>,
    #[serde(default = "default_world_name")]
    pub world_name: String,
    #[serde(default = "default_color")]
    pub color: String,
    pub path: String,
    pub start_command: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default = "default_global")]
    pub global: bool,
}

/// Pairing of the primary and secondary servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerParameters {
    pub primary_id: i64,
    pub secondary_id: i64,
}

fn default_modpack() -> String {
    "Vanilla".to_string()
}

fn default_world_name() -> String {
    "world".to_string()
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_global() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_columns_take_defaults() {
        let server: Server = serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "survival",
            "game": "Minecraft",
            "version": "1.21.1",
            "path": "/srv/survival",
            "start_command": "start.sh"
        }))
        .unwrap();

        assert_eq!(server.modpack, "Vanilla");
        assert_eq!(server.modpack_url, None);
        assert_eq!(server.world_name, "world");
        assert_eq!(server.color, "#000000");
        assert!(!server.active);
        assert!(server.global);
    }
}
