use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::server::ServerParameters;

#[derive(Clone, Debug)]
pub struct Config {
    // Discord bot
    pub bot_activated: bool,
    pub bot_token: Option<String>,
    pub discord_channel_id: Option<String>,
    pub discord_api_url: String,

    // Identity lookups
    pub mojang_api_url: String,

    // Audit logs
    pub log_dir: PathBuf,

    // Monitored streams and server catalog seed
    pub streams: Vec<StreamSource>,
    pub servers_file: Option<PathBuf>,
    pub poll_millis: u64,

    // Persistence
    pub db_path: PathBuf,
    pub server_parameters: Option<ServerParameters>,

    // Periodic stats sweep, in seconds; 0 disables it
    pub stats_interval_secs: u64,
}

/// One monitored log stream, bound to the server that emits it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSource {
    pub server_id: i64,
    pub path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_activated: true,
            bot_token: None,
            discord_channel_id: None,
            discord_api_url: "https://discord.com/api/v10".to_string(),
            mojang_api_url: "https://api.mojang.com".to_string(),
            log_dir: PathBuf::from("/var/log/serversentinel"),
            streams: Vec::new(),
            servers_file: None,
            poll_millis: 500,
            db_path: PathBuf::from("/var/lib/serversentinel/sentinel.db"),
            server_parameters: None,
            stats_interval_secs: 300,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bot_activated: env::var("SENTINEL_BOT_ACTIVATED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bot_activated),

            bot_token: non_empty_var("DISCORD_BOT_TOKEN"),

            discord_channel_id: non_empty_var("DISCORD_CHANNEL_ID"),

            discord_api_url: non_empty_var("DISCORD_API_URL")
                .unwrap_or(defaults.discord_api_url),

            mojang_api_url: non_empty_var("MOJANG_API_URL")
                .unwrap_or(defaults.mojang_api_url),

            log_dir: non_empty_var("SENTINEL_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),

            streams: non_empty_var("SENTINEL_STREAMS")
                .map(|v| parse_streams(&v))
                .unwrap_or_default(),

            servers_file: non_empty_var("SENTINEL_SERVERS_FILE").map(PathBuf::from),

            poll_millis: env::var("SENTINEL_POLL_MILLIS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.poll_millis),

            db_path: non_empty_var("SENTINEL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),

            server_parameters: parse_server_parameters(
                non_empty_var("SENTINEL_PRIMARY_SERVER").as_deref(),
                non_empty_var("SENTINEL_SECONDARY_SERVER").as_deref(),
            ),

            stats_interval_secs: env::var("SENTINEL_STATS_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.stats_interval_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_millis.max(1))
    }

    /// `None` when the stats sweep is disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parses `1=/srv/survival/logs/latest.log,2=/srv/creative/logs/latest.log`.
/// Malformed entries are skipped with a warning.
pub fn parse_streams(raw: &str) -> Vec<StreamSource> {
    let mut streams = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parsed = entry
            .split_once('=')
            .and_then(|(id, path)| {
                let path = path.trim();
                if path.is_empty() {
                    return None;
                }
                id.trim().parse().ok().map(|server_id| StreamSource {
                    server_id,
                    path: PathBuf::from(path),
                })
            });

        match parsed {
            Some(stream) => streams.push(stream),
            None => log::warn!("Ignoring malformed stream entry: {}", entry),
        }
    }
    streams
}

/// Both ids are required; a half-configured pairing is ignored.
pub fn parse_server_parameters(
    primary: Option<&str>,
    secondary: Option<&str>,
) -> Option<ServerParameters> {
    match (primary, secondary) {
        (None, None) => None,
        (Some(primary), Some(secondary)) => {
            match (primary.trim().parse(), secondary.trim().parse()) {
                (Ok(primary_id), Ok(secondary_id)) => Some(ServerParameters {
                    primary_id,
                    secondary_id,
                }),
                _ => {
                    log::warn!(
                        "Ignoring server pairing with non-numeric ids: {} / {}",
                        primary,
                        secondary
                    );
                    None
                }
            }
        }
        _ => {
            log::warn!("Server pairing needs both SENTINEL_PRIMARY_SERVER and SENTINEL_SECONDARY_SERVER");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stream_list() {
        let streams = parse_streams("1=/srv/a/latest.log, 2=/srv/b/latest.log");
        assert_eq!(
            streams,
            vec![
                StreamSource { server_id: 1, path: PathBuf::from("/srv/a/latest.log") },
                StreamSource { server_id: 2, path: PathBuf::from("/srv/b/latest.log") },
            ]
        );
    }

    #[test]
    fn skips_malformed_stream_entries() {
        let streams = parse_streams("x=/srv/a.log,3=,4/srv/b.log,5=/srv/c.log");
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].server_id, 5);
    }

    #[test]
    fn default_poll_interval_is_half_a_second() {
        assert_eq!(Config::default().poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn parses_server_pairing() {
        assert_eq!(
            parse_server_parameters(Some("1"), Some(" 2 ")),
            Some(ServerParameters { primary_id: 1, secondary_id: 2 })
        );
        assert_eq!(parse_server_parameters(None, None), None);
        assert_eq!(parse_server_parameters(Some("1"), None), None);
        assert_eq!(parse_server_parameters(Some("one"), Some("2")), None);
    }

    #[test]
    fn zero_stats_interval_disables_sweep() {
        let mut config = Config::default();
        assert_eq!(config.stats_interval(), Some(Duration::from_secs(300)));

        config.stats_interval_secs = 0;
        assert_eq!(config.stats_interval(), None);
    }
}
