// src/identity.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::IdentityError;
use crate::utils::normalize_account_id;

pub const MINECRAFT: &str = "Minecraft";

/// Resolves a display name to the game's stable account id.
///
/// Results are point-in-time: names can be renamed, so callers must not cache
/// them across events.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve(&self, display_name: &str) -> Result<String, IdentityError>;
}

/// Game tag to resolution strategy. Adding a game is one `register` call.
#[derive(Default, Clone)]
pub struct IdentityResolver {
    strategies: HashMap<String, Arc<dyn AccountResolver>>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, game: impl Into<String>, resolver: Arc<dyn AccountResolver>) {
        self.strategies.insert(game.into(), resolver);
    }

    pub fn with(mut self, game: impl Into<String>, resolver: Arc<dyn AccountResolver>) -> Self {
        self.register(game, resolver);
        self
    }

    pub async fn resolve(&self, display_name: &str, game: &str) -> Result<String, IdentityError> {
        let resolver = self
            .strategies
            .get(game)
            .ok_or_else(|| IdentityError::UnknownGame(game.to_string()))?;

        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(IdentityError::NotFound(String::new()));
        }

        let account_id = resolver.resolve(display_name).await?;
        debug!("Resolved {} player {} to {}", game, display_name, account_id);
        Ok(account_id)
    }
}

#[derive(Debug, Deserialize)]
struct MojangProfile {
    id: String,
}

/// Name to UUID lookups against the Mojang profile API.
pub struct MojangResolver {
    client: reqwest::Client,
    base_url: String,
}

impl MojangResolver {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn profile_url(&self, display_name: &str) -> String {
        format!("{}/users/profiles/minecraft/{}", self.base_url, display_name)
    }
}

#[async_trait]
impl AccountResolver for MojangResolver {
    async fn resolve(&self, display_name: &str) -> Result<String, IdentityError> {
        let lookup_failed = |reason: String| IdentityError::LookupFailed {
            name: display_name.to_string(),
            reason,
        };

        let response = match self.client.get(self.profile_url(display_name)).send().await {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to reach Mojang for {}: {}", display_name, e);
                return Err(lookup_failed(e.to_string()));
            }
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => {
                return Err(IdentityError::NotFound(display_name.to_string()));
            }
            status => {
                error!("Mojang lookup for {} returned {}", display_name, status);
                return Err(lookup_failed(format!("status {}", status.as_u16())));
            }
        }

        let profile = response
            .json::<MojangProfile>()
            .await
            .map_err(|e| lookup_failed(format!("invalid profile: {}", e)))?;

        Ok(normalize_account_id(&profile.id))
    }
}
