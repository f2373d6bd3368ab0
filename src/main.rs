// src/main.rs
mod audit;
mod config;
mod console;
mod error;
mod identity;
mod models;
mod notifier;
mod stats_sync;
mod storage;
mod tracker;
mod triggers;
mod utils;

use std::sync::Arc;

use env_logger::Env;
use log::{error, info, warn};

use crate::audit::AuditLogger;
use crate::config::Config;
use crate::identity::{IdentityResolver, MojangResolver, MINECRAFT};
use crate::notifier::DiscordNotifier;
use crate::storage::sqlite::SqliteStorage;
use crate::storage::ServerCatalog;
use crate::tracker::PlayerTracker;
use crate::triggers::{StreamDispatcher, TriggerContext, TriggerRegistry};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logger only once at the start
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();
    let client = reqwest::Client::new();

    let storage = match SqliteStorage::open(&config.db_path) {
        Ok(storage) => Arc::new(storage),
        Err(e) => {
            error!("Failed to open database {}: {}", config.db_path.display(), e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };
    if let Some(path) = &config.servers_file {
        if let Err(e) = storage.provision_from_file(path) {
            error!("Failed to load servers: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()));
        }
    }
    if let Some(parameters) = config.server_parameters {
        if let Err(e) = storage.set_server_parameters(parameters) {
            error!("Failed to store server pairing: {}", e);
        }
    }
    match storage.all_servers() {
        Ok(servers) => info!("{} servers provisioned", servers.len()),
        Err(e) => error!("Failed to list servers: {}", e),
    }
    match storage.server_parameters() {
        Ok(Some(pairing)) => info!(
            "Primary server {}, secondary server {}",
            pairing.primary_id, pairing.secondary_id
        ),
        Ok(None) => {}
        Err(e) => error!("Failed to read server pairing: {}", e),
    }

    let identity = IdentityResolver::new().with(
        MINECRAFT,
        Arc::new(MojangResolver::new(client.clone(), config.mojang_api_url.clone())),
    );
    let tracker = Arc::new(PlayerTracker::new(
        identity,
        storage.clone(),
        storage.clone(),
        storage.clone(),
    ));

    let ctx = Arc::new(TriggerContext {
        notifier: Arc::new(DiscordNotifier::new(client, &config)),
        audit: Arc::new(AuditLogger::new(config.log_dir.clone())),
        tracker: Some(tracker.clone()),
    });
    match config.stats_interval() {
        Some(interval) => {
            tokio::spawn(stats_sync::run_periodic(tracker, storage.clone(), interval));
        }
        None => info!("Stats sync disabled"),
    }

    let registry = Arc::new(TriggerRegistry::builtin());
    info!("Loaded {} triggers", registry.len());

    if config.streams.is_empty() {
        info!("No streams configured, reading console lines from stdin");
        let dispatcher = StreamDispatcher::new(None, registry, ctx);
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        console::pump_lines(stdin, &dispatcher).await?;
        info!("Processed stdin: {:?}", dispatcher.stats());
        return Ok(());
    }

    let mut readers = Vec::new();
    for stream in config.streams.clone() {
        let dispatcher = StreamDispatcher::new(Some(stream.server_id), registry.clone(), ctx.clone());
        let poll = config.poll_interval();
        readers.push(tokio::spawn(async move {
            if let Err(e) = console::follow_file(&stream.path, &dispatcher, poll).await {
                error!("Stream {} for server {} stopped: {}", stream.path.display(), stream.server_id, e);
            }
            info!("Server {} stream stats: {:?}", stream.server_id, dispatcher.stats());
        }));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
        _ = join_readers(readers) => warn!("All streams stopped"),
    }
    Ok(())
}

async fn join_readers(readers: Vec<tokio::task::JoinHandle<()>>) {
    for reader in readers {
        if let Err(e) = reader.await {
            error!("Stream reader panicked: {}", e);
        }
    }
}
