// src/bin/qrelay/commands.rs
use anyhow::{bail, Context, Result};
use actix_web::{web, App, HttpServer};
use clap::ArgMatches;
use tokio::signal;
use tracing::info;

use qrelay::routes::failures_route::qrelay_admin_routes;
use qrelay::services::failures_service::{inspect, FailureEntry};
use qrelay::{Config, FailureStore, Pipeline};

pub fn load_config(matches: &ArgMatches) -> Result<Config> {
    match matches.get_one::<String>("config") {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    }
}

fn strings(matches: &ArgMatches, id: &str) -> Vec<String> {
    matches
        .get_many::<String>(id)
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .with_context(|| format!("missing --{id}"))
}

/// Jobs submitted to an in-process broker would die with this process.
async fn connect_to_broker(config: Config) -> Result<Pipeline> {
    if config.redis_url().is_none() {
        bail!("no broker configured: set REDIS_URL or redis_url in the config file");
    }
    let pipeline = Pipeline::connect(config).await?;
    pipeline.init().await?;
    Ok(pipeline)
}

pub async fn start_command(config: Config, matches: &ArgMatches) -> Result<()> {
    let pipeline = Pipeline::connect(config).await?;
    pipeline.init().await?;
    let running = pipeline.start().await?;

    let server = match matches.get_one::<String>("web") {
        Some(addr) => {
            let sweeper = web::Data::from(pipeline.sweeper().clone());
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(sweeper.clone())
                    .configure(qrelay_admin_routes)
            })
            .bind(addr.as_str())
            .with_context(|| format!("failed to bind {addr}"))?
            .run();
            info!(%addr, "admin endpoints listening");
            let handle = server.handle();
            tokio::spawn(server);
            Some(handle)
        }
        None => None,
    };

    println!("Workers started. Press Ctrl+C to stop.");
    signal::ctrl_c().await?;
    println!("Shutting down...");

    if let Some(handle) = server {
        handle.stop(true).await;
    }
    running.shutdown().await;
    Ok(())
}

pub async fn broadcast_command(config: Config, matches: &ArgMatches) -> Result<()> {
    let pipeline = connect_to_broker(config).await?;
    let sender = required(matches, "sender")?;
    let payload = required(matches, "payload")?;
    let recipients = strings(matches, "recipients");

    let receipt = pipeline
        .dispatcher()
        .broadcast(sender, &recipients, payload)
        .await;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

pub async fn sequence_command(config: Config, matches: &ArgMatches) -> Result<()> {
    let pipeline = connect_to_broker(config).await?;
    let recipient = required(matches, "recipient")?;
    let chunks = strings(matches, "chunks");

    let receipt = pipeline.dispatcher().sequence(recipient, &chunks).await;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

pub async fn relay_command(config: Config) -> Result<()> {
    let pipeline = connect_to_broker(config).await?;
    let report = pipeline.sweeper().sweep().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn failures_command(config: Config) -> Result<()> {
    let store = FailureStore::new(&config.storage.fails_dir);
    let entries = inspect(&store).await?;

    if entries.is_empty() {
        println!("No recorded failures in {}", store.dir().display());
        return Ok(());
    }
    for entry in &entries {
        match entry {
            FailureEntry::Ok { record, failure } => println!(
                "{record}  batch={} recipient={} index={} payload={}",
                failure.batch_name, failure.recipient, failure.sequence_index, failure.payload
            ),
            FailureEntry::Corrupt { record, reason } => println!("{record}  CORRUPT: {reason}"),
        }
    }
    println!("{} record(s)", entries.len());
    Ok(())
}
