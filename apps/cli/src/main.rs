#![deny(warnings)]

//! Headless CLI for playing a colony against a local SQLite save.

use anyhow::Result;
use chrono::Utc;
use colony_core::{load_catalog, Catalog, PlayerBuildingId, PlayerId};
use colony_engine::{Colony, ColonyStore, ConstructionEngine, EngineConfig, EngineError};
use persistence::{default_sqlite_url, SqliteColonyStore};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: colony [--db URL] [--catalog FILE] [--config FILE] [--player ID] \
<init | status | build NAME | upgrade ID | queue ID | ship NAME QTY | research NAME>";

struct Args {
    db: String,
    catalog: PathBuf,
    config: Option<PathBuf>,
    player: String,
    version: bool,
    command: Vec<String>,
}

fn parse_args() -> Args {
    let mut args = Args {
        db: default_sqlite_url().to_string(),
        catalog: PathBuf::from("assets/catalog.yaml"),
        config: None,
        player: "local".to_string(),
        version: false,
        command: Vec::new(),
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--db" => args.db = it.next().unwrap_or(args.db),
            "--catalog" => args.catalog = it.next().map(PathBuf::from).unwrap_or(args.catalog),
            "--config" => args.config = it.next().map(PathBuf::from),
            "--player" => args.player = it.next().unwrap_or(args.player),
            "--version" => args.version = true,
            _ => args.command.push(arg),
        }
    }
    args
}

/// Print the outcome as JSON; `false` when the intent was rejected.
fn report<T: Serialize>(outcome: Result<T, EngineError>) -> Result<bool> {
    let (body, ok) = match outcome {
        Ok(value) => (json!({ "ok": true, "result": value }), true),
        Err(e) => (
            json!({ "ok": false, "kind": format!("{:?}", e.kind()), "reason": e.to_string() }),
            false,
        ),
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(ok)
}

fn not_found(what: &'static str, id: &str) -> EngineError {
    EngineError::NotFound {
        what,
        id: id.to_string(),
    }
}

async fn run<S: ColonyStore>(
    colony: &Colony<S>,
    catalog: &Catalog,
    player: &PlayerId,
    words: &[&str],
) -> Result<bool> {
    let now = Utc::now();
    match words {
        [] | ["status"] => report(colony.refresh(player, now).await),
        ["init"] => report(colony.initialize(player, now).await),
        ["build", name @ ..] if !name.is_empty() => {
            let name = name.join(" ");
            let outcome = match catalog.building_by_name(&name) {
                Some(def) => colony.build(player, def.id, now).await,
                None => Err(not_found("building type", &name)),
            };
            report(outcome)
        }
        ["upgrade", id] => match id.parse() {
            Ok(id) => report(colony.upgrade(player, PlayerBuildingId(id), now).await),
            Err(_) => report::<()>(Err(not_found("building", id))),
        },
        ["queue", id] => match id.parse() {
            Ok(id) => report(colony.enqueue_upgrade(player, PlayerBuildingId(id), now).await),
            Err(_) => report::<()>(Err(not_found("building", id))),
        },
        ["ship", name @ .., qty] if !name.is_empty() => {
            let name = name.join(" ");
            let outcome = match (catalog.ship_by_name(&name), qty.parse::<u64>()) {
                (Some(def), Ok(qty)) => colony.build_ships(player, def.id, qty, now).await,
                (None, _) => Err(not_found("ship type", &name)),
                (_, Err(_)) => Err(EngineError::InvalidQuantity),
            };
            report(outcome)
        }
        ["research", name @ ..] if !name.is_empty() => {
            let name = name.join(" ");
            let outcome = match catalog.tech_by_name(&name) {
                Some(def) => colony.research(player, def.id, now).await,
                None => Err(not_found("tech", &name)),
            };
            report(outcome)
        }
        _ => {
            eprintln!("{USAGE}");
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging setup
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    if args.version {
        println!(
            "colony {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }
    info!(db = %args.db, player = %args.player, command = ?args.command, "starting CLI");

    let catalog = Arc::new(load_catalog(&args.catalog)?);
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let engine = ConstructionEngine::new(Arc::clone(&catalog), config);
    let pool = persistence::init_db(&args.db).await?;
    let colony = Colony::new(engine, SqliteColonyStore::new(pool));

    let player = PlayerId(args.player.clone());
    let now = Utc::now();
    colony.initialize(&player, now).await?;

    let words: Vec<&str> = args.command.iter().map(String::as_str).collect();
    if !run(&colony, &catalog, &player, &words).await? {
        std::process::exit(1);
    }
    Ok(())
}
