#![deny(warnings)]

//! Persistence layer: SQLite schema and the colony store.

use colony_core::PlayerId;
use colony_engine::{ColonyState, ColonyStore, StoreError};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/colony.db"
}

fn is_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Create the parent directory of a file-backed SQLite URL.
pub fn ensure_db_dir(url: &str) -> std::io::Result<()> {
    if is_memory(url) {
        return Ok(());
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .map(|p| p.split('?').next().unwrap_or(p));
    if let Some(parent) = path.and_then(|p| Path::new(p).parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Open (creating if needed) the database at `url` and apply migrations.
pub async fn init_db(url: &str) -> anyhow::Result<SqlitePool> {
    ensure_db_dir(url)?;
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    // Every in-memory connection is its own database.
    let max = if is_memory(url) { 1 } else { 4 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!(url, "database ready");
    Ok(pool)
}

#[derive(Debug, sqlx::FromRow)]
struct ColonyRow {
    version: i64,
    state_json: String,
}

/// [`ColonyStore`] over the `colonies` table.
///
/// The colony is stored as one JSON document and `version` is bumped on
/// every write; updates only match the version the caller loaded.
#[derive(Clone, Debug)]
pub struct SqliteColonyStore {
    pool: SqlitePool,
}

impl SqliteColonyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn backend(e: impl Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

impl ColonyStore for SqliteColonyStore {
    async fn load(&self, player: &PlayerId) -> Result<Option<ColonyState>, StoreError> {
        let row: Option<ColonyRow> =
            sqlx::query_as("SELECT version, state_json FROM colonies WHERE player_id = ?")
                .bind(player.0.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut state: ColonyState = serde_json::from_str(&row.state_json).map_err(backend)?;
        state.version = u64::try_from(row.version).map_err(backend)?;
        Ok(Some(state))
    }

    async fn save(&self, state: &ColonyState) -> Result<u64, StoreError> {
        let json = serde_json::to_string(state).map_err(backend)?;
        let expected = i64::try_from(state.version).map_err(backend)?;
        let player = state.player_id.0.as_str();

        let result = if expected == 0 {
            sqlx::query(
                "INSERT INTO colonies (player_id, version, state_json) \
                 VALUES (?, 1, ?) ON CONFLICT(player_id) DO NOTHING",
            )
            .bind(player)
            .bind(json.as_str())
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                "UPDATE colonies SET version = version + 1, state_json = ? \
                 WHERE player_id = ? AND version = ?",
            )
            .bind(json.as_str())
            .bind(player)
            .bind(expected)
            .execute(&self.pool)
            .await
        };
        let result = result.map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                player: state.player_id.clone(),
                expected: state.version,
            });
        }
        let version = state.version + 1;
        debug!(player = %state.player_id, version, "colony row written");
        Ok(version)
    }
}
