#![deny(warnings)]

use persistence::default_sqlite_url;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_sqlite_url().to_string());
    let pool = persistence::init_db(&url).await?;
    // Sanity: count existing colonies
    let (colonies,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM colonies")
        .fetch_one(&pool)
        .await?;
    println!("DB migrated at {} ({} colonies)", url, colonies);
    Ok(())
}
