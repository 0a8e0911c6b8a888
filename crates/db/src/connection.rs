use std::str::FromStr;
use std::time::Duration;

use assetflow_core::config::StoreConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_config(config: &StoreConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// In-memory databases are per connection, so they always get a single-connection pool.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let url = if database_url.trim() == ":memory:" { "sqlite::memory:" } else { database_url };
    let max_connections = if is_in_memory(url) { 1 } else { max_connections.max(1) };
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::connect_with_settings;

    #[tokio::test]
    async fn in_memory_pool_is_pinned_to_one_connection() {
        let pool = connect_with_settings("sqlite::memory:", 8, 5).await.expect("connect");
        assert_eq!(pool.options().get_max_connections(), 1);

        sqlx::query("CREATE TABLE probe (id INTEGER)").execute(&pool).await.expect("create");
        sqlx::query("INSERT INTO probe (id) VALUES (1)").execute(&pool).await.expect("insert");
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM probe").fetch_one(&pool).await.expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn bare_memory_alias_is_accepted() {
        let pool = connect_with_settings(":memory:", 2, 5).await.expect("connect");
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.expect("select");
        assert_eq!(one, 1);
    }
}
