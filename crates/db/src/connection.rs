use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

/// Opens a pool, creating the database file on first use. In-memory URLs are
/// pinned to a single connection so every query sees the same database.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let max_connections =
        if database_url.contains(":memory:") { 1 } else { max_connections.max(1) };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use super::connect_with_settings;

    #[tokio::test]
    async fn memory_database_is_shared_by_the_whole_pool() {
        let pool = connect_with_settings("sqlite::memory:", 8, 5).await.expect("connect");
        sqlx::query("CREATE TABLE pool_check (id INTEGER)").execute(&pool).await.expect("create");
        sqlx::query("INSERT INTO pool_check (id) VALUES (1)").execute(&pool).await.expect("insert");

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pool_check").fetch_one(&pool).await.expect("count");
        assert_eq!(count, 1);
        assert_eq!(pool.options().get_max_connections(), 1);
    }
}
