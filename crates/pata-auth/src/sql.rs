//! SQLite-backed adapters.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::AuthError;
use crate::record::TokenRecord;
use crate::store::{AppTokenTable, TokenStore};

const CREATE_TOKENS: &str = r#"
CREATE TABLE IF NOT EXISTS tokens (
    token       TEXT    NOT NULL,
    token_type  TEXT    NOT NULL,
    user_id     INTEGER NOT NULL,
    sid         TEXT    NOT NULL,
    created     TEXT    NOT NULL,
    modified    TEXT    NOT NULL,
    expiration  INTEGER NOT NULL,
    PRIMARY KEY (token, token_type)
)"#;

const CREATE_APP_TOKENS: &str = r#"
CREATE TABLE IF NOT EXISTS app_tokens (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    token  TEXT NOT NULL
)"#;

const CREATE_APP_TOKENS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS app_tokens_token ON app_tokens (token)";

/// Open a pool for `url` and make sure the token tables exist.
///
/// A missing database file is created. In-memory databases are per
/// connection, so their pools hold exactly one.
pub async fn connect(url: &str) -> Result<SqlitePool, AuthError> {
    let connect_options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let mut options = SqlitePoolOptions::new();
    if url.contains(":memory:") {
        options = options
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>);
    }
    let pool = options.connect_with(connect_options).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Create the `tokens` and `app_tokens` tables if they are missing.
pub async fn migrate(pool: &SqlitePool) -> Result<(), AuthError> {
    for statement in [CREATE_TOKENS, CREATE_APP_TOKENS, CREATE_APP_TOKENS_INDEX] {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct SqlTokenStore {
    pool: SqlitePool,
}

impl SqlTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TokenRecord, sqlx::Error> {
    Ok(TokenRecord {
        token: row.try_get("token")?,
        token_type: row.try_get("token_type")?,
        user_id: row.try_get("user_id")?,
        sid: row.try_get("sid")?,
        created: row.try_get("created")?,
        modified: row.try_get("modified")?,
        expiration: row.try_get("expiration")?,
    })
}

#[async_trait]
impl TokenStore for SqlTokenStore {
    async fn find_token(
        &self,
        token: &str,
        token_type: &str,
    ) -> Result<Option<TokenRecord>, AuthError> {
        let row = sqlx::query(
            "SELECT token, token_type, user_id, sid, created, modified, expiration \
             FROM tokens WHERE token = ?1 AND token_type = ?2 LIMIT 1",
        )
        .bind(token)
        .bind(token_type)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn create_token(&self, record: TokenRecord) -> Result<TokenRecord, AuthError> {
        sqlx::query(
            "INSERT INTO tokens (token, token_type, user_id, sid, created, modified, expiration) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&record.token)
        .bind(&record.token_type)
        .bind(record.user_id)
        .bind(&record.sid)
        .bind(record.created)
        .bind(record.modified)
        .bind(record.expiration)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }
}

#[derive(Debug, Clone)]
pub struct SqlAppTokenTable {
    pool: SqlitePool,
}

impl SqlAppTokenTable {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, token: &str) -> Result<(), AuthError> {
        sqlx::query("INSERT INTO app_tokens (token) VALUES (?1)")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AppTokenTable for SqlAppTokenTable {
    async fn count_where(&self, token: &str, limit: u32) -> Result<u64, AuthError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS matches FROM \
             (SELECT 1 FROM app_tokens WHERE token = ?1 LIMIT ?2)",
        )
        .bind(token)
        .bind(i64::from(limit))
        .fetch_one(&self.pool)
        .await?;
        let matches: i64 = row.try_get("matches")?;
        Ok(matches.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    async fn pool() -> SqlitePool {
        connect("sqlite::memory:").await.expect("in-memory sqlite")
    }

    #[tokio::test]
    async fn token_round_trips_through_sqlite() {
        let store = SqlTokenStore::new(pool().await);
        let stamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = TokenRecord {
            token: "valid-access-token".into(),
            token_type: "accessToken".into(),
            user_id: 1,
            sid: "test-session-id".into(),
            created: stamp,
            modified: stamp,
            expiration: stamp.timestamp() + 3_600,
        };
        store.create_token(record.clone()).await.unwrap();

        let found = store
            .find_token("valid-access-token", "accessToken")
            .await
            .unwrap();
        assert_eq!(found, Some(record));
        assert!(store
            .find_token("valid-access-token", "refreshToken")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_surfaces_backend_error() {
        let store = SqlTokenStore::new(pool().await);
        let now = Utc::now();
        let record = TokenRecord {
            token: "dup".into(),
            token_type: "accessToken".into(),
            user_id: 1,
            sid: "sid".into(),
            created: now,
            modified: now,
            expiration: now.timestamp(),
        };
        store.create_token(record.clone()).await.unwrap();
        assert!(matches!(
            store.create_token(record).await,
            Err(AuthError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn app_token_count_is_bounded() {
        let table = SqlAppTokenTable::new(pool().await);
        table.insert("app").await.unwrap();
        table.insert("app").await.unwrap();

        assert_eq!(table.count_where("app", 1).await.unwrap(), 1);
        assert_eq!(table.count_where("app", 5).await.unwrap(), 2);
        assert_eq!(table.count_where("other", 1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connect_creates_a_missing_database_file() {
        let path = std::env::temp_dir().join(format!("pata-auth-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let pool = connect(&format!("sqlite://{}", path.display()))
            .await
            .expect("file-backed sqlite");
        let table = SqlAppTokenTable::new(pool.clone());
        table.insert("valid-app-token").await.unwrap();
        assert_eq!(table.count_where("valid-app-token", 1).await.unwrap(), 1);
        assert!(path.exists());

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
