use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, PgPool, Row};
use std::time::Duration;
use tinylink_core::storage::{tombstone, Result};
use tinylink_core::{
    Resolution, ShortCode, Statistics, Storage, StorageError, UrlTable, UserId,
};
use tracing::{debug, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLSTATE raised by PostgreSQL on a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";
/// Constraint guarding global uniqueness of original urls.
const ORIGINAL_URL_CONSTRAINT: &str = "urls_original_url_key";

const PING_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL implementation of the storage contract.
///
/// Users live in `users`, keyed by their session identity (`user_cookie`);
/// urls live in `urls` with an `is_deleted` flag for soft deletion. Rows are
/// never removed, so a short code is never reused.
#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a storage from an existing pool. Migrations are not run.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool and applies pending migrations.
    ///
    /// Applying migrations is idempotent: already-applied ones are skipped.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;

        let storage = Self::new(pool);
        storage.migrate().await?;
        Ok(storage)
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Operation(format!("migration failed: {e}")))?;
        info!("database schema is up to date");
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_original_url_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| {
        db.code().as_deref() == Some(UNIQUE_VIOLATION)
            && db.constraint() == Some(ORIGINAL_URL_CONSTRAINT)
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn read_all(&self) -> Result<UrlTable> {
        let mut table = UrlTable::new();

        let users = sqlx::query("SELECT user_cookie FROM users")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        for row in users {
            let user: String = row.try_get("user_cookie").map_err(map_sqlx_error)?;
            table.entry(UserId::new(user)).or_default();
        }

        let urls = sqlx::query(
            r#"
            SELECT users.user_cookie, urls.short_code, urls.original_url, urls.is_deleted
            FROM urls
            INNER JOIN users ON users.user_id = urls.user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        for row in urls {
            let user: String = row.try_get("user_cookie").map_err(map_sqlx_error)?;
            let code: String = row.try_get("short_code").map_err(map_sqlx_error)?;
            let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
            let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;

            let stored = if is_deleted {
                tombstone(&original_url)
            } else {
                original_url
            };
            table
                .entry(UserId::new(user))
                .or_default()
                .insert(ShortCode::new_unchecked(code), stored);
        }

        Ok(table)
    }

    async fn save(&self, data: UrlTable) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for (user, codes) in &data {
            sqlx::query(
                "INSERT INTO users (user_cookie) VALUES ($1) ON CONFLICT (user_cookie) DO NOTHING",
            )
            .bind(user.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            for (code, original_url) in codes {
                let result = sqlx::query(
                    r#"
                    INSERT INTO urls (user_id, short_code, original_url, is_deleted)
                    VALUES ((SELECT user_id FROM users WHERE user_cookie = $1), $2, $3, FALSE)
                    "#,
                )
                .bind(user.as_str())
                .bind(code.as_str())
                .bind(original_url.as_str())
                .execute(&mut *tx)
                .await;

                match result {
                    Ok(_) => {}
                    // Dropping `tx` rolls the whole call back.
                    Err(err) if is_original_url_conflict(&err) => {
                        return Err(StorageError::Conflict {
                            original_url: original_url.clone(),
                        });
                    }
                    Err(err) => return Err(map_sqlx_error(err)),
                }
            }
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn resolve(&self, code: &ShortCode) -> Result<Resolution> {
        let row = sqlx::query(
            r#"
            SELECT original_url, is_deleted
            FROM urls
            WHERE short_code = $1
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(Resolution::Missing);
        };

        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if is_deleted {
            return Ok(Resolution::Deleted);
        }
        let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
        Ok(Resolution::Active(original_url))
    }

    async fn delete(&self, codes: &[ShortCode], owner: &UserId) -> Result<()> {
        let codes: Vec<String> = codes.iter().map(|c| c.as_str().to_owned()).collect();

        let result = sqlx::query(
            r#"
            UPDATE urls
            SET is_deleted = TRUE
            WHERE short_code = ANY($1)
              AND user_id = (SELECT user_id FROM users WHERE user_cookie = $2)
              AND is_deleted = FALSE
            "#,
        )
        .bind(&codes)
        .bind(owner.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(
            owner = %owner,
            requested = codes.len(),
            marked = result.rows_affected(),
            "tombstoned codes in database"
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let probe = async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await
        };

        match tokio::time::timeout(PING_TIMEOUT, probe).await {
            Ok(result) => result.map_err(map_sqlx_error),
            Err(_) => Err(StorageError::Timeout(format!(
                "database did not answer within {PING_TIMEOUT:?}"
            ))),
        }
    }

    async fn statistics(&self) -> Result<Statistics> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM urls)  AS urls,
                (SELECT COUNT(*) FROM users) AS users
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;

        Ok(Statistics {
            urls: urls.max(0) as u64,
            users: users.max(0) as u64,
        })
    }

    async fn has_user(&self, user: &UserId) -> Result<bool> {
        let exists = sqlx::query("SELECT 1 FROM users WHERE user_cookie = $1 LIMIT 1")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .is_some();

        Ok(exists)
    }
}
