use async_trait::async_trait;
use sqlx::{Connection, PgPool, SqlitePool};
use thiserror::Error;
use time::OffsetDateTime;

use crate::users::repo_types::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("failed to create data directory: {0}")]
    DataDir(#[source] std::io::Error),
    #[error("failed to migrate database: {0}")]
    Schema(#[source] sqlx::Error),
    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

/// Persistence seam for the `users` table.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Round-trips a connection to the store.
    async fn ping(&self) -> Result<(), StoreError>;
    /// Creates the table and indexes if absent. Never drops or alters anything.
    async fn ensure_schema(&self) -> Result<(), StoreError>;
    async fn insert(&self, user: &NewUser) -> Result<User, StoreError>;
    /// Every row without a soft-delete marker, oldest first.
    async fn list_active(&self) -> Result<Vec<User>, StoreError>;
}

const PG_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL CHECK (name <> ''),
        email TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        deleted_at TIMESTAMPTZ
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email) WHERE deleted_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_users_deleted_at ON users (deleted_at)",
];

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL CHECK (name <> ''),
        email TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users (email) WHERE deleted_at IS NULL",
    "CREATE INDEX IF NOT EXISTS idx_users_deleted_at ON users (deleted_at)",
];

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for stmt in PG_SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Schema)?;
        }
        Ok(())
    }

    async fn insert(&self, user: &NewUser) -> Result<User, StoreError> {
        let now = OffsetDateTime::now_utc();
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            RETURNING id, name, email, created_at, updated_at, deleted_at
            "#,
        )
        .bind(user.name())
        .bind(user.email())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_active(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, created_at, updated_at, deleted_at
            FROM users
            WHERE deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        for stmt in SQLITE_SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(StoreError::Schema)?;
        }
        Ok(())
    }

    async fn insert(&self, user: &NewUser) -> Result<User, StoreError> {
        let now = OffsetDateTime::now_utc();
        let row = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, email, created_at, updated_at, deleted_at
            "#,
        )
        .bind(user.name())
        .bind(user.email())
        .bind(now)
        .bind(now)
        // drain the statement so the insert is committed before the connection goes back
        .fetch_all(&self.pool)
        .await?
        .pop()
        .ok_or(sqlx::Error::RowNotFound)?;
        Ok(row)
    }

    async fn list_active(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, created_at, updated_at, deleted_at
            FROM users
            WHERE deleted_at IS NULL
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
pub(crate) async fn temp_sqlite_store() -> (SqliteUserStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.db");
    let settings = crate::db::PoolSettings::for_target(&crate::db::DatabaseTarget::Sqlite(
        path.to_string_lossy().into_owned(),
    ));
    let store = crate::db::open_sqlite(&path, settings)
        .await
        .expect("open sqlite");
    store.ensure_schema().await.expect("schema");
    (store, dir)
}
