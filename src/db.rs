use std::{path::Path, sync::Arc, time::Duration};

use sqlx::{
    postgres::PgPoolOptions,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::users::repo::{PgUserStore, SqliteUserStore, StoreError, UserStore};

/// Where the user table lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Postgres(String),
    /// Path to the database file.
    Sqlite(String),
}

impl DatabaseTarget {
    pub fn parse(url: &str) -> Result<Self, String> {
        let url = url.trim();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres(url.to_string()));
        }
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"));
        match path {
            Some(p) if !p.is_empty() => Ok(Self::Sqlite(p.to_string())),
            Some(_) => Err("sqlite target needs a file path".into()),
            None => Err(format!(
                "unsupported database url {url:?}, expected postgres:// or sqlite://"
            )),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Sqlite(_) => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    /// Lock wait for SQLite writers; unused by Postgres.
    pub busy_timeout: Option<Duration>,
}

impl PoolSettings {
    pub fn for_target(target: &DatabaseTarget) -> Self {
        match target {
            DatabaseTarget::Postgres(_) => Self {
                max_connections: 100,
                min_connections: 10,
                max_lifetime: Duration::from_secs(60 * 60),
                idle_timeout: Duration::from_secs(10 * 60),
                acquire_timeout: Duration::from_secs(30),
                busy_timeout: None,
            },
            DatabaseTarget::Sqlite(_) => Self {
                max_connections: 8,
                min_connections: 0,
                max_lifetime: Duration::from_secs(60 * 60),
                idle_timeout: Duration::from_secs(10 * 60),
                acquire_timeout: Duration::from_secs(30),
                busy_timeout: Some(Duration::from_secs(5)),
            },
        }
    }
}

/// Opens the pool, pings it once and makes sure the schema exists.
///
/// There is no retry: any failure here is meant to abort startup.
pub async fn connect(
    target: &DatabaseTarget,
    settings: PoolSettings,
) -> Result<Arc<dyn UserStore>, StoreError> {
    let store: Arc<dyn UserStore> = match target {
        DatabaseTarget::Postgres(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .min_connections(settings.min_connections)
                .max_lifetime(settings.max_lifetime)
                .idle_timeout(settings.idle_timeout)
                .acquire_timeout(settings.acquire_timeout)
                .connect(url)
                .await
                .map_err(StoreError::Connect)?;
            Arc::new(PgUserStore::new(pool))
        }
        DatabaseTarget::Sqlite(path) => Arc::new(open_sqlite(Path::new(path), settings).await?),
    };

    store.ping().await?;
    store.ensure_schema().await?;
    tracing::info!(backend = target.kind(), "database connected successfully");
    Ok(store)
}

pub async fn open_sqlite(path: &Path, settings: PoolSettings) -> Result<SqliteUserStore, StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(StoreError::DataDir)?;
    }

    let mut options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    if let Some(wait) = settings.busy_timeout {
        options = options.busy_timeout(wait);
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .max_lifetime(settings.max_lifetime)
        .idle_timeout(settings.idle_timeout)
        .acquire_timeout(settings.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(StoreError::Connect)?;

    Ok(SqliteUserStore::new(pool))
}
