use std::{net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;

use crate::db::{DatabaseTarget, PoolSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Operating mode, controls default log verbosity and format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    #[default]
    Debug,
    Release,
    Test,
}

impl AppMode {
    pub fn default_log_filter(self) -> &'static str {
        match self {
            AppMode::Debug => "visitor_app=debug,axum=info,tower_http=debug,sqlx=warn",
            AppMode::Release => "visitor_app=info,axum=info,tower_http=info,sqlx=warn",
            AppMode::Test => "visitor_app=warn,sqlx=error",
        }
    }

    pub fn json_logs_by_default(self) -> bool {
        self == AppMode::Release
    }
}

impl FromStr for AppMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(AppMode::Debug),
            "release" => Ok(AppMode::Release),
            "test" => Ok(AppMode::Test),
            other => Err(format!("unknown mode {other:?}, expected debug, release or test")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseTarget,
    pub pool: PoolSettings,
    pub host: String,
    pub port: u16,
    pub mode: AppMode,
    pub service_name: String,
    pub error_routes: bool,
    pub shutdown_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database =
            DatabaseTarget::parse(&database_url).map_err(|reason| ConfigError::Invalid {
                key: "DATABASE_URL",
                reason,
            })?;

        let mode = match get("APP_MODE") {
            Some(v) => v.parse::<AppMode>().map_err(|reason| ConfigError::Invalid {
                key: "APP_MODE",
                reason,
            })?,
            None => AppMode::default(),
        };

        let mut pool = PoolSettings::for_target(&database);
        if let Some(v) = parse_opt::<u32, _>(&get, "DB_MAX_CONNECTIONS")? {
            pool.max_connections = v;
        }
        if let Some(v) = parse_opt::<u32, _>(&get, "DB_MIN_CONNECTIONS")? {
            pool.min_connections = v;
        }
        if let Some(v) = parse_opt::<u64, _>(&get, "DB_MAX_LIFETIME_SECS")? {
            pool.max_lifetime = Duration::from_secs(v);
        }
        if pool.min_connections > pool.max_connections {
            return Err(ConfigError::Invalid {
                key: "DB_MIN_CONNECTIONS",
                reason: format!(
                    "{} exceeds DB_MAX_CONNECTIONS {}",
                    pool.min_connections, pool.max_connections
                ),
            });
        }

        let service_name = get("SERVICE_NAME").unwrap_or_else(|| match database {
            DatabaseTarget::Sqlite(_) => "nvoi-example-app".into(),
            DatabaseTarget::Postgres(_) => "golang-postgres-multi".into(),
        });
        let error_routes = parse_opt::<bool, _>(&get, "ENABLE_ERROR_ROUTES")?
            .unwrap_or(matches!(database, DatabaseTarget::Sqlite(_)));

        let shutdown_secs = parse_opt::<u64, _>(&get, "SHUTDOWN_TIMEOUT_SECS")?.unwrap_or(5);
        if shutdown_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "SHUTDOWN_TIMEOUT_SECS",
                reason: "drain budget must be at least one second".into(),
            });
        }

        Ok(Self {
            database,
            pool,
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_opt::<u16, _>(&get, "APP_PORT")?.unwrap_or(3000),
            mode,
            service_name,
            error_routes,
            shutdown_timeout: Duration::from_secs(shutdown_secs),
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "APP_HOST",
                reason: e.to_string(),
            })
    }
}

fn parse_opt<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
        })
        .transpose()
}
