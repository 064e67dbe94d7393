use std::sync::Arc;

use crate::config::AppConfig;
use crate::users::{
    repo::UserStore,
    services::{EmailGenerator, NameGenerator},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub names: Arc<NameGenerator>,
    pub emails: Arc<EmailGenerator>,
    pub hostname: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn UserStore>, config: AppConfig) -> Self {
        Self::from_parts(
            store,
            Arc::new(config),
            Arc::new(NameGenerator::from_entropy()),
            resolve_hostname(),
        )
    }

    pub fn from_parts(
        store: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        names: Arc<NameGenerator>,
        hostname: String,
    ) -> Self {
        Self {
            store,
            config,
            names,
            emails: Arc::new(EmailGenerator::new()),
            hostname: hostname.into(),
        }
    }

    #[cfg(test)]
    pub async fn fake() -> (Self, crate::users::repo::SqliteUserStore, tempfile::TempDir) {
        let (store, dir) = crate::users::repo::temp_sqlite_store().await;
        let config = AppConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some(format!("sqlite://{}", dir.path().join("app.db").display())),
            "APP_MODE" => Some("test".into()),
            _ => None,
        })
        .expect("test config");
        let state = Self::from_parts(
            Arc::new(store.clone()),
            Arc::new(config),
            Arc::new(NameGenerator::seeded(7)),
            "test-host".into(),
        );
        (state, store, dir)
    }
}

/// Pod or machine name reported to clients so a load balancer's spread is visible.
pub fn resolve_hostname() -> String {
    system_hostname()
        .or_else(|| std::env::var("HOSTNAME").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(unix)]
fn system_hostname() -> Option<String> {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for `buf.len()` bytes and gethostname writes at most that many.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    std::str::from_utf8(&buf[..end]).ok().map(str::to_string)
}

#[cfg(not(unix))]
fn system_hostname() -> Option<String> {
    None
}
