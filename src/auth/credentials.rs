// Persisted credential storage (key-value)

use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::types::{Session, User};

/// Key holding the JSON-serialized user
pub const USER_KEY: &str = "user";
/// Key holding the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

pub const SESSION_KEYS: [&str; 3] = [USER_KEY, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY];

/// Secure key-value storage for session credentials.
///
/// Each call reads, writes or removes a single key atomically; there is no
/// multi-key transaction.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store, lost on restart
#[derive(Default, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// SQLite-backed store using a single `auth_kv` table
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create credential directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::init(conn)
    }

    /// Store that lives only as long as this handle
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to create auth_kv table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("SQLite connection lock poisoned"))?;
            f(&conn).map_err(anyhow::Error::from)
        })
        .await
        .context("SQLite task failed")?
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.query_row("SELECT value FROM auth_kv WHERE key = ?", [&key], |row| {
                row.get(0)
            })
            .optional()
        })
        .await
        .context("Failed to read from credential store")
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO auth_kv (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [&key, &value],
            )
            .map(|_| ())
        })
        .await
        .context("Failed to write to credential store")
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM auth_kv WHERE key = ?", [&key])
                .map(|_| ())
        })
        .await
        .context("Failed to delete from credential store")
    }
}

/// Load the persisted session.
///
/// Returns `None` unless all three keys are present and the user parses;
/// a partial triple counts as logged out.
pub async fn load_session(store: &dyn CredentialStore) -> Result<Option<Session>> {
    let user = store.get(USER_KEY).await?;
    let access_token = store.get(ACCESS_TOKEN_KEY).await?;
    let refresh_token = store.get(REFRESH_TOKEN_KEY).await?;

    let (user, access_token, refresh_token) = match (user, access_token, refresh_token) {
        (Some(u), Some(a), Some(r)) => (u, a, r),
        (None, None, None) => return Ok(None),
        _ => {
            tracing::debug!("Persisted session is incomplete, treating as logged out");
            return Ok(None);
        }
    };

    let user: User = match serde_json::from_str(&user) {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!("Persisted user is not valid JSON, treating as logged out: {}", e);
            return Ok(None);
        }
    };

    Ok(Some(Session {
        user,
        access_token,
        refresh_token,
    }))
}

/// Persist the full session triple
pub async fn save_session(store: &dyn CredentialStore, session: &Session) -> Result<()> {
    let user = serde_json::to_string(&session.user).context("Failed to serialize user")?;
    store.set(USER_KEY, &user).await?;
    store.set(ACCESS_TOKEN_KEY, &session.access_token).await?;
    store.set(REFRESH_TOKEN_KEY, &session.refresh_token).await?;
    Ok(())
}

/// Remove every session key, attempting all of them even if one fails
pub async fn clear_session(store: &dyn CredentialStore) -> Result<()> {
    let mut first_error = None;
    for key in SESSION_KEYS {
        if let Err(e) = store.remove(key).await {
            tracing::error!("Failed to remove {} from credential store: {:#}", key, e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
