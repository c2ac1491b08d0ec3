use reqwest::Client;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::credentials::{self, CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use super::refresh;
use super::types::{Session, User};
use crate::error::{ClientError, Result};

/// In-memory half of the session, guarded together with its epoch
#[derive(Default)]
struct SessionState {
    current: Option<Session>,

    /// Bumped on every login, logout and forced clear
    epoch: u64,
}

/// Session manager
/// Owns the in-memory session, keeps it consistent with the persisted store
/// and serializes token refreshes so concurrent failures share one refresh
pub struct SessionManager {
    /// Current session and its epoch
    state: Arc<RwLock<SessionState>>,

    /// Persisted credentials
    store: Arc<dyn CredentialStore>,

    /// HTTP client for refresh/logout requests
    client: Client,

    /// API base URL (e.g. `http://localhost:5500/api`)
    base_url: String,

    /// Held for the duration of a refresh
    refresh_lock: Mutex<()>,
}

impl SessionManager {
    /// Create a logged-out manager; call [`restore_session`](Self::restore_session) before use
    pub fn new(store: Arc<dyn CredentialStore>, client: Client, base_url: impl Into<String>) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            store,
            client,
            base_url: base_url.into(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Load the persisted session into memory.
    ///
    /// A partial or absent triple leaves the manager logged out.
    pub async fn restore_session(&self) -> Result<Option<Session>> {
        let restored = credentials::load_session(self.store.as_ref())
            .await
            .map_err(ClientError::storage)?;

        let mut state = self.state.write().await;
        state.current = restored.clone();

        match &restored {
            Some(session) => tracing::info!(
                user_id = session.user.id,
                "Restored session for {}",
                session.user.email
            ),
            None => tracing::debug!("No stored session, starting logged out"),
        }

        Ok(restored)
    }

    /// Persist a new session and make it current
    pub async fn login(&self, user: User, access_token: String, refresh_token: String) -> Result<()> {
        let session = Session {
            user,
            access_token,
            refresh_token,
        };

        let mut state = self.state.write().await;
        state.epoch += 1;

        if let Err(e) = credentials::save_session(self.store.as_ref(), &session).await {
            tracing::error!("Failed to persist session: {:#}", e);
            state.current = None;
            if let Err(clear_err) = credentials::clear_session(self.store.as_ref()).await {
                tracing::error!("Failed to roll back partial session: {:#}", clear_err);
            }
            return Err(ClientError::storage(e));
        }

        tracing::info!(user_id = session.user.id, "Authenticated as {}", session.user.email);
        state.current = Some(session);
        Ok(())
    }

    /// Best-effort server logout, then unconditionally clear local state
    pub async fn logout(&self) -> Result<()> {
        let refresh_token = match self.store.get(REFRESH_TOKEN_KEY).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Could not read refresh token for logout: {:#}", e);
                None
            }
        };

        if let Some(refresh_token) = refresh_token {
            let access_token = self.access_token().await;
            if let Err(e) = refresh::revoke_refresh_token(
                &self.client,
                &self.base_url,
                &refresh_token,
                access_token.as_deref(),
            )
            .await
            {
                tracing::warn!("Server-side logout failed, clearing local session anyway: {:#}", e);
            }
        }

        self.clear().await?;
        tracing::info!("Logged out");
        Ok(())
    }

    /// Drop the session from memory and storage
    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        state.epoch += 1;
        state.current = None;
        credentials::clear_session(self.store.as_ref())
            .await
            .map_err(ClientError::storage)
    }

    /// Recover from a 401/403 on a request that was sent with `sent_with`.
    ///
    /// Returns the token to resend with, or `None` when no refresh token is
    /// stored and the original failure should propagate. If another request
    /// refreshed while this one waited for the lock, its token is reused
    /// without a second refresh call.
    pub async fn refresh_after_failure(&self, sent_with: Option<&str>) -> Result<Option<String>> {
        let _guard = self.refresh_lock.lock().await;

        let epoch = {
            let state = self.state.read().await;
            if let Some(current) = state.current.as_ref() {
                if sent_with != Some(current.access_token.as_str()) {
                    tracing::debug!("Access token changed while waiting, reusing it");
                    return Ok(Some(current.access_token.clone()));
                }
            }
            state.epoch
        };

        let refresh_token = self
            .store
            .get(REFRESH_TOKEN_KEY)
            .await
            .map_err(ClientError::storage)?;

        let Some(refresh_token) = refresh_token else {
            tracing::debug!("No refresh token stored, not refreshing");
            return Ok(None);
        };

        match refresh::refresh_access_token(&self.client, &self.base_url, &refresh_token).await {
            Ok(access_token) => {
                self.apply_refreshed_token(epoch, access_token.clone()).await?;
                Ok(Some(access_token))
            }
            Err(e) => {
                tracing::error!("Token refresh failed, logging out: {:#}", e);
                self.clear().await?;
                Err(ClientError::RefreshFailed(format!("{:#}", e)))
            }
        }
    }

    /// Persist then publish a refreshed token, unless the session ended meanwhile
    async fn apply_refreshed_token(&self, epoch: u64, access_token: String) -> Result<()> {
        let mut state = self.state.write().await;
        if state.epoch != epoch {
            tracing::warn!("Session changed during refresh, discarding refreshed token");
            return Err(ClientError::SessionExpired);
        }

        self.store
            .set(ACCESS_TOKEN_KEY, &access_token)
            .await
            .map_err(ClientError::storage)?;

        match state.current.as_mut() {
            Some(session) => session.access_token = access_token,
            // Refreshed before restore_session ran; pick up the rest from storage
            None => {
                state.current = credentials::load_session(self.store.as_ref())
                    .await
                    .map_err(ClientError::storage)?;
            }
        }

        Ok(())
    }

    /// Snapshot of the current session
    pub async fn current(&self) -> Option<Session> {
        self.state.read().await.current.clone()
    }

    pub async fn user(&self) -> Option<User> {
        self.state.read().await.current.as_ref().map(|s| s.user.clone())
    }

    /// Current access token, if logged in
    pub async fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .await
            .current
            .as_ref()
            .map(|s| s.access_token.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{MemoryStore, SESSION_KEYS, USER_KEY};
    use async_trait::async_trait;

    /// Accepts the first write, then fails every later one
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        writes: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for FlakyStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            let n = self
                .writes
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if n > 0 {
                anyhow::bail!("disk full");
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key).await
        }
    }

    fn ana() -> User {
        User {
            id: 1,
            name: "Ana".to_string(),
            email: "a@x.com".to_string(),
        }
    }

    fn manager(store: Arc<MemoryStore>, base_url: &str) -> SessionManager {
        SessionManager::new(store, Client::new(), base_url)
    }

    #[tokio::test]
    async fn test_login_then_restore_yields_same_session() {
        let store = Arc::new(MemoryStore::new());
        let first = manager(store.clone(), "http://127.0.0.1:9/api");
        first
            .login(ana(), "tok1".to_string(), "ref1".to_string())
            .await
            .unwrap();

        // Simulate a restart with the same persisted store
        let second = manager(store, "http://127.0.0.1:9/api");
        assert!(!second.is_authenticated().await);
        let restored = second.restore_session().await.unwrap();

        assert_eq!(restored, Some(Session::new(ana(), "tok1", "ref1")));
        assert_eq!(second.current().await, first.current().await);
        assert_eq!(second.access_token().await.as_deref(), Some("tok1"));
    }

    #[tokio::test]
    async fn test_restore_partial_stays_logged_out() {
        let store = Arc::new(MemoryStore::new());
        store.set(ACCESS_TOKEN_KEY, "tok1").await.unwrap();
        store.set(REFRESH_TOKEN_KEY, "ref1").await.unwrap();

        let manager = manager(store, "http://127.0.0.1:9/api");
        assert_eq!(manager.restore_session().await.unwrap(), None);
        assert!(manager.user().await.is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_when_server_unreachable() {
        let store = Arc::new(MemoryStore::new());
        // Port 9 (discard) is not listening; the revoke call fails fast
        let manager = manager(store.clone(), "http://127.0.0.1:9/api");
        manager
            .login(ana(), "tok1".to_string(), "ref1".to_string())
            .await
            .unwrap();

        manager.logout().await.unwrap();

        assert!(manager.current().await.is_none());
        for key in SESSION_KEYS {
            assert_eq!(store.get(key).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_returns_none() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store, "http://127.0.0.1:9/api");

        let outcome = manager.refresh_after_failure(None).await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn test_refresh_reuses_newer_token() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store, "http://127.0.0.1:9/api");
        manager
            .login(ana(), "tok2".to_string(), "ref1".to_string())
            .await
            .unwrap();

        // Request went out with tok1 but tok2 is already current: no network call
        let token = manager.refresh_after_failure(Some("tok1")).await.unwrap();
        assert_eq!(token.as_deref(), Some("tok2"));
    }

    #[tokio::test]
    async fn test_refresh_failure_forces_logout() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone(), "http://127.0.0.1:9/api");
        manager
            .login(ana(), "tok1".to_string(), "ref1".to_string())
            .await
            .unwrap();

        let err = manager.refresh_after_failure(Some("tok1")).await.unwrap_err();
        assert!(matches!(err, ClientError::RefreshFailed(_)));
        assert!(manager.current().await.is_none());
        assert_eq!(store.get(USER_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_refreshed_token_discarded_after_logout() {
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone(), "http://127.0.0.1:9/api");
        manager
            .login(ana(), "tok1".to_string(), "ref1".to_string())
            .await
            .unwrap();
        let epoch = manager.state.read().await.epoch;

        manager.clear().await.unwrap();

        let err = manager
            .apply_refreshed_token(epoch, "tok2".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SessionExpired));
        assert_eq!(store.get(ACCESS_TOKEN_KEY).await.unwrap(), None);
        assert!(manager.current().await.is_none());
    }

    #[tokio::test]
    async fn test_partial_login_write_is_rolled_back() {
        let store = Arc::new(FlakyStore::default());
        let manager = SessionManager::new(store.clone(), Client::new(), "http://127.0.0.1:9/api");

        let err = manager
            .login(ana(), "tok1".to_string(), "ref1".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Storage(_)));
        assert!(!manager.is_authenticated().await);
        for key in SESSION_KEYS {
            assert_eq!(store.get(key).await.unwrap(), None);
        }
        assert_eq!(manager.restore_session().await.unwrap(), None);
    }
}
