use reqwest::Method;
use std::sync::Arc;

use crate::auth::{LoginRequest, LoginResponse, RegisterRequest, User};
use crate::error::Result;
use crate::http_client::ApiClient;

/// Login, registration and logout against `/auth`
#[derive(Clone)]
pub struct AuthApi {
    http: Arc<ApiClient>,
}

impl AuthApi {
    pub fn new(http: Arc<ApiClient>) -> Self {
        Self { http }
    }

    /// Authenticate and start a session.
    ///
    /// The session is only touched once the server accepted the credentials.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let request = self
            .http
            .request(Method::POST, "/auth/login")
            .json(&LoginRequest { email, password });

        let LoginResponse {
            user,
            access_token,
            refresh_token,
        } = self.http.send_public_json(request).await?;

        self.http
            .session()
            .login(user.clone(), access_token, refresh_token)
            .await?;
        Ok(user)
    }

    /// Create an account; does not log in
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<()> {
        let request = self
            .http
            .request(Method::POST, "/auth/register")
            .json(&RegisterRequest {
                name,
                email,
                password,
            });

        self.http.send_public(request).await?;
        tracing::info!("Registered account for {}", email);
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        self.http.session().logout().await
    }
}
