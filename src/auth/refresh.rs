// Token refresh and server-side logout calls
//
// These go straight to the transport, never through the authenticated
// gateway, so they can never trigger another refresh.

use anyhow::{Context, Result};
use reqwest::Client;

use super::types::{RefreshResponse, RefreshTokenRequest};
use crate::http_client::endpoint_url;

const REFRESH_PATH: &str = "/auth/refresh";
const LOGOUT_PATH: &str = "/auth/logout";

/// Exchange a refresh token for a new access token
pub async fn refresh_access_token(
    client: &Client,
    base_url: &str,
    refresh_token: &str,
) -> Result<String> {
    let url = endpoint_url(base_url, REFRESH_PATH);
    tracing::debug!(url = %url, "Refreshing access token...");

    let response = client
        .post(&url)
        .json(&RefreshTokenRequest { refresh_token })
        .send()
        .await
        .context("Failed to send refresh request")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            body = %error_text,
            "Token refresh rejected"
        );
        anyhow::bail!("Refresh failed: {} - {}", status, error_text);
    }

    let data: RefreshResponse = response
        .json()
        .await
        .context("Failed to parse refresh response")?;

    if data.access_token.is_empty() {
        anyhow::bail!("Refresh response does not contain accessToken");
    }

    tracing::info!("Access token refreshed");
    Ok(data.access_token)
}

/// Ask the server to invalidate a refresh token
pub async fn revoke_refresh_token(
    client: &Client,
    base_url: &str,
    refresh_token: &str,
    access_token: Option<&str>,
) -> Result<()> {
    let url = endpoint_url(base_url, LOGOUT_PATH);

    let mut request = client
        .post(&url)
        .json(&RefreshTokenRequest { refresh_token });
    if let Some(token) = access_token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .context("Failed to send logout request")?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        anyhow::bail!("Logout failed: {} - {}", status, error_text);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_refresh_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/refresh")
            .match_body(Matcher::Json(json!({ "refreshToken": "ref1" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"accessToken":"tok2"}"#)
            .expect(1)
            .create_async()
            .await;

        let base = format!("{}/api", server.url());
        let token = refresh_access_token(&Client::new(), &base, "ref1")
            .await
            .unwrap();

        assert_eq!(token, "tok2");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/refresh")
            .with_status(403)
            .with_body(r#"{"message":"Invalid refresh token"}"#)
            .create_async()
            .await;

        let base = format!("{}/api", server.url());
        let err = refresh_access_token(&Client::new(), &base, "stale")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_refresh_empty_token_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/refresh")
            .with_status(200)
            .with_body(r#"{"accessToken":""}"#)
            .create_async()
            .await;

        let base = format!("{}/api", server.url());
        assert!(refresh_access_token(&Client::new(), &base, "ref1")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_revoke_sends_refresh_token_and_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/auth/logout")
            .match_header("authorization", "Bearer tok1")
            .match_body(Matcher::Json(json!({ "refreshToken": "ref1" })))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let base = format!("{}/api", server.url());
        revoke_refresh_token(&Client::new(), &base, "ref1", Some("tok1"))
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
