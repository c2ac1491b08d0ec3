use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Request, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::SessionManager;
use crate::error::{ClientError, Result};
use crate::models::ErrorBody;

/// Join an API path onto the base URL
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// 401 and 403 both mean the access token was not accepted
pub fn is_auth_failure(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}

/// Build the shared transport with the configured timeouts
pub fn build_transport(connect_timeout: u64, request_timeout: u64) -> anyhow::Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout))
        .timeout(Duration::from_secs(request_timeout))
        .build()
        .context("Failed to create HTTP client")
}

/// A request moving through the interception pipeline
struct PendingRequest {
    request: Request,

    /// Set once the request has been resent after a refresh
    retried: bool,
}

impl PendingRequest {
    fn new(request: Request) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    /// A request whose auth failure goes straight back to the caller
    fn without_recovery(request: Request) -> Self {
        Self {
            request,
            retried: true,
        }
    }

    /// Fresh copy of the request carrying `token` as its bearer credential
    fn authorized(&self, token: Option<&str>) -> Result<Request> {
        let mut req = self.request.try_clone().ok_or_else(|| {
            ClientError::Internal(anyhow::anyhow!("Request body is not cloneable"))
        })?;

        match token {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .context("Access token is not a valid header value")?;
                req.headers_mut().insert(AUTHORIZATION, value);
            }
            None => {
                req.headers_mut().remove(AUTHORIZATION);
                tracing::debug!(url = %req.url(), "Sending request without a bearer token");
            }
        }

        Ok(req)
    }
}

/// HTTP client for the task API
/// Attaches the session's bearer token and recovers once from an expired token
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Session owner
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(client: Client, session: Arc<SessionManager>) -> Self {
        Self { client, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Start a request against `path` under the API base URL
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, endpoint_url(self.session.base_url(), path))
    }

    /// Send a request through the gateway
    ///
    /// - 2xx: returned unchanged
    /// - 401/403 on the first attempt: refresh the token and resend once
    /// - anything else: mapped to a [`ClientError`]
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        let token = self.session.access_token().await;
        self.dispatch(PendingRequest::new(request), token).await
    }

    /// Send a request that authenticates by its own body (login, register).
    ///
    /// No bearer token is attached and a 401/403 is the server's answer to
    /// the credentials, so the session is never refreshed or cleared.
    pub async fn send_public(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        self.dispatch(PendingRequest::without_recovery(request), None)
            .await
    }

    /// Send and decode a JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        decode_json(self.send(builder).await?).await
    }

    /// [`send_public`](Self::send_public) and decode a JSON body
    pub async fn send_public_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T> {
        decode_json(self.send_public(builder).await?).await
    }

    /// Send and discard the body
    pub async fn send_empty(&self, builder: RequestBuilder) -> Result<()> {
        self.send(builder).await.map(|_| ())
    }

    async fn dispatch(
        &self,
        mut pending: PendingRequest,
        mut token: Option<String>,
    ) -> Result<Response> {
        let url = pending.request.url().clone();
        tracing::debug!(method = %pending.request.method(), url = %url, "Sending HTTP request");

        loop {
            let req = pending.authorized(token.as_deref())?;
            let response = self.execute(req).await?;
            let status = response.status();

            if status.is_success() {
                tracing::debug!(status = %status, "Request successful");
                return Ok(response);
            }

            if !is_auth_failure(status) || pending.retried {
                return Err(error_from_response(response).await);
            }

            pending.retried = true;
            tracing::warn!(status = %status, url = %url, "Authorization rejected, refreshing token");

            match self.session.refresh_after_failure(token.as_deref()).await? {
                Some(fresh) => token = Some(fresh),
                None => return Err(error_from_response(response).await),
            }
        }
    }

    async fn execute(&self, req: Request) -> Result<Response> {
        let url = req.url().clone();
        self.client.execute(req).await.map_err(|e| {
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else if e.is_request() {
                "request_error"
            } else if e.is_body() {
                "body_error"
            } else {
                "unknown"
            };

            tracing::warn!(
                error_kind = error_kind,
                error = %e,
                url = %url,
                "HTTP request error"
            );
            ClientError::Transport(e)
        })
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let url = response.url().clone();
    response
        .json::<T>()
        .await
        .with_context(|| format!("Failed to parse response from {}", url))
        .map_err(ClientError::Internal)
}

/// Map an error response to the client taxonomy
async fn error_from_response(response: Response) -> ClientError {
    let status = response.status();
    let url = response.url().clone();
    let error_text = response.text().await.unwrap_or_default();

    tracing::warn!(
        status = status.as_u16(),
        url = %url,
        response_body = %error_text,
        "HTTP request failed with error response"
    );

    let body: ErrorBody = serde_json::from_str(&error_text).unwrap_or_default();
    match body {
        ErrorBody {
            errors: Some(errors),
            ..
        } if !errors.is_empty() => ClientError::Validation(errors),
        ErrorBody {
            message: Some(message),
            ..
        } => ClientError::Api {
            status: status.as_u16(),
            message,
        },
        _ => ClientError::Api {
            status: status.as_u16(),
            message: if error_text.is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                error_text
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;

    #[test]
    fn test_endpoint_url() {
        assert_eq!(
            endpoint_url("http://localhost:5500/api", "/tasks"),
            "http://localhost:5500/api/tasks"
        );
        assert_eq!(
            endpoint_url("http://localhost:5500/api/", "auth/login"),
            "http://localhost:5500/api/auth/login"
        );
    }

    #[test]
    fn test_auth_failure_statuses() {
        assert!(is_auth_failure(StatusCode::UNAUTHORIZED));
        assert!(is_auth_failure(StatusCode::FORBIDDEN));
        assert!(!is_auth_failure(StatusCode::NOT_FOUND));
        assert!(!is_auth_failure(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_authorized_sets_and_strips_bearer() {
        let client = Client::new();
        let request = client
            .get("http://localhost/api/tasks")
            .header(AUTHORIZATION, "Bearer stale")
            .build()
            .unwrap();
        let pending = PendingRequest::new(request);

        let req = pending.authorized(Some("tok1")).unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer tok1");

        let req = pending.authorized(None).unwrap();
        assert!(req.headers().get(AUTHORIZATION).is_none());
        assert!(!pending.retried);
    }

    #[test]
    fn test_public_request_starts_without_recovery() {
        let request = Client::new()
            .post("http://localhost/api/auth/login")
            .build()
            .unwrap();
        let pending = PendingRequest::without_recovery(request);

        assert!(pending.retried);
        let req = pending.authorized(None).unwrap();
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_request_uses_base_url() {
        let session = Arc::new(SessionManager::new(
            Arc::new(MemoryStore::new()),
            Client::new(),
            "http://localhost:5500/api",
        ));
        let api = ApiClient::new(Client::new(), session);
        let req = api.request(Method::DELETE, "/tasks/7").build().unwrap();

        assert_eq!(req.url().as_str(), "http://localhost:5500/api/tasks/7");
        assert_eq!(req.method(), Method::DELETE);
    }

    #[test]
    fn test_build_transport() {
        assert!(build_transport(5, 30).is_ok());
    }
}
