//! Authenticated Spotify Web API client.
//!
//! Every request carries the current access token. A 401 triggers the refresh
//! protocol and the request is re-issued, at most [`MAX_REFRESHES`] times. The
//! refreshed token is written back to the [`Store`] with a compare-and-swap on
//! the previous value, so concurrent clients for the same user converge on the
//! token Spotify issued last without any cross-task lock.

use crate::config::{LOG_TARGET, MAX_REFRESHES, USER_AGENT};
use crate::error::{Result, SpotifyError};
use muzee_core::{ClientCredentials, CoreError, HttpConfig, Store, TokenPair, UserId};
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{
    default_on_request_failure, default_on_request_success, policies::ExponentialBackoff,
    RetryError, Retryable, RetryableStrategy, RetryTransientMiddleware,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Retries 429 and 5xx responses. Timeouts are left to the client, which
/// retries them exactly once on its own.
struct TransientResponses;

impl RetryableStrategy for TransientResponses {
    fn handle(
        &self,
        res: &std::result::Result<reqwest::Response, reqwest_middleware::Error>,
    ) -> Option<Retryable> {
        match res {
            Ok(response) => default_on_request_success(response),
            Err(e) if is_timeout(e) => Some(Retryable::Fatal),
            Err(e) => default_on_request_failure(e),
        }
    }
}

/// Whether a send failed because the request timed out.
///
/// Errors leaving [`RetryTransientMiddleware`] are wrapped in a [`RetryError`]
/// inside `Error::Middleware`, so the wrapper is unpacked before checking.
fn is_timeout(error: &reqwest_middleware::Error) -> bool {
    match error {
        reqwest_middleware::Error::Reqwest(e) => e.is_timeout(),
        reqwest_middleware::Error::Middleware(e) => {
            if let Some(RetryError::Error(inner) | RetryError::WithRetries { err: inner, .. }) =
                e.downcast_ref::<RetryError>()
            {
                return is_timeout(inner);
            }
            e.downcast_ref::<reqwest::Error>()
                .is_some_and(reqwest::Error::is_timeout)
        }
    }
}

/// Spotify error body: `{"error": {"status": 400, "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

/// Accounts service reply to a refresh grant
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// A client bound to one user's [`TokenPair`] for the span of one invocation.
///
/// Dropping the client releases its connection pool.
pub struct SpotifyClient {
    http: ClientWithMiddleware,
    api_base_url: String,
    token_url: String,
    tokens: RwLock<TokenPair>,
    store: Arc<dyn Store>,
}

impl SpotifyClient {
    /// Create a client around an existing token pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(tokens: TokenPair, store: Arc<dyn Store>, config: &HttpConfig) -> Result<Self> {
        // Base client with timeout
        let base_client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        // Wrap with retry middleware (exponential backoff) for 429 and 5xx
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(config.max_transient_retries);
        let http = ClientBuilder::new(base_client)
            .with(RetryTransientMiddleware::new_with_policy_and_strategy(
                retry_policy,
                TransientResponses,
            ))
            .build();

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            tokens: RwLock::new(tokens),
            store,
        })
    }

    /// Load a user's stored tokens and create a client for them.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownUser`] (wrapped) if the user has no tokens, or an
    /// error if the store or HTTP client fails.
    pub async fn for_user(
        store: Arc<dyn Store>,
        user: UserId,
        credentials: &ClientCredentials,
        config: &HttpConfig,
    ) -> Result<Self> {
        let stored = store
            .token_pair(user)
            .await?
            .ok_or(CoreError::UnknownUser { user_id: user })?;

        Self::new(TokenPair::new(stored, credentials), store, config)
    }

    /// The access token currently held in memory
    pub async fn access_token(&self) -> String {
        self.tokens.read().await.access_token.clone()
    }

    /// # Errors
    ///
    /// See [`SpotifyClient::request`].
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        self.request(Method::GET, path, query, None).await
    }

    /// # Errors
    ///
    /// See [`SpotifyClient::request`].
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    /// # Errors
    ///
    /// See [`SpotifyClient::request`].
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    /// # Errors
    ///
    /// See [`SpotifyClient::request`].
    pub async fn delete(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::DELETE, path, &[], Some(body)).await
    }

    /// Issue one logical API request, refreshing the access token as needed.
    ///
    /// An empty success body yields [`Value::Null`].
    ///
    /// # Errors
    ///
    /// - [`SpotifyError::CantRefresh`] if the refresh grant is rejected or the
    ///   token is still rejected after [`MAX_REFRESHES`] refreshes
    /// - [`SpotifyError::NotFound`] on 404
    /// - [`SpotifyError::UpstreamRejected`] on any other non-success status
    /// - [`SpotifyError::Timeout`] if the request timed out twice
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut refreshes = 0;

        loop {
            match self.send_once(&method, path, query, body).await {
                Err(SpotifyError::AuthExpired) if refreshes < MAX_REFRESHES => {
                    refreshes += 1;
                    debug!(
                        target: LOG_TARGET,
                        "{} {} unauthorized, refreshing token ({}/{})",
                        method, path, refreshes, MAX_REFRESHES
                    );
                    self.refresh_access_token().await?;
                }
                Err(SpotifyError::AuthExpired) => {
                    warn!(
                        target: LOG_TARGET,
                        "{} {} still unauthorized after {} refreshes", method, path, refreshes
                    );
                    return Err(SpotifyError::CantRefresh {
                        reason: format!("access token rejected after {refreshes} refreshes"),
                    });
                }
                other => return other,
            }
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let access_token = self.access_token().await;
        let url = format!("{}/{}", self.api_base_url, path.trim_start_matches('/'));
        debug!(target: LOG_TARGET, "Spotify {} {}", method, url);

        let response = self
            .send_with_timeout_retry(method, path, || {
                let builder = self
                    .http
                    .request(method.clone(), &url)
                    .bearer_auth(&access_token)
                    .query(query);
                match body {
                    Some(body) => builder.json(body),
                    None => builder,
                }
            })
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SpotifyError::AuthExpired);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(SpotifyError::NotFound {
                path: path.to_string(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = error_message(status, &text);
            let params = format_params(query);
            error!(
                target: LOG_TARGET,
                "Spotify rejected {} {} [{}] with {}: {}", method, path, params, status, message
            );
            return Err(SpotifyError::UpstreamRejected {
                status: status.as_u16(),
                method: method.to_string(),
                path: path.to_string(),
                params,
                message,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Send a request, retrying exactly once if the first attempt times out.
    async fn send_with_timeout_retry<F>(
        &self,
        method: &Method,
        path: &str,
        build: F,
    ) -> Result<reqwest::Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut timed_out = false;

        loop {
            match build().send().await {
                Ok(response) => return Ok(response),
                Err(e) if is_timeout(&e) && !timed_out => {
                    warn!(target: LOG_TARGET, "{} {} timed out, retrying once", method, path);
                    timed_out = true;
                }
                Err(e) if is_timeout(&e) => {
                    error!(target: LOG_TARGET, "{} {} timed out twice", method, path);
                    return Err(SpotifyError::Timeout {
                        method: method.to_string(),
                        path: path.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Exchange the refresh token for a new access token and publish it.
    async fn refresh_access_token(&self) -> Result<()> {
        let current = self.tokens.read().await.clone();
        info!(target: LOG_TARGET, "Refreshing Spotify access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", current.refresh_token.as_str()),
            ("client_id", current.client_id.as_str()),
            ("client_secret", current.client_secret.as_str()),
        ];

        let response = self
            .send_with_timeout_retry(&Method::POST, "token", || {
                self.http.post(&self.token_url).form(&form)
            })
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let reply: RefreshResponse =
            serde_json::from_str(&text).map_err(|e| SpotifyError::CantRefresh {
                reason: format!("unreadable token response ({status}): {e}"),
            })?;

        if reply.error.as_deref() == Some("invalid_grant") {
            warn!(target: LOG_TARGET, "Refresh token was revoked");
            return Err(SpotifyError::CantRefresh {
                reason: reply
                    .error_description
                    .unwrap_or_else(|| "invalid_grant".to_string()),
            });
        }

        let Some(new_access) = reply.access_token.filter(|_| reply.error.is_none()) else {
            let reason = reply
                .error_description
                .or(reply.error)
                .unwrap_or_else(|| format!("no access token in response ({status})"));
            warn!(target: LOG_TARGET, "Token refresh failed: {}", reason);
            return Err(SpotifyError::CantRefresh { reason });
        };

        let rotated = reply
            .refresh_token
            .filter(|token| *token != current.refresh_token);

        {
            let mut tokens = self.tokens.write().await;
            tokens.access_token.clone_from(&new_access);
            if let Some(rotated) = &rotated {
                tokens.refresh_token.clone_from(rotated);
            }
        }

        if !self
            .store
            .cas_update_access_token(&current.access_token, &new_access)
            .await?
        {
            debug!(
                target: LOG_TARGET,
                "Stored access token already rotated by another task"
            );
        }

        if let Some(rotated) = rotated {
            if !self
                .store
                .cas_update_refresh_token(&current.refresh_token, &rotated)
                .await?
            {
                debug!(
                    target: LOG_TARGET,
                    "Stored refresh token already rotated by another task"
                );
            }
        }

        info!(target: LOG_TARGET, "Spotify access token refreshed");
        Ok(())
    }
}

fn error_message(status: StatusCode, text: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(text)
        .ok()
        .and_then(|body| body.error.message)
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                text.to_string()
            }
        })
}

fn format_params(query: &[(&str, String)]) -> String {
    query
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use muzee_core::{SqliteStore, StoredTokens};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn http_config(server: &MockServer) -> HttpConfig {
        HttpConfig {
            api_base_url: server.uri(),
            token_url: format!("{}/api/token", server.uri()),
            request_timeout_secs: 1,
            connect_timeout_secs: 1,
            max_transient_retries: 0,
        }
    }

    pub(crate) async fn store_with_tokens(access: &str) -> (Arc<SqliteStore>, UserId) {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let user = store
            .upsert_user(
                "spotify-user",
                "Ada",
                &StoredTokens {
                    access_token: access.to_string(),
                    refresh_token: "r0".to_string(),
                },
            )
            .await
            .unwrap();
        (store, user)
    }

    pub(crate) async fn client_for(server: &MockServer) -> (SpotifyClient, Arc<SqliteStore>, UserId) {
        let (store, user) = store_with_tokens("a0").await;
        let client = SpotifyClient::for_user(
            store.clone(),
            user,
            &ClientCredentials::new("client", "secret"),
            &http_config(server),
        )
        .await
        .unwrap();
        (client, store, user)
    }

    async fn stored_access(store: &SqliteStore, user: UserId) -> String {
        store.token_pair(user).await.unwrap().unwrap().access_token
    }

    #[tokio::test]
    async fn test_get_sends_bearer_token_and_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer a0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ada" })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let me = client.get("me", &[]).await.unwrap();
        assert_eq!(me["id"], "ada");
    }

    #[tokio::test]
    async fn test_empty_success_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/playlists/p1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let value = client
            .put("playlists/p1", &json!({ "description": "hi" }))
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_and_reissues() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer a0"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ada" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "a1" })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, store, user) = client_for(&server).await;
        let me = client.get("me", &[]).await.unwrap();

        assert_eq!(me["id"], "ada");
        assert_eq!(client.access_token().await, "a1");
        assert_eq!(stored_access(&store, user).await, "a1");
    }

    #[tokio::test]
    async fn test_third_unauthorized_fails_with_cant_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(3)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "a1" })))
            .expect(2)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let result = client.get("me", &[]).await;
        assert!(matches!(result, Err(SpotifyError::CantRefresh { .. })));
    }

    #[tokio::test]
    async fn test_invalid_grant_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "Refresh token revoked"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, store, user) = client_for(&server).await;
        let result = client.get("me", &[]).await;

        assert!(matches!(
            result,
            Err(SpotifyError::CantRefresh { reason }) if reason == "Refresh token revoked"
        ));
        assert_eq!(stored_access(&store, user).await, "a0");
    }

    #[tokio::test]
    async fn test_refresh_without_access_token_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token_type": "Bearer" })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let result = client.get("me", &[]).await;
        assert!(matches!(result, Err(SpotifyError::CantRefresh { .. })));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer a0"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ada" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "a1",
                "refresh_token": "r1"
            })))
            .mount(&server)
            .await;

        let (client, store, user) = client_for(&server).await;
        client.get("me", &[]).await.unwrap();

        let stored = store.token_pair(user).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "a1");
        assert_eq!(stored.refresh_token, "r1");
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_converge_on_an_issued_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer a0"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ada" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "a1" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "a2" })))
            .mount(&server)
            .await;

        let (store, user) = store_with_tokens("a0").await;
        let credentials = ClientCredentials::new("client", "secret");
        let config = http_config(&server);
        let first = SpotifyClient::for_user(store.clone(), user, &credentials, &config)
            .await
            .unwrap();
        let second = SpotifyClient::for_user(store.clone(), user, &credentials, &config)
            .await
            .unwrap();

        let (a, b) = tokio::join!(first.get("me", &[]), second.get("me", &[]));
        assert!(a.is_ok());
        assert!(b.is_ok());

        let stored = stored_access(&store, user).await;
        assert!(stored == "a1" || stored == "a2", "stored token was {stored}");
    }

    #[tokio::test]
    async fn test_not_found_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlists/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let result = client.get("playlists/gone", &[]).await;
        assert!(matches!(
            result,
            Err(SpotifyError::NotFound { path }) if path == "playlists/gone"
        ));
    }

    #[tokio::test]
    async fn test_bad_request_is_rejected_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "status": 400, "message": "No search query" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let result = client
            .get("search", &[("type", "playlist".to_string())])
            .await;

        match result {
            Err(SpotifyError::UpstreamRejected {
                status,
                method,
                path,
                params,
                message,
            }) => {
                assert_eq!(status, 400);
                assert_eq!(method, "GET");
                assert_eq!(path, "search");
                assert_eq!(params, "type=playlist");
                assert_eq!(message, "No search query");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "id": "slow" }))
                    .set_delay(Duration::from_secs(3)),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ada" })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let me = client.get("me", &[]).await.unwrap();
        assert_eq!(me["id"], "ada");
    }

    #[tokio::test]
    async fn test_second_timeout_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .expect(2)
            .mount(&server)
            .await;

        let (client, _, _) = client_for(&server).await;
        let result = client.get("me", &[]).await;
        assert!(matches!(result, Err(SpotifyError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_token_endpoint_timeout_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer a0"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "ada" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "late" }))
                    .set_delay(Duration::from_secs(3)),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "a1" })))
            .expect(1)
            .mount(&server)
            .await;

        let (client, store, user) = client_for(&server).await;
        let me = client.get("me", &[]).await.unwrap();

        assert_eq!(me["id"], "ada");
        assert_eq!(stored_access(&store, user).await, "a1");
    }

    #[test]
    fn test_error_message_prefers_spotify_body() {
        assert_eq!(
            error_message(
                StatusCode::FORBIDDEN,
                r#"{"error":{"status":403,"message":"Insufficient client scope"}}"#
            ),
            "Insufficient client scope"
        );
        assert_eq!(error_message(StatusCode::FORBIDDEN, ""), "Forbidden");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, "oops"), "oops");
    }
}
