//! HTTP client for the remote identity service.
//!
//! This module provides the `IdentityClient` struct for the three calls the
//! session lifecycle needs: `/user/me`, `/login` and `/register`.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::User;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// The core enforces no timeout of its own; this bounds the transport.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const ME_PATH: &str = "/user/me";
const LOGIN_PATH: &str = "/login";
const REGISTER_PATH: &str = "/register";

const LOGIN_FAILED: &str = "Login failed";
const REGISTER_FAILED: &str = "Registration failed";
const ME_FAILED: &str = "Failed to fetch current user";

#[derive(Debug, Deserialize)]
struct MeResponse {
    #[serde(default)]
    user: Option<User>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: Option<String>,
}

/// Client for the identity service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
}

impl IdentityClient {
    /// Create a client for the service at `base_url` with the default timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch the user the bearer token belongs to.
    /// Returns `None` when the body has no `user` (or it is null).
    pub async fn me(&self, token: &str) -> Result<Option<User>, ApiError> {
        let url = self.url(ME_PATH);
        debug!(url = %url, "Fetching current user");

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let response = Self::check_response(response, ME_FAILED).await?;
        let body: MeResponse = Self::parse_json(response).await?;
        Ok(body.user)
    }

    /// Exchange username and password for a bearer token
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let url = self.url(LOGIN_PATH);
        debug!(url = %url, username = username, "Sending login request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let response = Self::check_response(response, LOGIN_FAILED).await?;
        let body: LoginResponse = Self::parse_json(response).await?;

        body.token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("login response has no token".to_string()))
    }

    /// Create an account. The payload is forwarded as-is; only a 2xx status
    /// counts as success and the response body is ignored.
    pub async fn register(&self, payload: &Value) -> Result<(), ApiError> {
        let url = self.url(REGISTER_PATH);
        debug!(url = %url, "Sending registration request");

        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(payload)
            .send()
            .await?;

        Self::check_response(response, REGISTER_FAILED).await?;
        Ok(())
    }

    /// Check if response is successful, returning an error with the service's
    /// message if not.
    async fn check_response(response: Response, fallback: &str) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(status = %status, "Identity service returned an error status");
            Err(ApiError::from_status(status, &body, fallback))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = IdentityClient::new("http://localhost:3000/").expect("client builds");
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(client.url(ME_PATH), "http://localhost:3000/user/me");
    }

    #[tokio::test]
    async fn test_me_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/user/me")
            .match_header("authorization", "Bearer tok123")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"user":{"id":1,"username":"bob"}}"#)
            .create_async()
            .await;

        let client = IdentityClient::new(&server.url()).expect("client builds");
        let user = client.me("tok123").await.expect("me succeeds");
        assert_eq!(user, Some(User::new(json!({"id": 1, "username": "bob"}))));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_me_missing_or_null_user() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("GET", "/user/me")
            .match_header("authorization", "Bearer a")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let _null = server
            .mock("GET", "/user/me")
            .match_header("authorization", "Bearer b")
            .with_status(200)
            .with_body(r#"{"user":null}"#)
            .create_async()
            .await;

        let client = IdentityClient::new(&server.url()).expect("client builds");
        assert_eq!(client.me("a").await.expect("me succeeds"), None);
        assert_eq!(client.me("b").await.expect("me succeeds"), None);
    }

    #[tokio::test]
    async fn test_me_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/user/me")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let client = IdentityClient::new(&server.url()).expect("client builds");
        let err = client.me("tok").await.expect_err("malformed body fails");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_login_posts_json_credentials() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/login")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"username": "bob", "password": "rightpass"})))
            .with_status(200)
            .with_body(r#"{"token":"tok123"}"#)
            .create_async()
            .await;

        let client = IdentityClient::new(&server.url()).expect("client builds");
        let token = client.login("bob", "rightpass").await.expect("login succeeds");
        assert_eq!(token, "tok123");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_login_rejected_and_missing_token() {
        let mut server = mockito::Server::new_async().await;
        let _rejected = server
            .mock("POST", "/login")
            .match_body(mockito::Matcher::PartialJson(json!({"password": "wrongpass"})))
            .with_status(401)
            .with_body(r#"{"message":"bad credentials"}"#)
            .create_async()
            .await;
        let _no_token = server
            .mock("POST", "/login")
            .match_body(mockito::Matcher::PartialJson(json!({"password": "odd"})))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = IdentityClient::new(&server.url()).expect("client builds");

        let err = client.login("bob", "wrongpass").await.expect_err("login rejected");
        assert_eq!(err.to_string(), "bad credentials");

        let err = client.login("bob", "odd").await.expect_err("token missing");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_register_statuses() {
        let mut server = mockito::Server::new_async().await;
        let _created = server
            .mock("POST", "/register")
            .match_body(mockito::Matcher::PartialJson(json!({"username": "new"})))
            .with_status(201)
            .create_async()
            .await;
        let _conflict = server
            .mock("POST", "/register")
            .match_body(mockito::Matcher::PartialJson(json!({"username": "bob"})))
            .with_status(409)
            .with_body(r#"{"message":"exists"}"#)
            .create_async()
            .await;
        let _invalid = server
            .mock("POST", "/register")
            .match_body(mockito::Matcher::PartialJson(json!({"username": ""})))
            .with_status(422)
            .create_async()
            .await;

        let client = IdentityClient::new(&server.url()).expect("client builds");

        client
            .register(&json!({"username": "new", "password": "pw"}))
            .await
            .expect("register succeeds");

        match client.register(&json!({"username": "bob"})).await {
            Err(ApiError::Conflict(msg)) => assert_eq!(msg, "exists"),
            other => panic!("expected Conflict, got {:?}", other),
        }

        match client.register(&json!({"username": ""})).await {
            Err(ApiError::Rejected { status, message }) => {
                assert_eq!(status.as_u16(), 422);
                assert_eq!(message, REGISTER_FAILED);
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_service_is_network_error() {
        // Port 9 (discard) on localhost is not expected to accept HTTP
        let client = IdentityClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2))
            .expect("client builds");
        let err = client.me("tok").await.expect_err("connection fails");
        assert!(matches!(err, ApiError::NetworkError(_)));
    }
}
