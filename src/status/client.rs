//! HTTP client for the session listing endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;

/// Session record as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last time the remote process produced or received data.
    pub last_active: DateTime<Utc>,
    /// Whether any client is attached, as last seen by the server.
    pub connected: bool,
}

/// Failure of a single status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// The request could not be sent or timed out.
    Request(String),
    /// The server answered with a non-success status.
    Status(u16),
    /// The body was not a session list.
    Decode(String),
}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(msg) => write!(f, "Status request failed: {msg}"),
            Self::Status(code) => write!(f, "Status request returned HTTP {code}"),
            Self::Decode(msg) => write!(f, "Invalid session list: {msg}"),
        }
    }
}

impl std::error::Error for PollError {}

/// Client for `GET {server}/api/sessions`.
#[derive(Debug, Clone)]
pub struct StatusClient {
    client: reqwest::Client,
    sessions_url: String,
}

impl StatusClient {
    /// Creates a client for the server at `server_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, server_url))
    }

    /// Creates a client with a pre-configured HTTP client.
    pub fn with_client(client: reqwest::Client, server_url: &str) -> Self {
        Self {
            client,
            sessions_url: format!("{}/api/sessions", server_url.trim_end_matches('/')),
        }
    }

    /// URL being polled.
    pub fn sessions_url(&self) -> &str {
        &self.sessions_url
    }

    /// Fetch every session the server knows about.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>, PollError> {
        let response = self
            .client
            .get(&self.sessions_url)
            .send()
            .await
            .map_err(|e| PollError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }

        response
            .json::<Vec<SessionInfo>>()
            .await
            .map_err(|e| PollError::Decode(e.to_string()))
    }

    /// Fetch the record for `session_id`, `None` if the server does not
    /// list it.
    pub async fn find_session(&self, session_id: &str) -> Result<Option<SessionInfo>, PollError> {
        let sessions = self.list_sessions().await?;
        Ok(sessions.into_iter().find(|s| s.id == session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sessions_body() -> serde_json::Value {
        serde_json::json!([
            {
                "id": "a1",
                "name": "build",
                "created_at": "2026-10-19T08:00:00Z",
                "last_active": "2026-10-19T09:30:00.123456789+02:00",
                "connected": true
            },
            {
                "id": "b2",
                "name": "logs",
                "created_at": "2026-10-18T08:00:00Z",
                "last_active": "2026-10-18T08:05:00Z",
                "connected": false
            }
        ])
    }

    #[tokio::test]
    async fn test_list_sessions_parses_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sessions_body()))
            .mount(&server)
            .await;

        let client = StatusClient::new(&server.uri()).unwrap();
        let sessions = client.list_sessions().await.unwrap();

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].name, "build");
        assert!(sessions[0].connected);
        assert_eq!(
            sessions[0].last_active.to_rfc3339(),
            "2026-10-19T07:30:00.123456789+00:00"
        );
    }

    #[tokio::test]
    async fn test_find_session_missing_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sessions_body()))
            .mount(&server)
            .await;

        let client = StatusClient::new(&server.uri()).unwrap();
        assert_eq!(
            client.find_session("b2").await.unwrap().map(|s| s.name),
            Some("logs".to_string())
        );
        assert_eq!(client.find_session("zz").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_server_error_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = StatusClient::new(&server.uri()).unwrap();
        assert_eq!(
            client.list_sessions().await.unwrap_err(),
            PollError::Status(500)
        );
    }

    #[tokio::test]
    async fn test_garbage_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = StatusClient::new(&server.uri()).unwrap();
        assert!(matches!(
            client.list_sessions().await,
            Err(PollError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_request_error() {
        let client = StatusClient::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            client.list_sessions().await,
            Err(PollError::Request(_))
        ));
    }

    #[test]
    fn test_sessions_url_trims_trailing_slash() {
        let client = StatusClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.sessions_url(), "http://localhost:8080/api/sessions");
    }
}
