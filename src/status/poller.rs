//! Interval task that republishes the attached session's record.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{SessionInfo, StatusClient};

/// Periodic status refresher for one session.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    client: StatusClient,
    session_id: String,
    interval: Duration,
}

impl StatusPoller {
    /// Create a poller for `session_id` ticking every `interval`.
    pub fn new(client: StatusClient, session_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            client,
            session_id: session_id.into(),
            interval,
        }
    }

    /// Run one poll.
    ///
    /// Returns the session record when the server lists it. Missing sessions
    /// and poll failures both return `None`; failures are logged.
    pub async fn poll_once(&self) -> Option<SessionInfo> {
        match self.client.find_session(&self.session_id).await {
            Ok(Some(session)) => Some(session),
            Ok(None) => {
                log::debug!("[StatusPoller] Session {} not listed", self.session_id);
                None
            }
            Err(e) => {
                log::warn!("[StatusPoller] {e}");
                None
            }
        }
    }

    /// Spawn the polling loop on the current runtime.
    ///
    /// The first poll runs immediately. The loop stops once every receiver
    /// has been dropped.
    pub fn spawn(self) -> (watch::Receiver<Option<SessionInfo>>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                if let Some(session) = self.poll_once().await {
                    tx.send_if_modified(|current| {
                        let changed = current.as_ref() != Some(&session);
                        *current = Some(session);
                        changed
                    });
                }
            }
            log::debug!("[StatusPoller] Stopped");
        });
        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_json(id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": name,
            "created_at": "2026-10-19T08:00:00Z",
            "last_active": "2026-10-19T08:01:00Z",
            "connected": true
        })
    }

    fn poller_for(server: &MockServer, session_id: &str) -> StatusPoller {
        let client = StatusClient::new(&server.uri()).unwrap();
        StatusPoller::new(client, session_id, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_poll_once_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(vec![session_json("s1", "main")]),
            )
            .mount(&server)
            .await;

        let poller = poller_for(&server, "s1");
        let session = poller.poll_once().await.unwrap();
        assert_eq!(session.name, "main");
    }

    #[tokio::test]
    async fn test_poll_once_swallows_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let poller = poller_for(&server, "s1");
        assert_eq!(poller.poll_once().await, None);
    }

    #[tokio::test]
    async fn test_spawn_publishes_first_tick_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(vec![session_json("s1", "main")]),
            )
            .mount(&server)
            .await;

        let (mut rx, handle) = poller_for(&server, "s1").spawn();
        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("no status published")
            .unwrap();
        assert_eq!(rx.borrow().as_ref().map(|s| s.name.clone()), Some("main".to_string()));
        handle.abort();
    }

    #[tokio::test]
    async fn test_missing_session_publishes_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(vec![session_json("other", "x")]),
            )
            .mount(&server)
            .await;

        let (mut rx, handle) = poller_for(&server, "s1").spawn();
        let waited = tokio::time::timeout(Duration::from_millis(300), rx.changed()).await;
        assert!(waited.is_err(), "missing session must not publish");
        assert!(rx.borrow().is_none());
        assert!(server.received_requests().await.unwrap().len() >= 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_loop_stops_when_receiver_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
            .mount(&server)
            .await;

        let (rx, handle) = poller_for(&server, "s1").spawn();
        drop(rx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poller did not stop")
            .unwrap();
    }
}
