//! HTTP client for the two upstream record services (tasks, habits).

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use habrep_core::{Habit, Task};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "habrep-upstream";

/// Which upstream collection a fetch addresses. The two services use
/// different URL schemes, preserved here verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Tasks,
    Habits,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Tasks => "tasks",
            ResourceKind::Habits => "habits",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport failure or non-success status. One failed call aborts the
    /// whole report for that user; there are no retries.
    #[error("{kind} unavailable ({url}): {reason}")]
    Unavailable {
        kind: ResourceKind,
        url: String,
        reason: String,
    },
    /// Response body is not a well-formed JSON array of the expected shape.
    #[error("error decoding {kind} from {url}: {source}")]
    Decode {
        kind: ResourceKind,
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub tasks_base_url: String,
    pub habits_base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            tasks_base_url: "http://localhost:8080".to_string(),
            habits_base_url: "http://localhost:8081".to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// One outbound GET per invocation, decoding a JSON array into typed records.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    tasks_base_url: String,
    habits_base_url: String,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            tasks_base_url: config.tasks_base_url,
            habits_base_url: config.habits_base_url,
        })
    }

    pub async fn fetch_tasks(&self, user_id: &str) -> Result<Vec<Task>, UpstreamError> {
        self.fetch(ResourceKind::Tasks, user_id).await
    }

    pub async fn fetch_habits(&self, user_id: &str) -> Result<Vec<Habit>, UpstreamError> {
        self.fetch(ResourceKind::Habits, user_id).await
    }

    fn url_for(&self, kind: ResourceKind, user_id: &str) -> String {
        match kind {
            ResourceKind::Tasks => format!(
                "{}/Task/users/{}/tasks",
                self.tasks_base_url.trim_end_matches('/'),
                user_id
            ),
            ResourceKind::Habits => format!(
                "{}/users/{}/habits",
                self.habits_base_url.trim_end_matches('/'),
                user_id
            ),
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        user_id: &str,
    ) -> Result<Vec<T>, UpstreamError> {
        let url = self.url_for(kind, user_id);
        let fetch_id = Uuid::new_v4();
        let span = info_span!("upstream_fetch", %fetch_id, %kind, url = url.as_str());

        async {
            let response = self.client.get(&url).send().await.map_err(|err| {
                UpstreamError::Unavailable {
                    kind,
                    url: url.clone(),
                    reason: err.to_string(),
                }
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(UpstreamError::Unavailable {
                    kind,
                    url: url.clone(),
                    reason: format!("http status {status}"),
                });
            }

            let body = response
                .bytes()
                .await
                .map_err(|err| UpstreamError::Unavailable {
                    kind,
                    url: url.clone(),
                    reason: err.to_string(),
                })?;

            serde_json::from_slice(&body).map_err(|source| UpstreamError::Decode {
                kind,
                url,
                source,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(server: &mockito::ServerGuard) -> UpstreamClient {
        UpstreamClient::new(UpstreamConfig {
            tasks_base_url: server.url(),
            habits_base_url: server.url(),
            ..Default::default()
        })
        .expect("client")
    }

    #[tokio::test]
    async fn decodes_a_task_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/Task/users/201/tasks")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"title":"laundry","description":"fold it","dueDate":1767225600,
                     "completedDate":null,"remind":1767222000,"userId":"201"}]"#,
            )
            .create_async()
            .await;

        let tasks = client_for(&server).fetch_tasks("201").await.expect("tasks");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "laundry");
        assert_eq!(tasks[0].due_date, 1767225600);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn decodes_a_habit_array_with_wire_names() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users/201/habits")
            .with_status(200)
            .with_body(
                r#"[{"title":"run","difficulty":"hard","color":"red","score":7,
                     "_id":"h1","userID":"201","type":"good"}]"#,
            )
            .create_async()
            .await;

        let habits = client_for(&server).fetch_habits("201").await.expect("habits");
        assert_eq!(habits.len(), 1);
        assert_eq!(habits[0].habit_id, "h1");
        assert_eq!(habits[0].polarity, "good");
    }

    #[tokio::test]
    async fn empty_array_is_a_valid_result() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users/201/habits")
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let habits = client_for(&server).fetch_habits("201").await.expect("habits");
        assert!(habits.is_empty());
    }

    #[tokio::test]
    async fn server_error_status_maps_to_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/Task/users/201/tasks")
            .with_status(503)
            .create_async()
            .await;

        let err = client_for(&server).fetch_tasks("201").await.unwrap_err();
        match err {
            UpstreamError::Unavailable { kind, reason, .. } => {
                assert_eq!(kind, ResourceKind::Tasks);
                assert!(reason.contains("503"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_maps_to_unavailable() {
        let client = UpstreamClient::new(UpstreamConfig {
            tasks_base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        })
        .expect("client");

        let err = client.fetch_tasks("201").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn malformed_body_maps_to_decode() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/Task/users/201/tasks")
            .with_status(200)
            .with_body("not json at all")
            .create_async()
            .await;

        let err = client_for(&server).fetch_tasks("201").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Decode { kind: ResourceKind::Tasks, .. }));
    }
}
