// Communication with the remote task store
// Every call is a single request/response pair; nothing is retried here.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::app::error::ClientError;
use crate::app::models::{NewTask, Task, TaskId, TaskPatch, UserId};

pub const DEFAULT_BASE_URL: &str = "https://simple-todo-api.kyrregjerstad.workers.dev";

/// Operations the synchronization layer needs from a task store.
#[async_trait]
pub trait TodoApi: Send + Sync {
    /// Tasks of one user scope, in server order, optionally filtered by completion.
    async fn list_todos(
        &self,
        user: UserId,
        completed: Option<bool>,
    ) -> Result<Vec<Task>, ClientError>;

    async fn create_todo(&self, user: UserId, todo: &NewTask) -> Result<Task, ClientError>;

    async fn update_todo(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ClientError>;

    /// Marks a task completed through the dedicated endpoint.
    async fn complete_todo(&self, id: TaskId) -> Result<(), ClientError>;

    async fn delete_todo(&self, id: TaskId) -> Result<(), ClientError>;
}

pub struct HttpTodoClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpTodoClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTodoClient { http, base_url })
    }

    // Base URL with the given path segments appended
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<(StatusCode, String), ClientError> {
        let started = Instant::now();
        let path = url.path().to_owned();
        let mut request = self.http.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|source| {
            warn!(%method, %path, error = %source, "request failed before a response arrived");
            ClientError::Network { source }
        })?;
        let status = response.status();
        let text = response.text().await?;

        debug!(
            %method,
            %path,
            status = status.as_u16(),
            elapsed_ms = elapsed_ms(started),
            "request completed"
        );
        Ok((status, text))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// Non-success status on a read or delete
fn server_error(status: StatusCode, body: String) -> ClientError {
    ClientError::Server {
        status: status.as_u16(),
        body,
    }
}

// Non-success status on a write that carries a payload
fn write_error(status: StatusCode, body: String) -> ClientError {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ClientError::Validation {
            status: status.as_u16(),
            message: body,
        },
        _ => server_error(status, body),
    }
}

fn decode<T: DeserializeOwned>(context: &'static str, body: &str) -> Result<T, ClientError> {
    serde_json::from_str(body).map_err(|source| ClientError::Decode { context, source })
}

// Delete and complete answer with a bare boolean, or nothing at all
fn decode_ack(status: StatusCode, body: String) -> Result<(), ClientError> {
    if body.trim().is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Bool(false)) => Err(server_error(status, body)),
        _ => Ok(()),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(value).map_err(|source| ClientError::Encode {
        context: "request body",
        source,
    })
}

#[async_trait]
impl TodoApi for HttpTodoClient {
    async fn list_todos(
        &self,
        user: UserId,
        completed: Option<bool>,
    ) -> Result<Vec<Task>, ClientError> {
        let mut url = self.endpoint(&["users", &user.to_string(), "todos"]);
        if let Some(completed) = completed {
            url.query_pairs_mut()
                .append_pair("completed", &completed.to_string());
        }

        let (status, body) = self.send(Method::GET, url, None).await?;
        if !status.is_success() {
            return Err(server_error(status, body));
        }
        decode("task list", &body)
    }

    async fn create_todo(&self, user: UserId, todo: &NewTask) -> Result<Task, ClientError> {
        let url = self.endpoint(&["users", &user.to_string(), "todos"]);
        let payload = to_json(todo)?;

        let (status, body) = self.send(Method::POST, url, Some(&payload)).await?;
        if !status.is_success() {
            return Err(write_error(status, body));
        }
        decode("created task", &body)
    }

    async fn update_todo(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, ClientError> {
        let url = self.endpoint(&["todos", &id.to_string()]);
        let payload = to_json(patch)?;

        let (status, body) = self.send(Method::PATCH, url, Some(&payload)).await?;
        if !status.is_success() {
            return Err(write_error(status, body));
        }
        decode("updated task", &body)
    }

    async fn complete_todo(&self, id: TaskId) -> Result<(), ClientError> {
        let url = self.endpoint(&["todos", &id.to_string(), "complete"]);

        let (status, body) = self.send(Method::PATCH, url, None).await?;
        if !status.is_success() {
            return Err(server_error(status, body));
        }
        decode_ack(status, body)
    }

    async fn delete_todo(&self, id: TaskId) -> Result<(), ClientError> {
        let url = self.endpoint(&["todos", &id.to_string()]);

        let (status, body) = self.send(Method::DELETE, url, None).await?;
        if !status.is_success() {
            return Err(server_error(status, body));
        }
        decode_ack(status, body)
    }
}
