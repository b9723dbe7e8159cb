//! ClickUp REST API v2 client.
//!
//! Blocking, one request at a time. Non-2xx responses become
//! [`SyncError::Remote`] with the API's `err` text; connection failures become
//! [`SyncError::Transport`].

use crate::error::{Result, SyncError};
use crate::model::{Comment, NewTask, RemoteTask, TaskUpdate};
use crate::remote::RemoteService;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, trace, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.clickup.com/api/v2";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pages fetched per listing before giving up (100 tasks per page).
pub const MAX_PAGES: u32 = 100;

const USER_AGENT: &str = concat!("clickup-sync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ClickUpClient {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl ClickUpClient {
    /// Build a client for `token` (personal token or OAuth access token).
    ///
    /// # Errors
    ///
    /// Returns a validation error if the token is empty.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_options(token, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Build a client against another base URL with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the token is empty.
    pub fn with_options(token: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SyncError::validation("token", "ClickUp token is empty"));
        }
        let authorization = if token.starts_with("Bearer ") {
            token.to_string()
        } else {
            format!("Bearer {token}")
        };

        Ok(Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        trace!(method, url = %url, "ClickUp request");

        let mut request = self
            .agent
            .request(method, &url)
            .set("Authorization", &self.authorization)
            .set("User-Agent", USER_AGENT);
        for (key, value) in query {
            request = request.query(key, value);
        }

        let response = match body {
            Some(body) => request.send_json(body),
            None => request.call(),
        };

        match response {
            Ok(response) => {
                let text = response
                    .into_string()
                    .map_err(|e| SyncError::Transport(format!("reading {method} {path}: {e}")))?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                Ok(serde_json::from_str(&text)?)
            }
            Err(ureq::Error::Status(status, response)) => {
                let text = response.into_string().unwrap_or_default();
                Err(SyncError::Remote {
                    status,
                    message: api_error_message(&text),
                })
            }
            Err(ureq::Error::Transport(err)) => {
                Err(SyncError::Transport(format!("{method} {path}: {err}")))
            }
        }
    }
}

impl RemoteService for ClickUpClient {
    fn list_all_tasks(&self, list_id: &str) -> Result<Vec<RemoteTask>> {
        let path = format!("/list/{list_id}/task");
        let mut tasks = Vec::new();

        for page in 0..MAX_PAGES {
            let page_str = page.to_string();
            let body = self.send(
                "GET",
                &path,
                &[("page", page_str.as_str()), ("include_closed", "true")],
                None,
            )?;
            let batch = parse_task_page(&body)?;
            if batch.is_empty() {
                debug!(list_id, count = tasks.len(), pages = page, "listed remote tasks");
                return Ok(tasks);
            }
            tasks.extend(batch);
        }

        warn!(list_id, pages = MAX_PAGES, "stopped paging remote tasks at the page cap");
        Ok(tasks)
    }

    fn get_task(&self, id: &str) -> Result<RemoteTask> {
        match self.send("GET", &format!("/task/{id}"), &[], None) {
            Ok(body) => parse_task(&body),
            Err(SyncError::Remote { status: 404, .. }) => {
                Err(SyncError::TaskNotFound { id: id.to_string() })
            }
            Err(err) => Err(err),
        }
    }

    fn create_task(&mut self, list_id: &str, task: &NewTask) -> Result<String> {
        let mut payload = Map::new();
        payload.insert("name".into(), json!(task.name));
        if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
            payload.insert("description".into(), json!(description));
        }
        if let Some(priority) = task.priority {
            payload.insert("priority".into(), json!(priority));
        }
        if !task.tags.is_empty() {
            payload.insert("tags".into(), json!(task.tags));
        }

        let body = self.send(
            "POST",
            &format!("/list/{list_id}/task"),
            &[],
            Some(&Value::Object(payload)),
        )?;
        id_field(&body).ok_or_else(|| SyncError::Remote {
            status: 200,
            message: "create task response has no id".to_string(),
        })
    }

    fn update_task(&mut self, id: &str, update: &TaskUpdate) -> Result<()> {
        let payload = update_payload(update);
        if payload.is_empty() {
            return Ok(());
        }
        self.send("PUT", &format!("/task/{id}"), &[], Some(&Value::Object(payload)))?;
        Ok(())
    }

    fn list_comments(&self, id: &str) -> Result<Vec<Comment>> {
        let body = self.send("GET", &format!("/task/{id}/comment"), &[], None)?;
        parse_comments(&body)
    }

    fn add_comment(&mut self, id: &str, text: &str) -> Result<String> {
        let body = self.send(
            "POST",
            &format!("/task/{id}/comment"),
            &[],
            Some(&json!({ "comment_text": text })),
        )?;
        Ok(id_field(&body).unwrap_or_default())
    }
}

fn update_payload(update: &TaskUpdate) -> Map<String, Value> {
    let mut payload = Map::new();
    if let Some(name) = &update.name {
        payload.insert("name".into(), json!(name));
    }
    if let Some(description) = &update.description {
        payload.insert("description".into(), json!(description));
    }
    if let Some(status) = &update.status {
        payload.insert("status".into(), json!(status));
    }
    if let Some(priority) = update.priority {
        payload.insert("priority".into(), json!(priority));
    }
    payload
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("err").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// String form of an `id` that may be a JSON string or number.
fn id_field(body: &Value) -> Option<String> {
    match body.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct RawTask {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<RawStatus>,
    #[serde(default)]
    priority: Option<RawPriority>,
    #[serde(default)]
    date_updated: Option<Value>,
    #[serde(default)]
    tags: Vec<RawTag>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct RawPriority {
    #[serde(default)]
    id: Value,
}

#[derive(Debug, Deserialize)]
struct RawTag {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    comment_text: String,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    date: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    username: Option<String>,
}

/// Unix milliseconds, as a JSON string or number.
fn millis(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let ms = match value? {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    Utc.timestamp_millis_opt(ms).single()
}

fn priority_id(value: &Value) -> Option<u8> {
    let id = match value {
        Value::String(s) => s.trim().parse::<u8>().ok()?,
        Value::Number(n) => u8::try_from(n.as_u64()?).ok()?,
        _ => return None,
    };
    (id != 0).then_some(id)
}

fn task_from_raw(raw: RawTask) -> RemoteTask {
    RemoteTask {
        id: raw.id,
        name: raw.name,
        description: raw.description,
        status: raw
            .status
            .map(|s| s.status.to_lowercase())
            .unwrap_or_default(),
        priority: raw.priority.as_ref().and_then(|p| priority_id(&p.id)),
        date_updated: millis(raw.date_updated.as_ref())
            .unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH),
        tags: raw
            .tags
            .into_iter()
            .map(|t| t.name)
            .filter(|name| !name.is_empty())
            .collect(),
    }
}

/// Parse one task object.
///
/// # Errors
///
/// Returns an error if the body is not a task object.
pub fn parse_task(body: &Value) -> Result<RemoteTask> {
    let raw = RawTask::deserialize(body)?;
    Ok(task_from_raw(raw))
}

/// Parse a `{"tasks": [...]}` page.
///
/// # Errors
///
/// Returns an error if any task in the page is malformed.
pub fn parse_task_page(body: &Value) -> Result<Vec<RemoteTask>> {
    let Some(tasks) = body.get("tasks") else {
        return Ok(Vec::new());
    };
    let raw: Vec<RawTask> = Vec::deserialize(tasks)?;
    Ok(raw.into_iter().map(task_from_raw).collect())
}

/// Parse a `{"comments": [...]}` body.
///
/// # Errors
///
/// Returns an error if a comment is malformed.
pub fn parse_comments(body: &Value) -> Result<Vec<Comment>> {
    let Some(comments) = body.get("comments") else {
        return Ok(Vec::new());
    };
    let raw: Vec<RawComment> = Vec::deserialize(comments)?;
    Ok(raw
        .into_iter()
        .map(|c| Comment {
            id: match c.id {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            },
            author: c.user.and_then(|u| u.username),
            text: c.comment_text,
            created_at: millis(c.date.as_ref()),
        })
        .collect())
}
