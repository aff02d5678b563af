use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// Partition key for the remote task collections. Not an identity, just a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Server-assigned task identifier, unique within a user scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A task as confirmed by the remote store.
///
/// Deserialization goes through [`TaskRecord`] so that a payload with an empty
/// name, a non-positive id or an unparseable timestamp is rejected as a decode
/// error instead of producing a half-valid task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TaskRecord")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    // Patch that flips completion relative to this snapshot
    pub fn toggled(&self) -> TaskPatch {
        TaskPatch::completion(!self.completed)
    }
}

// Wire shape of a task before validation
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    id: i64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    completed: bool,
    created_at: String,
}

impl TryFrom<TaskRecord> for Task {
    type Error = String;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        if record.id <= 0 {
            return Err(format!("task id must be positive, got {}", record.id));
        }
        if record.name.trim().is_empty() {
            return Err(format!("task {} has an empty name", record.id));
        }

        Ok(Task {
            id: TaskId(record.id),
            name: record.name,
            description: record.description.filter(|d| !d.is_empty()),
            completed: record.completed,
            created_at: parse_timestamp(&record.created_at)?,
        })
    }
}

// Accepts RFC 3339 and the bare "YYYY-MM-DD HH:MM:SS" form (taken as UTC)
fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("invalid createdAt timestamp '{value}'"))
}

// Body of a creation request. The server assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl NewTask {
    pub fn named(name: impl Into<String>) -> Self {
        NewTask {
            name: name.into(),
            description: None,
            completed: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }
}

// Partial update; absent fields are left untouched by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn completion(completed: bool) -> Self {
        TaskPatch {
            completed: Some(completed),
            ..TaskPatch::default()
        }
    }

    // Apply this patch to a local copy, mirroring what the server does
    #[cfg(test)]
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }
}
