//! Data model for tasks, features, and snapshots.
//!
//! A **Task** is the top-level unit of work; it contains an ordered list of
//! **Features**. Both may declare dependencies on other tasks or features
//! through raw reference tokens (`"<taskId>"` or `"<taskId>.<featureId>"`).
//! A **Snapshot** is the full point-in-time state of all tasks as provided by
//! the task store; the resolver never patches it incrementally.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle state shared by tasks and features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not started yet.
    #[default]
    Pending,
    /// Actively being worked on.
    InProgress,
    /// Completed.
    Done,
    /// Waiting on something outside the item itself.
    Blocked,
    /// Explicitly rejected; pairs with a rejection reason.
    Rejected,
}

impl Status {
    /// Stable string form, matching the serialized representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status `{0}`")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A sub-unit of work scoped to exactly one task.
///
/// Feature ids are opaque strings, unique within the owning task only; the
/// pair `(task id, feature id)` addresses a feature globally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Opaque id, unique within the owning task.
    pub id: String,
    /// Lifecycle state.
    #[serde(default)]
    pub status: Status,
    /// Short human-facing title.
    pub title: String,
    /// Longer free-form description.
    #[serde(default)]
    pub description: String,
    /// Optional implementation plan steps.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<String>,
    /// Optional context notes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,
    /// Optional acceptance criteria.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acceptance: Vec<String>,
    /// Raw dependency reference tokens.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Why the feature was rejected, when status is `rejected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl Feature {
    /// Create a feature with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: Status::default(),
            title: title.into(),
            description: String::new(),
            plan: Vec::new(),
            context: Vec::new(),
            acceptance: Vec::new(),
            dependencies: Vec::new(),
            rejection_reason: None,
        }
    }

    /// Set the status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the raw dependency tokens.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the implementation plan.
    pub fn with_plan<I, S>(mut self, plan: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plan = plan.into_iter().map(Into::into).collect();
        self
    }

    /// Set the acceptance criteria.
    pub fn with_acceptance<I, S>(mut self, acceptance: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acceptance = acceptance.into_iter().map(Into::into).collect();
        self
    }

    /// Set the rejection reason.
    pub fn with_rejection_reason(mut self, reason: impl Into<String>) -> Self {
        self.rejection_reason = Some(reason.into());
        self
    }
}

/// Top-level unit of work; container for features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque id, unique across the project.
    pub id: String,
    /// Lifecycle state.
    #[serde(default)]
    pub status: Status,
    /// Short human-facing title.
    pub title: String,
    /// Longer free-form description.
    #[serde(default)]
    pub description: String,
    /// Ordered list of features belonging to this task.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
    /// Raw dependency reference tokens.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Why the task was rejected, when status is `rejected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl Task {
    /// Create a task with the given id and title.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: Status::default(),
            title: title.into(),
            description: String::new(),
            features: Vec::new(),
            dependencies: Vec::new(),
            rejection_reason: None,
        }
    }

    /// Set the status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a feature, preserving insertion order.
    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.features.push(feature);
        self
    }

    /// Set the raw dependency tokens.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the rejection reason.
    pub fn with_rejection_reason(mut self, reason: impl Into<String>) -> Self {
        self.rejection_reason = Some(reason.into());
        self
    }

    /// Look up a feature by id.
    pub fn feature(&self, feature_id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == feature_id)
    }
}

/// Full point-in-time state of all tasks, as pushed by the task store.
///
/// Uniqueness of `(task id, feature id)` pairs is an upstream contract; the
/// resolver does not deduplicate snapshot data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// All tasks, keyed by id.
    pub tasks_by_id: HashMap<String, Task>,
}

impl Snapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from a collection of tasks.
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks_by_id: tasks.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Insert or replace a task.
    pub fn insert_task(&mut self, task: Task) {
        self.tasks_by_id.insert(task.id.clone(), task);
    }

    /// Look up a task by id.
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks_by_id.get(task_id)
    }

    /// Number of tasks.
    pub fn task_count(&self) -> usize {
        self.tasks_by_id.len()
    }

    /// Total number of features across all tasks.
    pub fn feature_count(&self) -> usize {
        self.tasks_by_id.values().map(|t| t.features.len()).sum()
    }

    /// Serialize the snapshot to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
