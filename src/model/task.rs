use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Kanban column a task lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    ToDo,
    InProgress,
    Done,
}

impl TaskStatus {
    /// Column order on the board
    pub const ALL: [TaskStatus; 3] = [TaskStatus::ToDo, TaskStatus::InProgress, TaskStatus::Done];

    /// The display string, which is also the canonical wire value
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::ToDo => "To Do",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Done => "Done",
        }
    }

    /// Parse a wire value, accepting legacy variants (`TODO`, `IN_PROGRESS`,
    /// `DONE`, any casing). Unknown input falls back to `ToDo`.
    pub fn parse_lenient(raw: &str) -> TaskStatus {
        match raw.trim().replace('_', " ").to_lowercase().as_str() {
            "in progress" | "inprogress" => TaskStatus::InProgress,
            "done" => TaskStatus::Done,
            _ => TaskStatus::ToDo,
        }
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
        }
    }

    /// Parse a wire value; unknown input falls back to `Medium`.
    pub fn parse_lenient(raw: &str) -> TaskPriority {
        match raw.trim().to_lowercase().as_str() {
            "low" => TaskPriority::Low,
            "high" => TaskPriority::High,
            _ => TaskPriority::Medium,
        }
    }
}

/// A canonical task record, scoped to a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Document id assigned by the store
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Assigned user uid, empty string = unassigned
    pub assignee_id: String,
    pub created_by_id: String,
    /// Creator name as it was at creation time (denormalized)
    pub created_by_username: String,
    pub created_at: DateTime<Utc>,
    /// Set when the task first transitions into Done
    pub completed_at: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    /// Due date string (YYYY-MM-DD), empty = none
    pub due_date: String,
    /// Deduplicated, order-preserving
    pub tags: Vec<String>,
}

impl Task {
    /// Canonical wire fields for a full insert. `completedAt` is written as
    /// an explicit null so downstream readers see the field.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("title".into(), json!(self.title));
        fields.insert("description".into(), json!(self.description));
        fields.insert("status".into(), json!(self.status.as_str()));
        fields.insert("assigneeId".into(), json!(self.assignee_id));
        fields.insert("createdById".into(), json!(self.created_by_id));
        fields.insert("createdByUsername".into(), json!(self.created_by_username));
        fields.insert("createdAt".into(), json!(self.created_at.timestamp_millis()));
        fields.insert(
            "completedAt".into(),
            match self.completed_at {
                Some(t) => json!(t.timestamp_millis()),
                None => Value::Null,
            },
        );
        fields.insert("priority".into(), json!(self.priority.as_str()));
        fields.insert("dueDate".into(), json!(self.due_date));
        fields.insert("tags".into(), json!(self.tags));
        fields
    }
}
