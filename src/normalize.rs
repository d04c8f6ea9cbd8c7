//! Maps raw store documents into canonical entities.
//!
//! Records written by older clients use French field names (`titre`,
//! `statut`, `dateCreation`, ...). Each field resolves to the first
//! non-empty value across an ordered alias list, then falls back to a
//! default. Normalization never fails: malformed input yields best-effort
//! defaults.
//!
//! A missing `createdAt` defaults to the current time *at normalization
//! time*, so the same stale raw record can normalize to different
//! timestamps on repeated calls. The coordinator therefore normalizes
//! exactly once per snapshot arrival.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::model::{Project, Task, TaskPriority, TaskStatus, User};
use crate::remote::RawDoc;

/// Normalize a raw task document.
pub fn normalize_task(doc: &RawDoc) -> Task {
    let fields = &doc.fields;
    let status = match str_field(fields, &["status", "statut"]) {
        Some(raw) => TaskStatus::parse_lenient(&raw),
        None => TaskStatus::ToDo,
    };
    let priority = match str_field(fields, &["priority"]) {
        Some(raw) => TaskPriority::parse_lenient(&raw),
        None => TaskPriority::default(),
    };
    Task {
        id: doc.id.clone(),
        title: str_field(fields, &["title", "titre"]).unwrap_or_else(|| "Untitled Task".into()),
        description: str_field(fields, &["description"]).unwrap_or_default(),
        status,
        assignee_id: str_field(fields, &["assigneeId", "assigneA_userId"]).unwrap_or_default(),
        created_by_id: str_field(fields, &["createdById", "creePar_userId"]).unwrap_or_default(),
        created_by_username: str_field(fields, &["createdByUsername"])
            .unwrap_or_else(|| "Unknown".into()),
        created_at: millis_field(fields, &["createdAt", "dateCreation"]).unwrap_or_else(Utc::now),
        completed_at: millis_field(fields, &["completedAt"]),
        priority,
        due_date: str_field(fields, &["dueDate"]).unwrap_or_default(),
        tags: string_list(fields.get("tags")),
    }
}

/// Normalize a raw project document. The creator uid is always unioned
/// into the member set.
pub fn normalize_project(doc: &RawDoc) -> Project {
    let fields = &doc.fields;
    let created_by_id = str_field(fields, &["createdById", "creePar_userId"]).unwrap_or_default();
    let mut members = string_list(fields.get("members"));
    if !created_by_id.is_empty() && !members.iter().any(|m| *m == created_by_id) {
        members.push(created_by_id.clone());
    }
    Project {
        id: doc.id.clone(),
        name: str_field(fields, &["name"]).unwrap_or_else(|| "Untitled Project".into()),
        description: str_field(fields, &["description"]).unwrap_or_default(),
        access_code: str_field(fields, &["accessCode"]).unwrap_or_default(),
        created_by_id,
        created_by_username: str_field(fields, &["createdByUsername"])
            .unwrap_or_else(|| "Unknown".into()),
        created_at: millis_field(fields, &["createdAt", "dateCreation"]).unwrap_or_else(Utc::now),
        deadline: millis_field(fields, &["deadline"]),
        members,
    }
}

/// Normalize a raw user document. The document id is the uid.
pub fn normalize_user(doc: &RawDoc) -> User {
    let fields = &doc.fields;
    User {
        uid: doc.id.clone(),
        display_name: str_field(fields, &["displayName", "nomAffichage"])
            .unwrap_or_else(|| User::placeholder_name(&doc.id)),
        photo_url: str_field(fields, &["photoURL"]),
    }
}

// ---------------------------------------------------------------------------
// Field resolution
// ---------------------------------------------------------------------------

/// First non-empty string value across the alias list.
fn str_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = fields.get(*key)
            && !s.is_empty()
        {
            return Some(s.clone());
        }
    }
    None
}

/// First epoch-millis number across the alias list. Non-numeric values are
/// treated as absent.
fn millis_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    for key in keys {
        if let Some(Value::Number(n)) = fields.get(*key)
            && let Some(ms) = n.as_i64()
        {
            return DateTime::from_timestamp_millis(ms);
        }
    }
    None
}

/// String array, deduplicated, order preserved. Non-string elements are
/// dropped.
fn string_list(value: Option<&Value>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(Value::Array(items)) = value {
        for item in items {
            if let Value::String(s) = item
                && !s.is_empty()
                && !out.iter().any(|existing| existing == s)
            {
                out.push(s.clone());
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
