use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A canonical project record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Document id assigned by the store
    pub id: String,
    pub name: String,
    pub description: String,
    /// Shared secret gating membership
    pub access_code: String,
    pub created_by_id: String,
    /// Creator name as it was at creation time (denormalized)
    pub created_by_username: String,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<DateTime<Utc>>,
    /// Member uids. The creator is always a member.
    pub members: Vec<String>,
}

impl Project {
    pub fn is_member(&self, uid: &str) -> bool {
        self.members.iter().any(|m| m == uid)
    }

    /// Canonical wire fields for a full insert
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("name".into(), json!(self.name));
        fields.insert("description".into(), json!(self.description));
        fields.insert("accessCode".into(), json!(self.access_code));
        fields.insert("createdById".into(), json!(self.created_by_id));
        fields.insert("createdByUsername".into(), json!(self.created_by_username));
        fields.insert("createdAt".into(), json!(self.created_at.timestamp_millis()));
        fields.insert(
            "deadline".into(),
            match self.deadline {
                Some(t) => json!(t.timestamp_millis()),
                None => Value::Null,
            },
        );
        fields.insert("members".into(), json!(self.members));
        fields
    }
}
