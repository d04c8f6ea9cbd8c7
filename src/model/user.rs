use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A canonical user record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Stable identity from the auth provider
    pub uid: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

impl User {
    /// Fallback display name for users without one: `User-` + uid prefix
    pub fn placeholder_name(uid: &str) -> String {
        let prefix: String = uid.chars().take(6).collect();
        format!("User-{}", prefix)
    }

    /// Canonical wire fields for the public user document
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("uid".into(), json!(self.uid));
        fields.insert("displayName".into(), json!(self.display_name));
        fields.insert(
            "photoURL".into(),
            match &self.photo_url {
                Some(url) => json!(url),
                None => Value::Null,
            },
        );
        fields
    }
}
