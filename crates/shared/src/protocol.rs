use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{
    UserId, FIELD_ACTIVATED, FIELD_EMAIL, FIELD_FIRSTNAME, FIELD_LASTNAME, FIELD_USERNAME,
};

/// A remote user. Only `id` is interpreted; every other field belongs to the
/// directory and is carried through untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UserRecord {
    pub fn with_id(id: UserId) -> Self {
        Self {
            id: Some(id),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn username(&self) -> Option<&str> {
        self.field_str(FIELD_USERNAME)
    }

    pub fn email(&self) -> Option<&str> {
        self.field_str(FIELD_EMAIL)
    }

    pub fn activated(&self) -> bool {
        self.fields
            .get(FIELD_ACTIVATED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.field_str(FIELD_FIRSTNAME).unwrap_or_default(),
            self.field_str(FIELD_LASTNAME).unwrap_or_default()
        )
        .trim()
        .to_string()
    }

    pub fn status_label(&self) -> &'static str {
        if self.activated() {
            "Active"
        } else {
            "Inactive"
        }
    }
}

/// Body of a collection listing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserPage {
    #[serde(rename = "totalCount", default)]
    pub total_count: u64,
    #[serde(default)]
    pub results: Vec<UserRecord>,
}
