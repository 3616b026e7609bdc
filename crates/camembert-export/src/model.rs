//! Issue and page types as returned by the search endpoint

use serde::{Deserialize, Deserializer, Serialize};

/// Open-ended issue fields, kept in the order the source returned them.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A single issue.
///
/// `id` is unique within one project at fetch time. Nothing else about the
/// shape of `fields` is assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub key: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub fields: Fields,
}

impl Issue {
    pub fn new(id: impl Into<String>, key: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            fields,
        }
    }

    /// Compact JSON encoding of `fields`, shared by every sink.
    pub fn fields_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.fields)
    }
}

/// One paginated response.
///
/// `total` describes the whole result set, not this page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub issues: Vec<Issue>,
    pub total: u64,
}

impl Page {
    pub fn new(issues: Vec<Issue>, total: u64) -> Self {
        Self { issues, total }
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Fields, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Fields>::deserialize(deserializer)?.unwrap_or_default())
}
