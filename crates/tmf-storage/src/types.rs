//! Row and query types for the object store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tmf_core::time::serde_rfc3339;

/// One persisted `(id, type, version)` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TMFObject {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub version: String,
    pub content: Value,
    #[serde(with = "serde_rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "serde_rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TMFObject {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>, version: impl Into<String>, content: Value) -> Self {
        let now = tmf_core::time::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            version: version.into(),
            content,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builds the version that follows `self` but keeps `created_at`.
    pub fn new_version(&self, version: impl Into<String>, content: Value) -> Self {
        Self {
            id: self.id.clone(),
            resource_type: self.resource_type.clone(),
            version: version.into(),
            content,
            created_at: self.created_at,
            updated_at: tmf_core::time::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    /// Parses one element of the comma-separated `sort` query parameter.
    /// A leading `-` means descending.
    pub fn parse_one(raw: &str) -> Self {
        if let Some(field) = raw.strip_prefix('-') {
            SortSpec {
                field: field.to_string(),
                direction: SortDirection::Desc,
            }
        } else {
            SortSpec {
                field: raw.to_string(),
                direction: SortDirection::Asc,
            }
        }
    }

    pub fn parse_csv(raw: &str) -> Vec<SortSpec> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(SortSpec::parse_one)
            .collect()
    }
}

/// A `list()` query: content-field equality filters plus pagination/sort.
/// `limit`/`offset`/`sort`/`fields` are parsed out of the raw query string
/// by the pipeline layer before this struct is built; `fields` never
/// reaches the store (per the component design, it is pipeline-only).
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: Vec<(String, String)>,
    pub sort: Vec<SortSpec>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub items: Vec<TMFObject>,
    pub total_count: usize,
}
