//! Event envelope published to the notification fabric on create/update/delete.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::time::serde_rfc3339;

/// The three notification-worthy operations a resource can undergo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    fn suffix(self) -> &'static str {
        match self {
            ChangeKind::Create => "CreateEvent",
            ChangeKind::Update => "AttributeValueChangeEvent",
            ChangeKind::Delete => "DeleteEvent",
        }
    }
}

/// Converts `productOffering` -> `ProductOffering` for use in `eventType`.
pub fn pascal_case(resource_name: &str) -> String {
    let mut chars = resource_name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn event_type(resource_name: &str, kind: ChangeKind) -> String {
    format!("{}{}", pascal_case(resource_name), kind.suffix())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "eventId")]
    pub event_id: Uuid,
    #[serde(rename = "eventTime", with = "serde_rfc3339")]
    pub event_time: OffsetDateTime,
    #[serde(rename = "eventType")]
    pub event_type: String,
    #[serde(rename = "apiFamily")]
    pub api_family: String,
    #[serde(rename = "resourceName")]
    pub resource_name: String,
    #[serde(rename = "resourceId")]
    pub resource_id: String,
    #[serde(rename = "resourcePath")]
    pub resource_path: String,
    pub event: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub resource: Value,
}

impl EventEnvelope {
    pub fn new(
        api_family: impl Into<String>,
        resource_name: impl Into<String>,
        resource_id: impl Into<String>,
        resource_path: impl Into<String>,
        kind: ChangeKind,
        resource: Value,
    ) -> Self {
        let resource_name = resource_name.into();
        let event_type = event_type(&resource_name, kind);
        Self {
            event_id: Uuid::new_v4(),
            event_time: OffsetDateTime::now_utc(),
            event_type,
            api_family: api_family.into(),
            resource_name,
            resource_id: resource_id.into(),
            resource_path: resource_path.into(),
            event: EventPayload { resource },
        }
    }
}
