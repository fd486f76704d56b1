//! The error envelope shared by every HTTP handler, and the minimal
//! resource projection used by `fields=none`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tmf_core::CoreError;

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "@type")]
    pub tmf_type: String,
    pub code: String,
    pub reason: String,
    pub message: String,
    pub status: String,
    #[serde(rename = "referenceError", skip_serializing_if = "Option::is_none")]
    pub reference_error: Option<String>,
}

/// Wraps a [`CoreError`] (or a storage/policy error translated into one)
/// so it can be returned directly from an axum handler.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.0.status_code();
        let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            tmf_type: "Error".to_string(),
            code: self.0.reason().to_string(),
            reason: self.0.reason().to_string(),
            message: self.0.to_string(),
            status: status_code.to_string(),
            reference_error: None,
        };
        (status, axum::Json(body)).into_response()
    }
}

/// The fields always present regardless of `fields` selection.
pub const MINIMAL_FIELDS: &[&str] = &["id", "href", "lastUpdate", "version", "@type"];

/// Applies the pipeline's `fields` semantics to a rendered resource:
/// `None` -> full object; `Some("none")` -> minimal set only;
/// otherwise -> comma-separated allowlist union the minimal set.
pub fn project_fields(resource: &Value, fields: Option<&str>) -> Value {
    let Some(fields) = fields else {
        return resource.clone();
    };
    let Value::Object(map) = resource else {
        return resource.clone();
    };

    let mut allowed: Vec<&str> = MINIMAL_FIELDS.to_vec();
    if fields != "none" {
        for f in fields.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !allowed.contains(&f) {
                allowed.push(f);
            }
        }
    }

    let mut out = serde_json::Map::new();
    for key in allowed {
        if let Some(v) = map.get(key) {
            out.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fields_none_returns_only_minimal_set() {
        let resource = json!({
            "id": "1", "href": "/x/1", "lastUpdate": "t", "version": "1.0", "@type": "productOffering",
            "name": "Widget"
        });
        let projected = project_fields(&resource, Some("none"));
        let obj = projected.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        assert!(!obj.contains_key("name"));
    }

    #[test]
    fn fields_absent_returns_full_object() {
        let resource = json!({"id": "1", "name": "Widget"});
        assert_eq!(project_fields(&resource, None), resource);
    }

    #[test]
    fn fields_allowlist_unions_minimal_set() {
        let resource = json!({
            "id": "1", "href": "/x/1", "lastUpdate": "t", "version": "1.0", "@type": "productOffering",
            "name": "Widget", "description": "desc"
        });
        let projected = project_fields(&resource, Some("name"));
        let obj = projected.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert!(obj.contains_key("name"));
        assert!(!obj.contains_key("description"));
    }
}
