//! Axum handlers: thin protocol glue around `pipeline.rs`.
//!
//! Grounded on the extractor shapes the teacher's `handlers.rs` stubs use
//! (`Path`, `Query`, `Json`, `impl IntoResponse`) — the logic itself is
//! new, since the teacher's handlers are FHIR-specific placeholders.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use uuid::Uuid;

use tmf_api::{project_fields, ApiError};
use tmf_storage::{ListQuery, SortSpec};

use crate::pipeline;
use crate::state::AppState;

const RESERVED_QUERY_PARAMS: &[&str] = &["limit", "offset", "sort", "fields"];

fn bearer_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()
}

fn list_query_from_params(params: &HashMap<String, String>) -> Result<(ListQuery, Option<String>), ApiError> {
    let limit = match params.get("limit") {
        Some(raw) => {
            let parsed: usize = raw.parse().map_err(|_| {
                ApiError::from(tmf_core::CoreError::InvalidQueryParam {
                    name: "limit".to_string(),
                    reason: "must be a positive integer".to_string(),
                })
            })?;
            if parsed == 0 {
                return Err(ApiError::from(tmf_core::CoreError::InvalidQueryParam {
                    name: "limit".to_string(),
                    reason: "must be a positive integer".to_string(),
                }));
            }
            Some(parsed)
        }
        None => None,
    };
    let offset = match params.get("offset") {
        Some(raw) => raw.parse::<usize>().map_err(|_| {
            ApiError::from(tmf_core::CoreError::InvalidQueryParam {
                name: "offset".to_string(),
                reason: "must be a non-negative integer".to_string(),
            })
        })?,
        None => 0,
    };
    let sort: Vec<SortSpec> = params
        .get("sort")
        .map(|raw| SortSpec::parse_csv(raw))
        .unwrap_or_default();
    let fields = params.get("fields").cloned();

    let filters = params
        .iter()
        .filter(|(k, _)| !RESERVED_QUERY_PARAMS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok((
        ListQuery {
            filters,
            sort,
            limit,
            offset,
        },
        fields,
    ))
}

pub async fn create_resource(
    State(state): State<AppState>,
    Path((api_family, resource)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let auth = pipeline::authenticate(&state, bearer_header(&headers)).await?;
    let obj = pipeline::create(&state, &api_family, &resource, &auth, body).await?;

    let location = obj.content.get("href").and_then(Value::as_str).unwrap_or_default().to_string();
    let mut response = (StatusCode::CREATED, Json(obj.content)).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&location) {
        response.headers_mut().insert(axum::http::header::LOCATION, value);
    }
    Ok(response)
}

pub async fn read_resource(
    State(state): State<AppState>,
    Path((api_family, resource, id)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let auth = pipeline::authenticate(&state, bearer_header(&headers)).await?;
    let content = pipeline::read(&state, &api_family, &resource, &id, &auth).await?;
    let projected = project_fields(&content, params.get("fields").map(String::as_str));
    Ok(Json(projected).into_response())
}

pub async fn update_resource(
    State(state): State<AppState>,
    Path((api_family, resource, id)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response, ApiError> {
    let auth = pipeline::authenticate(&state, bearer_header(&headers)).await?;
    let content = pipeline::update(&state, &api_family, &resource, &id, &auth, body).await?;
    Ok(Json(content).into_response())
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path((api_family, resource, id)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let auth = pipeline::authenticate(&state, bearer_header(&headers)).await?;
    pipeline::delete(&state, &api_family, &resource, &id, &auth).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_resources(
    State(state): State<AppState>,
    Path((_api_family, resource)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let (query, fields) = list_query_from_params(&params)?;
    let result = pipeline::list(&state, &resource, query).await?;

    let projected: Vec<Value> = result
        .items
        .into_iter()
        .map(|obj| project_fields(&obj.content, fields.as_deref()))
        .collect();

    let mut response = Json(projected).into_response();
    if let Ok(value) = axum::http::HeaderValue::from_str(&result.total_count.to_string()) {
        response.headers_mut().insert("X-Total-Count", value);
    }
    Ok(response)
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Path(api_family): Path<String>,
    headers: HeaderMap,
    Json(body): Json<tmf_notifications::SubscriptionRequest>,
) -> Result<Response, ApiError> {
    let auth = pipeline::authenticate(&state, bearer_header(&headers)).await?;
    let subscription = pipeline::create_subscription(&state, &api_family, &auth, body).await?;
    Ok((StatusCode::CREATED, Json(subscription)).into_response())
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    Path((_api_family, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let auth = pipeline::authenticate(&state, bearer_header(&headers)).await?;
    pipeline::delete_subscription(&state, &auth, id)?;
    Ok(StatusCode::NO_CONTENT)
}
