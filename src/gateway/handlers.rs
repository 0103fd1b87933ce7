use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::Value;

use super::{GatewayError, GatewayState, API_KEY_HEADER};
use crate::models::OutboundEvent;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    search: Option<String>,
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Resolve the caller's key against the project's registered key. A failed
/// lookup is treated the same as a wrong key.
async fn authorize(
    state: &GatewayState,
    project_id: &str,
    req: &HttpRequest,
) -> Result<(), GatewayError> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(GatewayError::MissingApiKey)?;

    let registered = state.keys.api_key(project_id).await.map_err(|e| {
        tracing::error!(project_id, error = %e, "API key lookup failed");
        GatewayError::KeyLookup(e)
    })?;

    match registered {
        Some(key) if constant_time_eq(key.as_bytes(), presented.as_bytes()) => Ok(()),
        _ => Err(GatewayError::Unauthorized),
    }
}

async fn accept(
    state: &GatewayState,
    project_id: String,
    req: &HttpRequest,
    body: &[u8],
) -> Result<HttpResponse, GatewayError> {
    authorize(state, &project_id, req).await?;

    let payload = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Err(GatewayError::MalformedBody("expected a JSON object".into())),
        Err(e) => return Err(GatewayError::MalformedBody(e.to_string())),
    };

    let bytes = OutboundEvent {
        project_id: project_id.clone(),
        payload,
    }
    .to_bytes()?;

    state.publisher.publish(&project_id, &bytes).await.map_err(|e| {
        tracing::error!(project_id = %project_id, error = %e, "Could not publish event");
        GatewayError::Publish(e)
    })?;

    Ok(HttpResponse::Accepted().json(serde_json::json!({ "status": "accepted" })))
}

/// `POST /api/projects/{project_id}/logs`
pub async fn ingest(
    state: web::Data<GatewayState>,
    path: web::Path<String>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, GatewayError> {
    let result = accept(&state, path.into_inner(), &req, &body).await;

    match result {
        Ok(_) => state.metrics.record_gateway_request("accepted"),
        Err(ref e) => {
            tracing::debug!(error = %e, "Rejected ingestion request");
            state.metrics.record_gateway_request(e.outcome());
        }
    }
    result
}

/// `GET /api/projects/{project_id}/logs?search=`
pub async fn search(
    state: web::Data<GatewayState>,
    path: web::Path<String>,
    params: web::Query<SearchParams>,
    req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
    let project_id = path.into_inner();
    authorize(&state, &project_id, &req).await?;

    let hits = state
        .index
        .search(&project_id, params.search.as_deref())
        .await
        .map_err(|e| {
            tracing::error!(project_id = %project_id, error = %e, "Index search failed");
            GatewayError::Query(e)
        })?;

    Ok(HttpResponse::Ok().json(hits))
}

/// `GET /api/projects/{project_id}/logs/{log_id}`
pub async fn get_log(
    state: web::Data<GatewayState>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> Result<HttpResponse, GatewayError> {
    let (project_id, log_id) = path.into_inner();
    authorize(&state, &project_id, &req).await?;

    let record = state
        .records
        .find(&project_id, &log_id)
        .await
        .map_err(|e| {
            tracing::error!(project_id = %project_id, log_id = %log_id, error = %e, "Log lookup failed");
            GatewayError::Query(e)
        })?
        .ok_or(GatewayError::NotFound)?;

    Ok(HttpResponse::Ok().json(record))
}
