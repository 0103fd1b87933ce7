use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::errors::{PublishError, QueryError};

/// Everything a gateway request can fail with. Only these reach a caller;
/// nothing that happens after enqueue is ever reported back.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing X-API-KEY header")]
    MissingApiKey,

    #[error("invalid API key")]
    Unauthorized,

    #[error("could not verify API key")]
    KeyLookup(#[source] sqlx::Error),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("could not encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("could not enqueue event")]
    Publish(#[from] PublishError),

    #[error("could not query logs")]
    Query(#[from] QueryError),

    #[error("log not found")]
    NotFound,
}

impl GatewayError {
    /// Label for the `gateway_requests_total` counter.
    pub fn outcome(&self) -> &'static str {
        match self {
            GatewayError::MissingApiKey | GatewayError::Unauthorized | GatewayError::KeyLookup(_) => {
                "unauthorized"
            }
            GatewayError::MalformedBody(_) => "malformed",
            GatewayError::Encode(_) | GatewayError::Publish(_) => "publish_failed",
            GatewayError::Query(_) => "query_failed",
            GatewayError::NotFound => "not_found",
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::MissingApiKey | GatewayError::Unauthorized | GatewayError::KeyLookup(_) => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Encode(_) | GatewayError::Publish(_) | GatewayError::Query(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": self.to_string() }))
    }
}
