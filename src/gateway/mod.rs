//! HTTP boundary: authenticated ingestion plus the read API over both stores.
//!
//! The ingest path writes nothing itself. It checks the project's key,
//! wraps the body and waits only for the queue to accept it.

mod errors;
mod handlers;

use actix_web::web;
use std::sync::Arc;

use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::storage::{IndexSearch, ProjectKeyStore, RecordLookup};

pub use errors::GatewayError;

pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Service handles shared by every gateway worker.
pub struct GatewayState {
    pub keys: Arc<dyn ProjectKeyStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub index: Arc<dyn IndexSearch>,
    pub records: Arc<dyn RecordLookup>,
    pub metrics: Arc<Metrics>,
}

/// Register the gateway routes. `GatewayState` must be installed as app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/api/projects/{project_id}/logs")
            .route(web::post().to(handlers::ingest))
            .route(web::get().to(handlers::search)),
    )
    .service(
        web::resource("/api/projects/{project_id}/logs/{log_id}")
            .route(web::get().to(handlers::get_log)),
    );
}
