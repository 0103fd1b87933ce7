use actix::Addr;
use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use super::Metrics;
use crate::actors::{GetSystemHealth, HealthMonitorActor};

struct MetricsState {
    metrics: Arc<Metrics>,
    health: Addr<HealthMonitorActor>,
}

/// Build the metrics HTTP server. The returned server must be awaited.
pub fn metrics_server(
    metrics: Arc<Metrics>,
    health: Addr<HealthMonitorActor>,
    host: &str,
    port: u16,
) -> std::io::Result<Server> {
    tracing::info!("📊 Starting metrics server on http://{}:{}/metrics", host, port);

    let state = web::Data::new(MetricsState { metrics, health });
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .workers(1)
    .bind((host, port))?
    .run();

    Ok(server)
}

async fn metrics_handler(state: web::Data<MetricsState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<MetricsState>) -> impl Responder {
    match state.health.send(GetSystemHealth).await {
        Ok(health) if health.overall_status.is_unhealthy() => {
            HttpResponse::ServiceUnavailable().json(health)
        }
        Ok(health) => HttpResponse::Ok().json(health),
        Err(e) => {
            tracing::error!(error = %e, "Health monitor unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "overall_status": { "status": "unhealthy", "reason": "health monitor unreachable" }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{HealthStatus, UpdateHealth};
    use actix::Actor;
    use actix_web::test;

    fn app_state() -> (web::Data<MetricsState>, Addr<HealthMonitorActor>) {
        let health = HealthMonitorActor::new().start();
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.queue_messages_consumed.inc();
        (
            web::Data::new(MetricsState { metrics, health: health.clone() }),
            health,
        )
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_renders_text() {
        let (state, _) = app_state();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/metrics", web::get().to(metrics_handler)),
        )
        .await;

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("queue_messages_consumed_total 1"));
    }

    #[actix_web::test]
    async fn test_health_endpoint_status_codes() {
        let (state, health) = app_state();
        let app = test::init_service(
            App::new()
                .app_data(state)
                .route("/health", web::get().to(health_handler)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), 200);

        health.do_send(UpdateHealth::new("queue_consumer", HealthStatus::Unhealthy("x".into())));
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), 503);
    }
}
