use actix::prelude::*;
use actix_web::{web, App, HttpServer};
use envconfig::Envconfig;
use futures_util::future::try_join_all;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use logpipe::actors::HealthMonitorActor;
use logpipe::config::Config;
use logpipe::dispatcher::{Dispatcher, FanOut};
use logpipe::gateway::{self, GatewayState};
use logpipe::messaging::{KafkaPublisher, KafkaSource};
use logpipe::metrics::{metrics_server, Metrics};
use logpipe::storage::{
    connect_clickhouse, connect_postgres, connect_scylla, ClickHouseIndexSearch,
    ClickHouseIndexSink, PgProjectKeyStore, ScyllaLogSink, ScyllaRecordLookup,
};
use logpipe::utils::{retry_with_backoff, RetryConfig};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,logpipe=debug")),
        )
        .init();

    let config = Config::init_from_env()?;
    let role = config.validate()?;
    tracing::info!(?role, "🚀 Starting log pipeline");

    // === 1. Metrics ===
    let metrics = Arc::new(Metrics::new()?);

    // === 2. Backends (retried at startup only) ===
    let kafka = config.kafka()?;
    let scylla = config.scylla()?;
    let clickhouse = config.clickhouse()?;

    let session = retry_with_backoff("scylla", RetryConfig::startup(), |_| connect_scylla(&scylla)).await?;
    let client =
        retry_with_backoff("clickhouse", RetryConfig::startup(), |_| connect_clickhouse(&clickhouse)).await?;

    let publisher = if role.runs_gateway() {
        Some(Arc::new(KafkaPublisher::new(
            &kafka.brokers,
            &kafka.topic,
            kafka.publish_timeout,
        )?))
    } else {
        None
    };

    // === 3. Health monitor ===
    let mut monitor = HealthMonitorActor::new();
    if let Some(ref publisher) = publisher {
        monitor = monitor.watch_publisher(publisher.circuit_breaker(), metrics.clone());
    }
    let health = monitor.start();

    // === 4. Dispatcher ===
    let dispatcher = if role.runs_dispatcher() {
        let source = KafkaSource::new(&kafka.brokers, &kafka.group_id, &kafka.topic)?;
        let fan_out = FanOut::new(
            Arc::new(ScyllaLogSink::new(session.clone()).await?),
            Arc::new(ClickHouseIndexSink::new(client.clone())),
            config.searchable_field.clone(),
            metrics.clone(),
        )
        .with_write_limit(config.max_in_flight_writes)
        .with_health(health.clone());

        let dispatcher = Dispatcher::new(source, fan_out, metrics.clone()).with_health(health.clone());
        Some(tokio::spawn(dispatcher.run()))
    } else {
        None
    };

    // === 5. HTTP servers ===
    let mut servers = vec![metrics_server(
        metrics.clone(),
        health.clone(),
        &config.host,
        config.metrics_port,
    )?];

    if let Some(ref publisher) = publisher {
        let database_url = config.database_url()?;
        let pool = retry_with_backoff("postgres", RetryConfig::startup(), |_| {
            connect_postgres(&database_url, config.max_pg_connections)
        })
        .await?;

        let state = web::Data::new(GatewayState {
            keys: Arc::new(PgProjectKeyStore::new(pool)),
            publisher: publisher.clone(),
            index: Arc::new(ClickHouseIndexSearch::new(client.clone())),
            records: Arc::new(ScyllaRecordLookup::new(session.clone()).await?),
            metrics: metrics.clone(),
        });

        tracing::info!("🌐 Starting gateway on http://{}", config.bind());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .configure(gateway::configure)
        })
        .bind((config.host.as_str(), config.port))?
        .run();
        servers.push(server);
    }

    let handles: Vec<_> = servers.iter().map(|s| s.handle()).collect();

    tokio::select! {
        result = try_join_all(servers) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    // === 6. Shutdown ===
    for handle in handles {
        handle.stop(true).await;
    }
    if let Some(dispatcher) = dispatcher {
        dispatcher.abort();
    }
    if let Some(publisher) = publisher {
        if let Err(e) = publisher.flush() {
            tracing::warn!(error = %e, "Could not flush pending publishes");
        }
    }

    tracing::info!("👋 Log pipeline stopped");
    Ok(())
}
