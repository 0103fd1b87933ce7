use actix_web::{http::StatusCode, test, web, App};
use serde_json::Value;
use std::sync::Arc;

use logpipe::dispatcher::{Dispatcher, FanOut};
use logpipe::gateway::{self, GatewayState, API_KEY_HEADER};
use logpipe::metrics::Metrics;
use logpipe::models::{IndexHit, IndexRecord, LogRecord, StoredLog};
use logpipe::test_utils::{
    wait_for_records, ChannelSource, FailingSink, MemoryPublisher, MemorySink, StaticKeyStore,
};

const CLICK: &str = r#"{"project_id":"p1","payload":{"event_name":"click","payload":{"searchable_key_1":"checkout","x":"1"}}}"#;

#[tokio::test]
async fn test_queue_message_lands_in_both_stores_with_one_log_id() {
    let wide = Arc::new(MemorySink::<LogRecord>::new("wide"));
    let index = Arc::new(MemorySink::<IndexRecord>::new("index"));
    let metrics = Arc::new(Metrics::new().unwrap());
    let (tx, source) = ChannelSource::new();

    let fan_out = FanOut::new(wide.clone(), index.clone(), "searchable_key_1", metrics.clone());
    let dispatcher = tokio::spawn(Dispatcher::new(source, fan_out, metrics).run());

    tx.send(Ok(CLICK.as_bytes().to_vec())).unwrap();

    let logs = wait_for_records(&wide, 1).await;
    let indexes = wait_for_records(&index, 1).await;
    drop(tx);
    dispatcher.await.unwrap();

    assert_eq!(logs.len(), 1);
    assert_eq!(indexes.len(), 1);

    let log = &logs[0];
    assert_eq!(log.project_id, "p1");
    assert_eq!(log.event_name, "click");
    assert_eq!(log.payload.len(), 2);
    assert_eq!(log.payload["searchable_key_1"], "checkout");
    assert_eq!(log.payload["x"], "1");

    let entry = &indexes[0];
    assert_eq!(entry.project_id, "p1");
    assert_eq!(entry.event_name, "click");
    assert_eq!(entry.searchable_key.as_deref(), Some("checkout"));

    assert_eq!(log.log_id, entry.log_id);
    assert_eq!(log.timestamp, entry.timestamp);
}

#[tokio::test]
async fn test_one_sink_down_does_not_stop_the_other() {
    let index = Arc::new(MemorySink::<IndexRecord>::new("index"));
    let metrics = Arc::new(Metrics::new().unwrap());
    let (tx, source) = ChannelSource::new();

    let fan_out = FanOut::new(
        Arc::new(FailingSink::new("wide")),
        index.clone(),
        "searchable_key_1",
        metrics.clone(),
    );

    for _ in 0..3 {
        tx.send(Ok(CLICK.as_bytes().to_vec())).unwrap();
    }
    drop(tx);
    Dispatcher::new(source, fan_out, metrics.clone()).run().await;

    assert_eq!(wait_for_records(&index, 3).await.len(), 3);
    assert_eq!(metrics.queue_messages_consumed.get(), 3);
}

#[actix_web::test]
async fn test_accepted_request_is_stored_and_readable() {
    let (tx, source) = ChannelSource::new();
    let publisher = Arc::new(MemoryPublisher::forwarding_to(tx));
    let wide = Arc::new(MemorySink::<LogRecord>::new("wide"));
    let index = Arc::new(MemorySink::<IndexRecord>::new("index"));
    let metrics = Arc::new(Metrics::new().unwrap());

    let fan_out = FanOut::new(wide.clone(), index.clone(), "searchable_key_1", metrics.clone());
    tokio::spawn(Dispatcher::new(source, fan_out, metrics.clone()).run());

    let state = web::Data::new(GatewayState {
        keys: Arc::new(StaticKeyStore::new([("p1", "secret")])),
        publisher: publisher.clone(),
        index: index.clone(),
        records: wide.clone(),
        metrics,
    });
    let app = test::init_service(App::new().app_data(state).configure(gateway::configure)).await;

    let req = test::TestRequest::post()
        .uri("/api/projects/p1/logs")
        .insert_header((API_KEY_HEADER, "secret"))
        .set_payload(r#"{"event_name":"click","payload":{"searchable_key_1":"checkout","x":1,"tags":["a","b"]}}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::ACCEPTED);

    let logs = wait_for_records(&wide, 1).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].payload["x"], "1");
    assert_eq!(logs[0].payload["tags"], r#"["a","b"]"#);
    wait_for_records(&index, 1).await;

    let req = test::TestRequest::get()
        .uri("/api/projects/p1/logs?search=click")
        .insert_header((API_KEY_HEADER, "secret"))
        .to_request();
    let hits: Vec<IndexHit> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].log_id, logs[0].log_id.to_string());

    let req = test::TestRequest::get()
        .uri(&format!("/api/projects/p1/logs/{}", hits[0].log_id))
        .insert_header((API_KEY_HEADER, "secret"))
        .to_request();
    let stored: StoredLog = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stored.event_name, "click");
    assert_eq!(stored.payload["searchable_key_1"], "checkout");

    // unmatched search term
    let req = test::TestRequest::get()
        .uri("/api/projects/p1/logs?search=purchase")
        .insert_header((API_KEY_HEADER, "secret"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body, serde_json::json!([]));
}
