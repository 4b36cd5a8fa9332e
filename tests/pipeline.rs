//! End-to-end pipeline dispatch: suppression before enrichment, connect and
//! disconnect announcements, lifecycle.

mod common;

use bytes::Bytes;
use common::RecordingSink;
use prism::config::Config;
use prism::hooks::{ClientInfo, PublishAction};
use prism::time::ManualClock;
use prism::Pipeline;
use serde_json::Value;
use std::sync::Arc;

const TOPIC: &str = "device/contact";

fn client() -> ClientInfo {
    ClientInfo::new("dev-9", "203.0.113.77:40188")
}

fn enriching_config() -> Config {
    let mut config = Config::default();
    config.enrich.topics.insert(TOPIC.to_string());
    config
}

fn build(config: Config, clock: ManualClock) -> (Pipeline<ManualClock>, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let pipeline = Pipeline::new(config, clock, sink.clone()).unwrap();
    (pipeline, sink)
}

#[test]
fn accepted_report_is_enriched_and_duplicate_is_dropped() {
    common::init_test_logging();
    let clock = ManualClock::at(100);
    let (pipeline, _sink) = build(enriching_config(), clock.clone());
    let report = Bytes::from_static(br#"{"uuid":"u1","count":4}"#);

    let action = pipeline
        .chain()
        .dispatch_publish(&client(), TOPIC, report.clone())
        .unwrap();
    let PublishAction::Deliver(payload) = action else {
        panic!("first report must be delivered");
    };
    let doc: Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(doc["meta"]["ip"], "203.0.113.77:40188");
    assert_eq!(doc["data"]["uuid"], "u1");
    assert_eq!(doc["data"]["count"], 4);

    // Inside the window the duplicate is rejected before enrichment runs.
    clock.advance(5);
    let action = pipeline
        .chain()
        .dispatch_publish(&client(), TOPIC, report)
        .unwrap();
    assert_eq!(action, PublishAction::Reject);
    assert_eq!(pipeline.dedupe_stats().cache_size, 1);
}

#[test]
fn non_target_topic_is_enriched_without_touching_the_cache() {
    let clock = ManualClock::at(0);
    let mut config = enriching_config();
    config.enrich.topics.insert("sensor/misc".to_string());
    let (pipeline, _sink) = build(config, clock);

    let action = pipeline
        .chain()
        .dispatch_publish(&client(), "sensor/misc", Bytes::from_static(b"41.5"))
        .unwrap();
    let PublishAction::Deliver(payload) = action else {
        panic!("off-target report must be delivered");
    };
    assert!(payload.starts_with(br#"{"meta":"#));
    assert_eq!(pipeline.dedupe_stats().cache_size, 0);
}

#[test]
fn unclassifiable_report_still_reaches_enrichment() {
    let clock = ManualClock::at(0);
    let (pipeline, _sink) = build(enriching_config(), clock);

    // Not JSON: suppression fails open, enrichment splices verbatim.
    let raw: &[u8] = b"\x02binary telemetry";
    let action = pipeline
        .chain()
        .dispatch_publish(&client(), TOPIC, Bytes::copy_from_slice(raw))
        .unwrap();
    let PublishAction::Deliver(payload) = action else {
        panic!("unclassifiable report must be delivered");
    };
    let prefix = br#"{"meta":{"ip":"203.0.113.77:40188"},"data":"#;
    assert!(payload.starts_with(prefix));
    assert_eq!(&payload[prefix.len()..payload.len() - 1], raw);
    assert_eq!(pipeline.dedupe_stats().cache_size, 0);
}

#[tokio::test]
async fn connect_and_disconnect_announcements_drain_through_sink() {
    let clock = ManualClock::at(0);
    let (mut pipeline, sink) = build(Config::default(), clock);
    pipeline.start();

    pipeline.chain().dispatch_connect(&client());
    pipeline
        .chain()
        .dispatch_disconnect(&client(), Some("gone"), true);
    pipeline.shutdown().await;

    let records = sink.records();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0].topic, "sys/connect");
    assert_eq!(records[0].qos, 1);
    assert!(!records[0].retain);
    let doc: Value = serde_json::from_slice(&records[0].payload).unwrap();
    assert_eq!(doc["uuid"], "dev-9");
    assert_eq!(doc["ip"], "203.0.113.77:40188");

    assert_eq!(records[1].topic, "sys/disconnect");
    let doc: Value = serde_json::from_slice(&records[1].payload).unwrap();
    assert_eq!(doc, serde_json::json!({"uuid": "dev-9"}));
}

#[tokio::test]
async fn failed_announcement_never_disturbs_the_lifecycle() {
    let clock = ManualClock::at(0);
    let (mut pipeline, sink) = build(Config::default(), clock);
    sink.fail_all(true);
    pipeline.start();

    pipeline.chain().dispatch_connect(&client());
    pipeline.chain().dispatch_disconnect(&client(), None, false);
    pipeline.shutdown().await;

    assert!(sink.is_empty());
}

#[test]
fn runtime_reconfiguration_applies_to_live_traffic() {
    let clock = ManualClock::at(0);
    let (pipeline, _sink) = build(Config::default(), clock.clone());

    pipeline
        .reconfigure_dedupe("fleet/heartbeat", "device_id", "sent_at", 30)
        .unwrap();

    let report = Bytes::from_static(br#"{"device_id":"h1","count":2}"#);
    let action = pipeline
        .chain()
        .dispatch_publish(&client(), "fleet/heartbeat", report.clone())
        .unwrap();
    assert!(matches!(action, PublishAction::Deliver(_)));

    clock.advance(30);
    let action = pipeline
        .chain()
        .dispatch_publish(&client(), "fleet/heartbeat", report)
        .unwrap();
    assert_eq!(action, PublishAction::Reject);

    let stats = pipeline.dedupe_stats();
    assert_eq!(stats.target_topic, "fleet/heartbeat");
    assert_eq!(stats.window_seconds, 30);
}
