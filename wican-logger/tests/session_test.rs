mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use common::{cancel_after, QueueLocator, ENDPOINT};
use wican_devkit::{wait_for_hits, FakeDevice, Reply, TestHarness};
use wican_logger::{
    Address, DisplayMode, HttpClient, LoopEnd, PollSettings, PollingLoop, Recorder,
};

fn settings(interval_ms: u64) -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(interval_ms),
        fetch_timeout: Duration::from_millis(300),
        failure_threshold: 3,
        display: DisplayMode::Compact,
    }
}

#[tokio::test]
async fn test_schema_growth_reaches_disk() {
    let harness = TestHarness::new().unwrap();
    let device = FakeDevice::start(
        ENDPOINT,
        vec![
            Reply::json(json!({"A": 1})),
            Reply::json(json!({"A": 2, "B": 3})),
            Reply::json(json!({"C": "x", "A": 4})),
        ],
    )
    .await
    .unwrap();

    let cancel = CancellationToken::new();
    let poller = PollingLoop::new(
        Arc::new(HttpClient::new(ENDPOINT).unwrap()),
        Arc::new(QueueLocator::new(Vec::new())),
        Recorder::new(harness.path(), "wican_log", chrono::Local::now()),
        Address::from(device.addr()),
        settings(20),
        cancel.clone(),
    );
    let session = tokio::spawn(poller.run());

    assert!(wait_for_hits(&device, 4, Duration::from_secs(5)).await);
    cancel.cancel();
    let summary = session.await.unwrap().unwrap();

    let csv = harness.single_csv().unwrap();
    csv.assert_rectangular().unwrap();
    assert_eq!(csv.header, vec!["timestamp", "A", "B", "C"]);
    assert_eq!(csv.rows[0][1..], ["1", "", ""]);
    assert_eq!(csv.rows[1][1..], ["2", "3", ""]);
    assert_eq!(csv.rows[2][1..], ["4", "", "x"]);
    assert_eq!(summary.rows, csv.rows.len());
    assert_eq!(summary.columns, csv.header);
}

#[tokio::test]
async fn test_interrupt_during_sleep_stops_before_next_fetch() {
    let harness = TestHarness::new().unwrap();
    let device = FakeDevice::start(ENDPOINT, vec![Reply::json(json!({"SOC_pct": 81.3}))])
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let poller = PollingLoop::new(
        Arc::new(HttpClient::new(ENDPOINT).unwrap()),
        Arc::new(QueueLocator::new(Vec::new())),
        Recorder::new(harness.path(), "wican_log", chrono::Local::now()),
        Address::from(device.addr()),
        settings(10_000),
        cancel.clone(),
    );

    let started = Instant::now();
    cancel_after(&cancel, Duration::from_millis(500));
    let summary = poller.run().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(summary.end, LoopEnd::Interrupted);
    assert_eq!(device.hits(), 1);
    assert_eq!(summary.rows, 1);
    assert_eq!(harness.single_csv().unwrap().rows.len(), summary.rows);
}

#[tokio::test]
async fn test_sustained_failure_moves_to_rediscovered_device() {
    let harness = TestHarness::new().unwrap();
    let failing = FakeDevice::start(
        ENDPOINT,
        vec![Reply::json(json!({"A": 1})), Reply::status(503)],
    )
    .await
    .unwrap();
    let moved = FakeDevice::start(ENDPOINT, vec![Reply::json(json!({"A": 2, "B": 5}))])
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let locator = Arc::new(QueueLocator::new(vec![Address::from(moved.addr())]));
    let poller = PollingLoop::new(
        Arc::new(HttpClient::new(ENDPOINT).unwrap()),
        locator.clone(),
        Recorder::new(harness.path(), "wican_log", chrono::Local::now()),
        Address::from(failing.addr()),
        settings(10),
        cancel.clone(),
    );
    let session = tokio::spawn(poller.run());

    assert!(wait_for_hits(&moved, 2, Duration::from_secs(5)).await);
    cancel.cancel();
    let summary = session.await.unwrap().unwrap();

    assert_eq!(locator.calls(), 1);
    assert_eq!(summary.rediscoveries, 1);
    assert_eq!(failing.hits(), 4);

    let csv = harness.single_csv().unwrap();
    csv.assert_rectangular().unwrap();
    assert_eq!(csv.column("B").unwrap()[0], "");
    assert_eq!(summary.rows, csv.rows.len());
}
