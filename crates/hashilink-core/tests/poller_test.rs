// Poller state machine, driven directly through its event channel.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::*;
use hashilink_core::{
    BackendKind, EventKind, OutboundEvent, Poller, PollerHandle, PollerState, QueryMode,
    SubscriptionKey, UpstreamError,
};

fn spawn(
    fake: &Arc<FakeUpstream>,
    key: SubscriptionKey,
    mode: QueryMode,
) -> (PollerHandle, mpsc::Receiver<OutboundEvent>, CancellationToken) {
    let (tx, rx) = mpsc::channel(16);
    let parent = CancellationToken::new();
    let handle = Poller::spawn(key, mode, fake.clone(), fast_poller(), tx, &parent);
    (handle, rx, parent)
}

async fn recv(rx: &mut mpsc::Receiver<OutboundEvent>) -> OutboundEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for poller event")
        .expect("poller channel closed")
}

#[tokio::test(start_paused = true)]
async fn test_index_regression_forces_snapshot() {
    let fake = FakeUpstream::new(BackendKind::Nomad);
    fake.script("jobs", [changed(10, json!(["a"])), changed(4, json!(["b"])), changed(6, json!(["c"]))]);
    let (_handle, mut rx, _parent) = spawn(&fake, SubscriptionKey::new("jobs", None, "global"), QueryMode::Blocking);

    let first = recv(&mut rx).await;
    assert_eq!((first.kind, first.index), (EventKind::Snapshot, Some(10)));

    let reset = recv(&mut rx).await;
    assert_eq!((reset.kind, reset.index), (EventKind::Snapshot, Some(4)));
    assert_eq!(reset.payload, json!(["b"]));

    let next = recv(&mut rx).await;
    assert_eq!((next.kind, next.index), (EventKind::Update, Some(6)));
}

#[tokio::test(start_paused = true)]
async fn test_delete_then_reappearance_is_a_snapshot() {
    let fake = FakeUpstream::new(BackendKind::Nomad);
    fake.script(
        "job/batch",
        [changed(3, json!({ "ID": "batch" })), gone(5), changed(8, json!({ "ID": "batch" }))],
    );
    let key = SubscriptionKey::new("job", Some("batch".into()), "global");
    let (_handle, mut rx, _parent) = spawn(&fake, key, QueryMode::Blocking);

    assert_eq!(recv(&mut rx).await.kind, EventKind::Snapshot);

    let deleted = recv(&mut rx).await;
    assert_eq!(deleted.kind, EventKind::Delete);
    assert_eq!(deleted.id.as_deref(), Some("batch"));
    assert_eq!(deleted.index, Some(5));

    let back = recv(&mut rx).await;
    assert_eq!((back.kind, back.index), (EventKind::Snapshot, Some(8)));
    assert_eq!(
        fake.fetch_log().iter().map(|(_, i)| *i).collect::<Vec<_>>(),
        vec![0, 3, 5, 8]
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_resource_on_start_is_an_empty_snapshot() {
    let fake = FakeUpstream::new(BackendKind::Consul);
    fake.script("key/app/name", [gone(15)]);
    let key = SubscriptionKey::new("key", Some("app/name".into()), "dc1");
    let (_handle, mut rx, _parent) = spawn(&fake, key, QueryMode::Blocking);

    let first = recv(&mut rx).await;
    assert_eq!(first.kind, EventKind::Snapshot);
    assert!(first.payload.is_null());
    assert_eq!(first.index, Some(15));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_exhaust_into_error() {
    let fake = FakeUpstream::new(BackendKind::Nomad);
    fake.script("nodes", [transient(), transient(), transient(), changed(1, json!([]))]);
    let (handle, mut rx, _parent) = spawn(&fake, SubscriptionKey::new("nodes", None, "global"), QueryMode::Blocking);

    let error = recv(&mut rx).await;
    assert_eq!(error.kind, EventKind::Error);
    assert_eq!(error.resource_type, "nodes");
    assert_eq!(error.payload["kind"], "backend-unreachable");

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fake.fetch_count(), 3);
    assert_eq!(handle.state(), PollerState::Stopped);
    assert!(handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_without_event() {
    let fake = FakeUpstream::new(BackendKind::Nomad);
    fake.script("nodes", [transient(), changed(2, json!([]))]);
    let (_handle, mut rx, _parent) = spawn(&fake, SubscriptionKey::new("nodes", None, "global"), QueryMode::Blocking);

    let first = recv(&mut rx).await;
    assert_eq!((first.kind, first.index), (EventKind::Snapshot, Some(2)));
}

#[tokio::test(start_paused = true)]
async fn test_rejection_stops_immediately() {
    let fake = FakeUpstream::new(BackendKind::Nomad);
    fake.script(
        "allocations",
        [Err(UpstreamError::Rejected {
            status: Some(403),
            message: "Permission denied".into(),
        })],
    );
    let (handle, mut rx, _parent) =
        spawn(&fake, SubscriptionKey::new("allocations", None, "global"), QueryMode::Blocking);

    let error = recv(&mut rx).await;
    assert_eq!(error.payload["kind"], "upstream-rejected");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(handle.is_finished());
    assert_eq!(fake.fetch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_is_visible_before_terminal_error_is_delivered() {
    let fake = FakeUpstream::new(BackendKind::Nomad);
    fake.script(
        "allocations",
        [
            changed(1, json!([])),
            Err(UpstreamError::Rejected {
                status: Some(403),
                message: "Permission denied".into(),
            }),
        ],
    );
    // Room for the snapshot only: the error send waits on the reader.
    let (tx, mut rx) = mpsc::channel(1);
    let parent = CancellationToken::new();
    let handle = Poller::spawn(
        SubscriptionKey::new("allocations", None, "global"),
        QueryMode::Blocking,
        fake.clone(),
        fast_poller(),
        tx,
        &parent,
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fake.fetch_count(), 2);
    assert_eq!(handle.state(), PollerState::Stopped);
    assert!(handle.is_finished());

    assert_eq!(recv(&mut rx).await.kind, EventKind::Snapshot);
    assert_eq!(recv(&mut rx).await.payload["kind"], "upstream-rejected");
}

#[tokio::test(start_paused = true)]
async fn test_interval_mode_only_reports_changes() {
    let fake = FakeUpstream::new(BackendKind::Nomad);
    let a = json!({ "Members": [{ "Name": "server-1" }] });
    let b = json!({ "Members": [{ "Name": "server-1" }, { "Name": "server-2" }] });
    fake.script("members", [changed(0, a.clone()), changed(0, a), changed(0, b.clone())]);
    let (_handle, mut rx, _parent) = spawn(&fake, SubscriptionKey::new("members", None, "global"), QueryMode::Interval);

    assert_eq!(recv(&mut rx).await.kind, EventKind::Snapshot);
    let update = recv(&mut rx).await;
    assert_eq!(update.kind, EventKind::Update);
    assert_eq!(update.payload, b);
    assert!(fake.fetch_log().iter().all(|(_, index)| *index == 0));
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_poller() {
    let fake = FakeUpstream::new(BackendKind::Nomad);
    fake.script("jobs", [changed(1, json!([]))]);
    let (handle, mut rx, parent) = spawn(&fake, SubscriptionKey::new("jobs", None, "global"), QueryMode::Blocking);
    recv(&mut rx).await;

    parent.cancel();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    assert!(handle.shutdown(deadline).await);
    let calls = fake.fetch_count();
    fake.script("jobs", [changed(2, json!([]))]);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(fake.fetch_count(), calls);
}
