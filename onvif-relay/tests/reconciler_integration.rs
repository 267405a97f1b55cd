//! Reconciler driving a real subscription group and liveness monitor, on paused time.

mod common;

use common::{camera, motion_at, settle, FakeCameras, FakeNetwork};
use chrono::Utc;
use onvif_liveness::{LivenessConfig, LivenessMonitor};
use onvif_model::{DeviceName, DomainEvent, EventKind};
use onvif_relay::{HealthCounters, Reconciler};
use onvif_stream::{StreamConfig, SubscriptionGroup, SubscriptionState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn reconciler(
    cameras: &Arc<FakeCameras>,
    network: &Arc<FakeNetwork>,
) -> (Reconciler, mpsc::Receiver<DomainEvent>) {
    let (tx, rx) = mpsc::channel(256);
    let group = SubscriptionGroup::new(cameras.clone(), StreamConfig::default(), tx.clone()).unwrap();
    let monitor = LivenessMonitor::new(network.clone(), LivenessConfig::default(), tx.clone()).unwrap();
    (Reconciler::new(group, monitor, tx), rx)
}

fn drain(rx: &mut mpsc::Receiver<DomainEvent>) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn lifecycle(events: &[DomainEvent]) -> Vec<(EventKind, String)> {
    events
        .iter()
        .filter(|event| event.kind.is_lifecycle())
        .map(|event| (event.kind, event.device.to_string()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_roster_changes_emit_one_lifecycle_event_per_operation() {
    let cameras = FakeCameras::new();
    let network = FakeNetwork::new();
    let (mut reconciler, mut rx) = reconciler(&cameras, &network);

    let diff = reconciler
        .apply(vec![camera("porch", 2), camera("garage", 3)])
        .await;
    assert_eq!(diff.added.len(), 2);
    assert_eq!(
        lifecycle(&drain(&mut rx)),
        vec![
            (EventKind::Subscribed, "porch".to_string()),
            (EventKind::Subscribed, "garage".to_string()),
        ]
    );

    let diff = reconciler
        .apply(vec![
            camera("porch", 2).with_reconnect(30),
            camera("yard", 4),
        ])
        .await;
    assert_eq!(diff.len(), 3);
    assert_eq!(
        lifecycle(&drain(&mut rx)),
        vec![
            (EventKind::Unsubscribed, "garage".to_string()),
            (EventKind::Subscribed, "yard".to_string()),
            (EventKind::Updated, "porch".to_string()),
        ]
    );

    assert_eq!(reconciler.roster().len(), 2);
    assert!(reconciler.group().contains(&DeviceName::new("porch")));
    assert!(!reconciler.group().contains(&DeviceName::new("garage")));
    assert!(reconciler.monitor().contains(&DeviceName::new("yard")));
    assert!(!reconciler.monitor().contains(&DeviceName::new("garage")));
}

#[tokio::test(start_paused = true)]
async fn test_reapplying_the_same_roster_changes_nothing() {
    let cameras = FakeCameras::new();
    let network = FakeNetwork::new();
    let (mut reconciler, mut rx) = reconciler(&cameras, &network);

    let roster = vec![camera("porch", 2), camera("garage", 3)];
    reconciler.apply(roster.clone()).await;
    tokio::time::sleep(Duration::from_secs(6)).await;
    drain(&mut rx);
    let subscribes = cameras.subscribed().len();

    let diff = reconciler.apply(roster).await;
    settle().await;

    assert!(diff.is_empty());
    assert!(drain(&mut rx).is_empty());
    assert_eq!(cameras.subscribed().len(), subscribes);
}

#[tokio::test(start_paused = true)]
async fn test_updated_device_resubscribes_with_new_settings() {
    let cameras = FakeCameras::new();
    let network = FakeNetwork::new();
    let (mut reconciler, _rx) = reconciler(&cameras, &network);

    reconciler.apply(vec![camera("porch", 2)]).await;
    tokio::time::sleep(Duration::from_secs(6)).await;

    reconciler
        .apply(vec![camera("porch", 2).with_credentials("admin", "secret")])
        .await;
    tokio::time::sleep(Duration::from_secs(6)).await;

    let subscribed = cameras.subscribed();
    assert_eq!(subscribed.len(), 2);
    assert_eq!(subscribed[0].username, None);
    assert_eq!(subscribed[1].username.as_deref(), Some("admin"));
    assert_eq!(
        reconciler.group().state(&DeviceName::new("porch")),
        Some(SubscriptionState::Subscribed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_removed_device_produces_no_further_events() {
    let cameras = FakeCameras::new();
    let network = FakeNetwork::new();
    let (mut reconciler, mut rx) = reconciler(&cameras, &network);

    reconciler.apply(vec![camera("porch", 2)]).await;
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(cameras.push("porch", motion_at(true, Utc::now())));
    settle().await;
    assert!(drain(&mut rx)
        .iter()
        .any(|event| event.kind == EventKind::Motion));

    reconciler.apply(Vec::new()).await;
    assert_eq!(
        lifecycle(&drain(&mut rx)),
        vec![(EventKind::Unsubscribed, "porch".to_string())]
    );

    cameras.push("porch", motion_at(false, Utc::now()));
    network.set_down("10.0.0.2", true);
    tokio::time::sleep(Duration::from_secs(60 * 60 * 25)).await;

    assert!(drain(&mut rx).is_empty());
    assert_eq!(reconciler.counters(), HealthCounters::default());
}

#[tokio::test(start_paused = true)]
async fn test_counters_and_status() {
    let cameras = FakeCameras::new();
    let network = FakeNetwork::new();
    network.set_down("10.0.0.3", true);
    let (mut reconciler, mut rx) = reconciler(&cameras, &network);

    reconciler
        .apply(vec![camera("porch", 2), camera("garage", 3), camera("yard", 4)])
        .await;
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(
        reconciler.counters(),
        HealthCounters {
            total: 3,
            subscribed: 3,
            online: 2,
            offline: 1,
        }
    );

    let offline: Vec<DomainEvent> = drain(&mut rx)
        .into_iter()
        .filter(|event| event.kind == EventKind::Offline)
        .collect();
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0].device, DeviceName::new("garage"));

    let status = reconciler.status();
    assert_eq!(
        status.keys().map(|name| name.as_str()).collect::<Vec<_>>(),
        vec!["garage", "porch", "yard"]
    );
    let garage = status[&DeviceName::new("garage")];
    assert_eq!(garage.alive, Some(false));
    assert_eq!(garage.subscription, Some(SubscriptionState::Subscribed));
    assert_eq!(garage.last_transition, Some(offline[0].event_time));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_tears_everything_down_silently() {
    let cameras = FakeCameras::new();
    let network = FakeNetwork::new();
    let (mut reconciler, mut rx) = reconciler(&cameras, &network);

    reconciler
        .apply(vec![camera("porch", 2), camera("garage", 3)])
        .await;
    tokio::time::sleep(Duration::from_secs(6)).await;
    drain(&mut rx);

    reconciler.shutdown().await;

    assert!(reconciler.roster().is_empty());
    assert!(reconciler.group().is_empty());
    assert!(reconciler.monitor().is_empty());
    assert!(lifecycle(&drain(&mut rx)).is_empty());
}
