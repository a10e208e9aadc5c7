//! Contract Test: Drift Monitoring
//!
//! Constraints verified:
//! - One poll cycle removes every live address outside the allow-set
//! - Allowed addresses are never removed, however many cycles run
//! - Preference state of allowed addresses is not touched
//! - A failed listing skips the cycle and the next cycle recovers
//! - A failed deletion does not stop other deletions
//! - The polling loop runs on its interval and stops on cancellation

mod common;

use common::*;
use ipsix_core::{
    AddressCommandExecutor, AddressOperation, AddressState, DriftMonitor, EngineConfig,
    EngineEvent, EventSink, InterfaceDeclaration, MonitorSet, PollOutcome, Reconciler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const INTERVAL: Duration = Duration::from_secs(10);

fn monitor(executor: &RecordingExecutor, decl: InterfaceDeclaration) -> DriftMonitor {
    DriftMonitor::new(decl, Arc::new(executor.clone()), INTERVAL)
}

async fn reconciled(executor: &RecordingExecutor) {
    Reconciler::new(Arc::new(executor.clone()), &EngineConfig::default())
        .reconcile(&example_declaration())
        .await;
}

#[tokio::test]
async fn stray_address_removed_in_one_cycle() {
    let executor = RecordingExecutor::new();
    reconciled(&executor).await;
    executor.table().inject("eth0", "fd00::9/64").await.unwrap();

    let outcome = monitor(&executor, example_declaration()).poll_once().await;

    match outcome {
        PollOutcome::Completed { removed, failed, retained } => {
            assert_eq!(removed.len(), 1);
            assert_eq!(removed[0].to_string(), "fd00::9/64");
            assert!(failed.is_empty());
            assert_eq!(retained, 2);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(live(executor.table(), "eth0").await, vec!["fd00::1/64", "fd00::2/64"]);
}

#[tokio::test]
async fn allowed_addresses_survive_many_cycles() {
    let executor = RecordingExecutor::new();
    reconciled(&executor).await;
    let monitor = monitor(&executor, example_declaration());

    for _ in 0..20 {
        monitor.poll_once().await;
    }

    assert_eq!(executor.calls(AddressOperation::Delete), 0);
    assert_eq!(live(executor.table(), "eth0").await, vec!["fd00::1/64", "fd00::2/64"]);
    // Preference is the reconciler's business
    assert_eq!(executor.table().state("eth0", "fd00::2").await, AddressState::Deprecated);
    assert_eq!(executor.calls(AddressOperation::Prefer), 1);
}

#[tokio::test]
async fn allow_set_ignores_notation_and_prefix() {
    let executor = RecordingExecutor::new();
    executor.table().inject("eth0", "fd00:0:0:0::1/48").await.unwrap();
    let decl = InterfaceDeclaration::new("eth0").with_addresses(["FD00::1"]);

    monitor(&executor, decl).poll_once().await;

    assert_eq!(executor.table().state("eth0", "fd00::1").await, AddressState::Preferred);
}

#[tokio::test]
async fn link_local_addresses_are_not_managed() {
    let executor = RecordingExecutor::new();
    executor.table().inject("eth0", "fe80::1234/64").await.unwrap();

    monitor(&executor, example_declaration()).poll_once().await;

    assert_eq!(executor.calls(AddressOperation::Delete), 0);
    assert_eq!(executor.table().state("eth0", "fe80::1234").await, AddressState::Preferred);
}

#[tokio::test]
async fn listing_failure_skips_cycle() {
    let executor = RecordingExecutor::new();
    executor.table().inject("eth0", "fd00::9/64").await.unwrap();
    executor.fail_next_lists(1);
    let monitor = monitor(&executor, example_declaration());

    let first = monitor.poll_once().await;
    assert!(matches!(first, PollOutcome::Skipped { .. }));
    assert_eq!(executor.calls(AddressOperation::Delete), 0);

    let second = monitor.poll_once().await;
    assert!(matches!(second, PollOutcome::Completed { .. }));
    assert_eq!(executor.table().state("eth0", "fd00::9").await, AddressState::Absent);
}

#[tokio::test]
async fn failed_deletion_does_not_block_others() {
    let executor = RecordingExecutor::new();
    for addr in ["fd00::7/64", "fd00::8/64", "fd00::9/64"] {
        executor.table().inject("eth0", addr).await.unwrap();
    }
    executor.fail(AddressOperation::Delete, "fd00::7");

    let outcome = monitor(&executor, example_declaration()).poll_once().await;

    let PollOutcome::Completed { removed, failed, .. } = outcome else {
        panic!("cycle should complete");
    };
    assert_eq!(removed.len(), 2);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].operation, AddressOperation::Delete);
    assert_eq!(live(executor.table(), "eth0").await, vec!["fd00::7/64"]);
}

#[tokio::test]
async fn removal_events_are_emitted() {
    let executor = RecordingExecutor::new();
    executor.table().inject("eth0", "fd00::9/64").await.unwrap();
    let (events, rx) = EventSink::channel(16);

    monitor(&executor, example_declaration())
        .with_events(events)
        .poll_once()
        .await;

    let mut stream = ReceiverStream::new(rx);
    match stream.next().await {
        Some(EngineEvent::AddressRemoved { interface, address }) => {
            assert_eq!(interface, "eth0");
            assert_eq!(address.to_string(), "fd00::9/64");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn polling_loop_corrects_drift_and_stops_on_cancel() {
    let executor = RecordingExecutor::new();
    reconciled(&executor).await;

    let shutdown = CancellationToken::new();
    let mut monitors = MonitorSet::new();
    assert!(monitors.spawn(monitor(&executor, example_declaration()), &shutdown));

    executor.table().inject("eth0", "fd00::9/64").await.unwrap();

    // Nothing happens before the first interval elapses
    tokio::time::sleep(INTERVAL / 2).await;
    assert_eq!(executor.calls(AddressOperation::List), 0);
    assert_eq!(executor.table().state("eth0", "fd00::9").await, AddressState::Preferred);

    tokio::time::sleep(INTERVAL).await;
    assert_eq!(executor.calls(AddressOperation::List), 1);
    assert_eq!(executor.table().state("eth0", "fd00::9").await, AddressState::Absent);

    // A later stray is caught by a later cycle
    executor.table().inject("eth0", "fd00::a/64").await.unwrap();
    tokio::time::sleep(INTERVAL).await;
    assert_eq!(executor.table().state("eth0", "fd00::a").await, AddressState::Absent);

    let exits = monitors.shutdown().await;
    assert_eq!(exits.len(), 1);
    assert!(exits[0].cancelled);

    let lists = executor.calls(AddressOperation::List);
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(executor.calls(AddressOperation::List), lists, "no polling after shutdown");
}

#[tokio::test(start_paused = true)]
async fn single_monitor_can_be_stopped() {
    let executor = RecordingExecutor::new();
    let shutdown = CancellationToken::new();
    let mut monitors = MonitorSet::new();

    monitors.spawn(monitor(&executor, example_declaration()), &shutdown);
    monitors.spawn(
        monitor(&executor, InterfaceDeclaration::new("eth1").with_monitor(true)),
        &shutdown,
    );
    assert_eq!(monitors.len(), 2);

    assert!(monitors.stop("eth1"));
    let exit = monitors.next_exit().await.expect("one monitor exits");
    assert_eq!(exit.interface, "eth1");
    assert!(exit.cancelled);
    assert_eq!(monitors.interfaces(), vec!["eth0".to_string()]);
    assert!(!shutdown.is_cancelled());

    assert!(!monitors.stop("eth9"));
    monitors.shutdown().await;
}

#[tokio::test]
async fn duplicate_monitor_is_refused() {
    let executor = RecordingExecutor::new();
    let shutdown = CancellationToken::new();
    let mut monitors = MonitorSet::new();

    assert!(monitors.spawn(monitor(&executor, example_declaration()), &shutdown));
    assert!(!monitors.spawn(monitor(&executor, example_declaration()), &shutdown));
    assert_eq!(monitors.len(), 1);

    shutdown.cancel();
    let exit = monitors.next_exit().await.unwrap();
    assert!(exit.cancelled);
    assert!(monitors.next_exit().await.is_none());
}

#[tokio::test]
async fn executor_is_shared_across_monitors() {
    let executor: Arc<dyn AddressCommandExecutor> = Arc::new(RecordingExecutor::new());
    let a = DriftMonitor::new(example_declaration(), Arc::clone(&executor), INTERVAL);
    let b = DriftMonitor::new(InterfaceDeclaration::new("eth1"), Arc::clone(&executor), INTERVAL);

    assert!(matches!(a.poll_once().await, PollOutcome::Completed { .. }));
    assert!(matches!(b.poll_once().await, PollOutcome::Completed { .. }));
}
