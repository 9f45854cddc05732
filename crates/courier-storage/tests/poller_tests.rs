// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the external-change poller.

use std::sync::Arc;
use std::time::Duration;

use courier_core::traits::HookEvent;
use courier_core::types::{ActorId, Status};
use courier_storage::{ChangePoller, FsStore, ThreadStore};
use courier_test_utils::fixtures::{create_request, status_append};
use courier_test_utils::{init_test_logging, RecordingHooks};
use tokio::sync::watch;

fn store_at(root: &std::path::Path) -> Arc<ThreadStore> {
    init_test_logging();
    Arc::new(ThreadStore::new(
        Arc::new(FsStore::new(root)),
        Arc::new(RecordingHooks::new()),
        ActorId("courier".into()),
    ))
}

#[tokio::test]
async fn first_tick_primes_without_reporting() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_at(temp.path());
    store
        .create(create_request("agent-home", "check garage door"))
        .await
        .unwrap();

    let hooks = Arc::new(RecordingHooks::new());
    let mut poller = ChangePoller::new(store, hooks.clone(), Duration::from_secs(30));
    assert!(poller.tick().await.unwrap().is_empty());
    assert!(hooks.events().await.is_empty());
}

#[tokio::test]
async fn out_of_process_change_is_reported_once() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_at(temp.path());
    let (thread_ref, _) = store
        .create(create_request("agent-home", "check garage door"))
        .await
        .unwrap();

    let hooks = Arc::new(RecordingHooks::new());
    let mut poller = ChangePoller::new(store, hooks.clone(), Duration::from_secs(30));
    poller.tick().await.unwrap();

    // Another process claims the thread behind our back.
    let other = store_at(temp.path());
    other
        .append(
            thread_ref.as_str(),
            &ActorId("teague-phone".into()),
            status_append(Status::Claimed),
        )
        .await
        .unwrap();

    let changed = poller.tick().await.unwrap();
    assert_eq!(changed, vec![thread_ref.clone()]);
    let events = hooks.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].1,
        HookEvent::ExternalChange {
            previous: Some(Status::Pending)
        }
    );

    // Quiescent state reports nothing further.
    assert!(poller.tick().await.unwrap().is_empty());
    assert!(hooks.events().await.len() == 1);
}

#[tokio::test]
async fn run_stops_on_shutdown_signal() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_at(temp.path());
    let poller = ChangePoller::new(
        store,
        Arc::new(RecordingHooks::new()),
        Duration::from_millis(5),
    );

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(poller.run(rx));
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send(true).unwrap();
    handle.await.unwrap();
}
