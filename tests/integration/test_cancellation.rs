//! Integration Tests for Cancellation
//!
//! A cancelled run must stop within one poll interval, whether it is sleeping
//! in a `wait`, waiting for the device to answer, or fanning out over zones.
//! Only one run is ever active, even while another caller awaits it.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use linkseq::{ExecutorState, SequenceEvent, ZoneStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use test_utils::{create_test_config, create_test_rig, fast_config};

#[tokio::test]
async fn test_cancel_interrupts_long_wait_promptly() {
    let rig = create_test_rig(&create_test_config());
    let mut events = rig.runner.events().subscribe();

    rig.runner.start("long_wait").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rig.runner.is_running());

    let cancelled_at = Instant::now();
    assert!(rig.runner.cancel());
    let outcome = rig.runner.wait().await.unwrap();

    assert!(cancelled_at.elapsed() <= Duration::from_millis(150));
    assert_eq!(outcome.state, ExecutorState::Cancelled);
    assert!(outcome.is_cancelled());
    assert!(!outcome.success);
    assert_eq!(outcome.message, "Execution interrupted");

    let finished = events.drain().into_iter().find_map(|event| match event {
        SequenceEvent::SequenceFinished { success, message, .. } => Some((success, message)),
        _ => None,
    });
    assert_eq!(finished, Some((false, "Execution interrupted".to_string())));
}

#[tokio::test]
async fn test_cancel_interrupts_pending_command() {
    let mut config = fast_config();
    config.execution.command_timeout_ms = 10_000;
    config
        .sequences
        .insert("stuck".to_string(), vec!["home".to_string(), "after".to_string()]);
    let rig = create_test_rig(&config);
    rig.link.reply_to("home", &["RECEIVED"]);

    rig.runner.start("stuck").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled_at = Instant::now();
    rig.runner.cancel();
    let outcome = rig.runner.wait().await.unwrap();

    assert!(cancelled_at.elapsed() <= Duration::from_millis(150));
    assert!(outcome.is_cancelled());
    assert_eq!(rig.link.sent(), vec!["home"]);
}

#[tokio::test]
async fn test_cancel_without_run_is_noop() {
    let rig = create_test_rig(&create_test_config());
    assert!(!rig.runner.cancel());
    assert!(rig.runner.wait().await.is_none());
    assert!(!rig.runner.is_running());
}

#[tokio::test]
async fn test_new_start_replaces_running_sequence() {
    let rig = create_test_rig(&create_test_config());
    let mut events = rig.runner.events().subscribe();

    let first = rig.runner.start("long_wait").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = rig.runner.start("warmup").await.unwrap();
    assert_ne!(first, second);

    let outcome = rig.runner.wait().await.unwrap();
    assert_eq!(outcome.run_id, second);
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(rig.link.sent(), vec!["G28", "M104 S200"]);

    let finished: Vec<_> = events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            SequenceEvent::SequenceFinished { run_id, success, .. } => Some((run_id, success)),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![(first, false), (second, true)]);
    assert!(!rig.router.is_attached());
}

#[tokio::test]
async fn test_start_while_awaited_cancels_and_joins_previous_run() {
    let rig = create_test_rig(&create_test_config());
    let first = rig.runner.start("long_wait").await.unwrap();

    let waiter = {
        let runner = Arc::clone(&rig.runner);
        tokio::spawn(async move { runner.wait().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rig.runner.is_running());

    let replaced_at = Instant::now();
    let second = rig.runner.start("warmup").await.unwrap();
    // The previous run was cancelled and joined, not left sleeping
    assert!(replaced_at.elapsed() <= Duration::from_millis(150));

    let first_outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter finishes with the first run")
        .unwrap()
        .unwrap();
    assert_eq!(first_outcome.run_id, first);
    assert!(first_outcome.is_cancelled());

    let second_outcome = rig.runner.wait().await.unwrap();
    assert_eq!(second_outcome.run_id, second);
    assert!(second_outcome.success, "{}", second_outcome.message);
    assert_eq!(rig.link.sent(), vec!["G28", "M104 S200"]);
    assert!(!rig.runner.is_running());
}

#[tokio::test]
async fn test_run_reports_its_own_outcome() {
    let rig = create_test_rig(&create_test_config());
    let outcome = rig.runner.run("warmup").await.unwrap();
    assert!(outcome.success);

    // A finished run can still be awaited and is no longer cancellable
    assert_eq!(rig.runner.wait().await.map(|o| o.run_id), Some(outcome.run_id));
    assert!(!rig.runner.cancel());
    assert!(!rig.runner.is_running());
}

#[tokio::test]
async fn test_cancel_during_fan_out_sends_nothing_more() {
    let rig = create_test_rig(&create_test_config());
    rig.runner.zones().try_set_zones(&[1, 2]).unwrap();
    let mut events = rig.runner.events().subscribe();

    let runner = Arc::downgrade(&rig.runner);
    rig.link.on_send(move |command| {
        if command == "fill" {
            if let Some(runner) = runner.upgrade() {
                runner.cancel();
            }
        }
    });

    let outcome = rig.runner.run("fill_all").await.unwrap();
    assert!(outcome.is_cancelled(), "{}", outcome.message);
    assert_eq!(rig.link.sent(), vec!["G28", "multizone 0001", "fill"]);

    // Interrupted zones are not failed zones
    let zones = rig.runner.zones();
    assert_eq!(zones.get_zone_status(1), Some(ZoneStatus::Active));
    assert_eq!(zones.get_zone_info(1).unwrap().error_message, None);
    assert_eq!(zones.get_zone_status(2), Some(ZoneStatus::Active));
    assert!(!events.drain().iter().any(|event| matches!(
        event,
        SequenceEvent::ZoneStatusUpdated {
            status: ZoneStatus::Error,
            ..
        }
    )));
}

#[tokio::test]
async fn test_cancel_while_selecting_zone_restores_status() {
    let mut config = fast_config();
    config.execution.zone_select_timeout_ms = 10_000;
    config
        .sequences
        .insert("fan".to_string(), vec!["og_multizone-fill".to_string()]);
    let rig = create_test_rig(&config);
    rig.runner.zones().try_set_zones(&[3]).unwrap();
    rig.link.reply_to("multizone 0100", &["RECEIVED"]);

    rig.runner.start("fan").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        rig.runner.zones().get_zone_status(3),
        Some(ZoneStatus::Executing)
    );
    rig.runner.cancel();
    let outcome = rig.runner.wait().await.unwrap();

    assert!(outcome.is_cancelled());
    assert_eq!(rig.link.sent(), vec!["multizone 0100"]);
    assert_eq!(rig.runner.zones().get_zone_status(3), Some(ZoneStatus::Active));
}
