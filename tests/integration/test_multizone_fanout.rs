//! Integration Tests for Multizone Fan-out
//!
//! Zone selection commands, per-zone status and events, and failure handling.

#[path = "../test_utils/mod.rs"]
mod test_utils;

use linkseq::{ExecutorState, SequenceEvent, ZoneStatus};
use test_utils::{create_test_config, create_test_rig};

#[tokio::test]
async fn test_fan_out_selects_each_active_zone() {
    let rig = create_test_rig(&create_test_config());
    rig.runner.zones().try_set_zones(&[1, 3]).unwrap();

    let outcome = rig.runner.run("fill_all").await.unwrap();
    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(
        rig.link.sent(),
        vec!["G28", "multizone 0001", "fill", "multizone 0100", "fill"]
    );
    assert_eq!(outcome.commands_sent, 5);
    assert_eq!(rig.runner.zones().get_zone_status(1), Some(ZoneStatus::Completed));
    assert_eq!(rig.runner.zones().get_zone_status(2), Some(ZoneStatus::Inactive));
    assert_eq!(rig.runner.zones().get_zone_status(3), Some(ZoneStatus::Completed));
}

#[tokio::test]
async fn test_zones_from_config_are_selected() {
    let mut config = create_test_config();
    config.zones.active = vec![2, 4];
    let rig = create_test_rig(&config);

    assert_eq!(rig.runner.zones().get_active_zones(), vec![2, 4]);
    assert_eq!(rig.runner.zones().zone_mask_string(), "1010");
}

#[tokio::test]
async fn test_no_active_zones_fails_the_run() {
    let rig = create_test_rig(&create_test_config());

    let outcome = rig.runner.run("fill_all").await.unwrap();
    assert_eq!(outcome.state, ExecutorState::Failed);
    assert_eq!(rig.link.sent(), vec!["G28"]);
}

#[tokio::test]
async fn test_zone_error_stops_fan_out_and_marks_zone() {
    let rig = create_test_rig(&create_test_config());
    rig.runner.zones().try_set_zones(&[1, 2, 3]).unwrap();
    rig.link.reply_to("multizone 0010", &["ERROR zone 2 jammed"]);
    let mut events = rig.runner.events().subscribe();

    let outcome = rig.runner.run("fill_all").await.unwrap();
    assert_eq!(outcome.state, ExecutorState::Failed);
    assert!(outcome.message.contains("jammed"), "{}", outcome.message);
    assert_eq!(
        rig.link.sent(),
        vec!["G28", "multizone 0001", "fill", "multizone 0010"]
    );

    let zones = rig.runner.zones();
    assert_eq!(zones.get_zone_status(1), Some(ZoneStatus::Completed));
    let info = zones.get_zone_info(2).unwrap();
    assert_eq!(info.status, ZoneStatus::Error);
    assert!(info.error_message.unwrap_or_default().contains("jammed"));
    assert_eq!(zones.get_zone_status(3), Some(ZoneStatus::Active));
    // Statuses never change the selection
    assert_eq!(zones.get_active_zones(), vec![1, 2, 3]);

    let zone_updates: Vec<(u8, ZoneStatus)> = events
        .drain()
        .into_iter()
        .filter_map(|event| match event {
            SequenceEvent::ZoneStatusUpdated { zone, status } => Some((zone, status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        zone_updates,
        vec![
            (1, ZoneStatus::Executing),
            (1, ZoneStatus::Completed),
            (2, ZoneStatus::Executing),
            (2, ZoneStatus::Error),
        ]
    );
}

#[tokio::test]
async fn test_invalid_zone_selection_is_rejected() {
    let rig = create_test_rig(&create_test_config());
    assert!(rig.runner.zones().try_set_zones(&[0]).is_err());
    assert!(rig.runner.zones().try_set_zones(&[5]).is_err());
    assert!(rig.runner.zones().try_set_zones(&[]).is_err());
    assert!(rig.runner.zones().get_active_zones().is_empty());
}
