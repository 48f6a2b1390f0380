//! Unit Tests for the Zone Registry
//!
//! Selection rules, mask encoding and status bookkeeping.

use linkseq::zones::{
    mask_to_zones, selection_mask, zone_mask_string, zone_select_command, ZoneRegistry,
    ZoneStatus,
};

#[test]
fn test_mask_encoding() {
    assert_eq!(zone_mask_string(0b0001), "0001");
    assert_eq!(zone_mask_string(0b0101), "0101");
    assert_eq!(zone_select_command(1), "multizone 0001");
    assert_eq!(zone_select_command(4), "multizone 1000");
    assert_eq!(mask_to_zones(0b1010), vec![2, 4]);
    assert_eq!(selection_mask(&[3, 1]).unwrap(), 0b0101);
}

#[test]
fn test_selection_rules() {
    let registry = ZoneRegistry::new();
    assert!(registry.get_active_zones().is_empty());

    assert!(registry.set_zones(&[4, 2]));
    assert_eq!(registry.get_active_zones(), vec![2, 4]);
    assert_eq!(registry.get_zone_mask(), 0b1010);
    assert_eq!(
        registry.zone_mask_commands(),
        vec!["multizone 0010", "multizone 1000"]
    );

    // Refused selections leave the previous one in place
    assert!(!registry.set_zones(&[1, 1]));
    assert!(!registry.set_zones(&[0, 2]));
    assert!(!registry.set_zones(&[]));
    assert_eq!(registry.get_active_zones(), vec![2, 4]);
    assert!(registry.is_zone_active(2));
    assert!(!registry.is_zone_active(1));
    assert!(!registry.is_zone_active(9));
}

#[test]
fn test_statuses_follow_selection() {
    let registry = ZoneRegistry::new();
    registry.set_zones(&[1, 3]);
    assert_eq!(registry.get_zone_status(1), Some(ZoneStatus::Active));
    assert_eq!(registry.get_zone_status(2), Some(ZoneStatus::Inactive));
    assert_eq!(registry.get_zone_status(5), None);

    assert!(registry.mark_zone_error(3, "jammed"));
    let info = registry.get_zone_info(3).unwrap();
    assert_eq!(info.status, ZoneStatus::Error);
    assert_eq!(info.error_message.as_deref(), Some("jammed"));

    // Reselecting clears earlier errors
    registry.set_zones(&[3]);
    let info = registry.get_zone_info(3).unwrap();
    assert_eq!(info.status, ZoneStatus::Active);
    assert!(info.error_message.is_none());
    assert_eq!(registry.get_zone_status(1), Some(ZoneStatus::Inactive));
}

#[test]
fn test_reset_and_unknown_zones() {
    let registry = ZoneRegistry::new();
    registry.set_zones(&[1, 2, 3, 4]);
    assert!(registry.set_zone_status(2, ZoneStatus::Completed));
    assert!(!registry.set_zone_status(7, ZoneStatus::Completed));
    assert!(!registry.mark_zone_error(0, "nope"));

    registry.reset_zones();
    assert!(registry.get_active_zones().is_empty());
    assert!(registry
        .get_all_zones()
        .iter()
        .all(|info| info.status == ZoneStatus::Inactive));
    assert_eq!(registry.get_all_zones().len(), 4);
}
