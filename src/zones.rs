//! Zone Registry
//!
//! Tracks the four addressable zones of the device, their statuses, and the
//! bitmask used to select them on the wire.
//!
//! Zone `n` maps to bit `n - 1` of the mask. The wire form is the mask rendered
//! as a 4-digit binary number, so zone 1 alone is `"0001"` and zone 3 alone is
//! `"0100"`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Lowest zone id
pub const MIN_ZONE: u8 = 1;
/// Highest zone id
pub const MAX_ZONE: u8 = 4;

/// Wire command prefix for selecting zones
pub const ZONE_SELECT_COMMAND: &str = "multizone";

/// Status of a single zone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    #[default]
    Inactive,
    Active,
    Executing,
    Completed,
    Error,
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ZoneStatus::Inactive => "inactive",
            ZoneStatus::Active => "active",
            ZoneStatus::Executing => "executing",
            ZoneStatus::Completed => "completed",
            ZoneStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// Snapshot of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub zone_id: u8,
    pub status: ZoneStatus,
    pub error_message: Option<String>,
}

impl ZoneInfo {
    fn new(zone_id: u8) -> Self {
        Self {
            zone_id,
            status: ZoneStatus::Inactive,
            error_message: None,
        }
    }
}

/// Bit for a zone id (zone 1 is bit 0); zero outside the zone range
pub fn zone_bit(zone: u8) -> u8 {
    if is_valid_zone(zone) {
        1 << (zone - 1)
    } else {
        0
    }
}

/// Render a mask as the 4-digit binary wire string
pub fn zone_mask_string(mask: u8) -> String {
    format!("{:04b}", mask & 0x0F)
}

/// Zone ids set in a mask, ascending
pub fn mask_to_zones(mask: u8) -> Vec<u8> {
    (MIN_ZONE..=MAX_ZONE)
        .filter(|zone| mask & zone_bit(*zone) != 0)
        .collect()
}

/// Wire command selecting a single zone
pub fn zone_select_command(zone: u8) -> String {
    format!("{} {}", ZONE_SELECT_COMMAND, zone_mask_string(zone_bit(zone)))
}

fn is_valid_zone(zone: u8) -> bool {
    (MIN_ZONE..=MAX_ZONE).contains(&zone)
}

/// Mask for a zone selection, rejecting empty, out-of-range or duplicate lists
pub fn selection_mask(zones: &[u8]) -> Result<u8> {
    if zones.is_empty() {
        return Err(Error::InvalidZoneSelection {
            reason: "no zones given".to_string(),
        });
    }
    let mut mask = 0u8;
    for zone in zones {
        if !is_valid_zone(*zone) {
            return Err(Error::InvalidZoneSelection {
                reason: format!("zone {} is outside {}..={}", zone, MIN_ZONE, MAX_ZONE),
            });
        }
        if mask & zone_bit(*zone) != 0 {
            return Err(Error::InvalidZoneSelection {
                reason: format!("zone {} listed more than once", zone),
            });
        }
        mask |= zone_bit(*zone);
    }
    Ok(mask)
}

#[derive(Debug)]
struct ZoneTable {
    zones: Vec<ZoneInfo>,
    /// Selection made by the last successful `set_zones`
    selected: u8,
}

impl ZoneTable {
    fn zone_mut(&mut self, zone: u8) -> Option<&mut ZoneInfo> {
        self.zones.iter_mut().find(|info| info.zone_id == zone)
    }
}

/// Thread-safe registry of zone statuses
#[derive(Debug)]
pub struct ZoneRegistry {
    table: Mutex<ZoneTable>,
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneRegistry {
    /// Create a registry with every zone inactive
    pub fn new() -> Self {
        Self {
            table: Mutex::new(ZoneTable {
                zones: (MIN_ZONE..=MAX_ZONE).map(ZoneInfo::new).collect(),
                selected: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ZoneTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Select the active zones, reporting why a selection was refused
    ///
    /// On success the listed zones become `Active` and all others `Inactive`;
    /// previous `Completed`/`Error` marks and messages are cleared. On failure
    /// nothing changes.
    pub fn try_set_zones(&self, zones: &[u8]) -> Result<()> {
        let mask = selection_mask(zones)?;

        let mut guard = self.lock();
        guard.selected = mask;
        for info in guard.zones.iter_mut() {
            info.status = if mask & zone_bit(info.zone_id) != 0 {
                ZoneStatus::Active
            } else {
                ZoneStatus::Inactive
            };
            info.error_message = None;
        }
        info!("Active zones set to {:?} (mask {})", mask_to_zones(mask), zone_mask_string(mask));
        Ok(())
    }

    /// Select the active zones; `false` leaves the registry untouched
    pub fn set_zones(&self, zones: &[u8]) -> bool {
        match self.try_set_zones(zones) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Zones currently selected, ascending
    ///
    /// Selection is independent of status: a zone stays selected while it runs
    /// and after it completes or fails.
    pub fn get_active_zones(&self) -> Vec<u8> {
        mask_to_zones(self.lock().selected)
    }

    pub fn is_zone_active(&self, zone: u8) -> bool {
        is_valid_zone(zone) && self.lock().selected & zone_bit(zone) != 0
    }

    /// OR of `1 << (zone - 1)` over the active zones
    pub fn get_zone_mask(&self) -> u8 {
        self.lock().selected
    }

    /// Wire string of the current mask
    pub fn zone_mask_string(&self) -> String {
        zone_mask_string(self.get_zone_mask())
    }

    /// One select command per active zone, ascending
    pub fn zone_mask_commands(&self) -> Vec<String> {
        self.get_active_zones()
            .into_iter()
            .map(zone_select_command)
            .collect()
    }

    pub fn get_zone_status(&self, zone: u8) -> Option<ZoneStatus> {
        if !is_valid_zone(zone) {
            return None;
        }
        self.lock()
            .zones
            .iter()
            .find(|info| info.zone_id == zone)
            .map(|info| info.status)
    }

    pub fn get_zone_info(&self, zone: u8) -> Option<ZoneInfo> {
        if !is_valid_zone(zone) {
            return None;
        }
        self.lock()
            .zones
            .iter()
            .find(|info| info.zone_id == zone)
            .cloned()
    }

    /// All zones, ascending
    pub fn get_all_zones(&self) -> Vec<ZoneInfo> {
        self.lock().zones.clone()
    }

    /// Set a zone's status; returns `false` for an unknown zone
    pub fn set_zone_status(&self, zone: u8, status: ZoneStatus) -> bool {
        let mut guard = self.lock();
        match guard.zone_mut(zone) {
            Some(info) => {
                debug!("Zone {} status {} -> {}", zone, info.status, status);
                info.status = status;
                if status != ZoneStatus::Error {
                    info.error_message = None;
                }
                true
            }
            None => false,
        }
    }

    /// Mark a zone as failed with a message
    pub fn mark_zone_error(&self, zone: u8, message: impl Into<String>) -> bool {
        let mut guard = self.lock();
        match guard.zone_mut(zone) {
            Some(info) => {
                info.status = ZoneStatus::Error;
                info.error_message = Some(message.into());
                true
            }
            None => false,
        }
    }

    /// Return every zone to `Inactive` and drop the selection
    pub fn reset_zones(&self) {
        let mut guard = self.lock();
        guard.selected = 0;
        for info in guard.zones.iter_mut() {
            info.status = ZoneStatus::Inactive;
            info.error_message = None;
        }
        debug!("All zones reset");
    }
}
