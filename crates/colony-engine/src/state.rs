//! The per-player record: ledger, buildings, fleet, techs and pending upgrades.
//!
//! One `ColonyState` is persisted as a single versioned unit, so a resource
//! deduction and the construction timer it pays for are always written
//! together.

use crate::ledger::ResourceLedger;
use chrono::{DateTime, Utc};
use colony_core::{
    BuildingTypeId, Catalog, PlayerBuildingId, PlayerId, ResourceBundle, ShipTypeId, TechTypeId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A building owned by a player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerBuilding {
    pub id: PlayerBuildingId,
    pub building_type_id: BuildingTypeId,
    /// Completed level; stays at the pre-upgrade value while a timer runs.
    pub level: u32,
    pub construction_ends_at: Option<DateTime<Utc>>,
}

/// Observable construction state of a building at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildingPhase {
    Idle,
    Upgrading {
        target_level: u32,
        ends_at: DateTime<Utc>,
    },
}

impl PlayerBuilding {
    /// True while a construction timer is recorded.
    pub fn is_upgrading(&self) -> bool {
        self.construction_ends_at.is_some()
    }

    /// `Idle` once the timer has elapsed, even before the engine applies it.
    pub fn phase(&self, now: DateTime<Utc>) -> BuildingPhase {
        match self.construction_ends_at {
            Some(ends_at) if ends_at > now => BuildingPhase::Upgrading {
                target_level: self.level + 1,
                ends_at,
            },
            _ => BuildingPhase::Idle,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlayerShip {
    pub ship_type_id: ShipTypeId,
    pub quantity: u64,
}

/// An upgrade waiting for its turn. It pays when it is promoted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeQueueEntry {
    pub building_id: PlayerBuildingId,
    pub target_level: u32,
    pub requested_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColonyState {
    pub player_id: PlayerId,
    /// Version read from the store; 0 for a colony not yet persisted.
    pub version: u64,
    pub ledger: ResourceLedger,
    pub buildings: Vec<PlayerBuilding>,
    #[serde(default)]
    pub ships: Vec<PlayerShip>,
    #[serde(default)]
    pub techs: BTreeSet<TechTypeId>,
    /// Pending upgrades in request order.
    #[serde(default)]
    pub queue: Vec<UpgradeQueueEntry>,
    next_building_id: u64,
}

impl ColonyState {
    pub fn new(player_id: PlayerId, starting: ResourceBundle, now: DateTime<Utc>) -> Self {
        Self {
            player_id,
            version: 0,
            ledger: ResourceLedger::new(starting, now),
            buildings: Vec::new(),
            ships: Vec::new(),
            techs: BTreeSet::new(),
            queue: Vec::new(),
            next_building_id: 1,
        }
    }

    pub fn building(&self, id: PlayerBuildingId) -> Option<&PlayerBuilding> {
        self.buildings.iter().find(|b| b.id == id)
    }

    pub fn building_mut(&mut self, id: PlayerBuildingId) -> Option<&mut PlayerBuilding> {
        self.buildings.iter_mut().find(|b| b.id == id)
    }

    pub fn building_of_type(&self, type_id: BuildingTypeId) -> Option<&PlayerBuilding> {
        self.buildings.iter().find(|b| b.building_type_id == type_id)
    }

    /// Add a level-0 building of `type_id` and return its id.
    pub fn insert_building(&mut self, type_id: BuildingTypeId) -> PlayerBuildingId {
        let id = PlayerBuildingId(self.next_building_id);
        self.next_building_id += 1;
        self.buildings.push(PlayerBuilding {
            id,
            building_type_id: type_id,
            level: 0,
            construction_ends_at: None,
        });
        id
    }

    /// Completed level of the building named `name`, 0 when absent.
    pub fn level_by_name(&self, catalog: &Catalog, name: &str) -> u32 {
        catalog
            .building_by_name(name)
            .and_then(|def| self.building_of_type(def.id))
            .map(|b| b.level)
            .unwrap_or(0)
    }

    pub fn upgrading(&self) -> impl Iterator<Item = &PlayerBuilding> + '_ {
        self.buildings.iter().filter(|b| b.is_upgrading())
    }

    /// Earliest recorded construction end.
    pub fn next_completion(&self) -> Option<DateTime<Utc>> {
        self.buildings
            .iter()
            .filter_map(|b| b.construction_ends_at)
            .min()
    }

    pub fn ship_quantity(&self, ship_type_id: ShipTypeId) -> u64 {
        self.ships
            .iter()
            .find(|s| s.ship_type_id == ship_type_id)
            .map(|s| s.quantity)
            .unwrap_or(0)
    }

    /// Upsert by ship type; returns the new total.
    pub fn add_ships(&mut self, ship_type_id: ShipTypeId, quantity: u64) -> u64 {
        match self.ships.iter_mut().find(|s| s.ship_type_id == ship_type_id) {
            Some(s) => {
                s.quantity = s.quantity.saturating_add(quantity);
                s.quantity
            }
            None => {
                self.ships.push(PlayerShip {
                    ship_type_id,
                    quantity,
                });
                quantity
            }
        }
    }

    /// Pending entries for one building.
    pub fn queued_for(&self, id: PlayerBuildingId) -> usize {
        self.queue.iter().filter(|e| e.building_id == id).count()
    }
}
