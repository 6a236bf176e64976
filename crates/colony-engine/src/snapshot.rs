//! Read model handed to the presentation layer.

use crate::construction::ConstructionEngine;
use crate::error::EngineError;
use crate::state::{BuildingPhase, ColonyState};
use chrono::{DateTime, Utc};
use colony_core::{
    BuildingTypeId, PlayerBuildingId, PlayerId, ResourceBundle, ResourceKind, ShipTypeId,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BuildingView {
    pub id: PlayerBuildingId,
    pub building_type_id: BuildingTypeId,
    pub name: String,
    pub level: u32,
    pub upgrading_to: Option<u32>,
    pub construction_ends_at: Option<DateTime<Utc>>,
    pub seconds_remaining: Option<i64>,
    /// `None` at max level.
    pub next_cost: Option<ResourceBundle>,
    pub can_afford: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueView {
    pub building_id: PlayerBuildingId,
    pub name: String,
    pub target_level: u32,
    pub position: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShipView {
    pub ship_type_id: ShipTypeId,
    pub name: String,
    pub quantity: u64,
}

/// Balances, rates, construction and queue state as of one instant.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub player_id: PlayerId,
    pub version: u64,
    pub as_of: DateTime<Utc>,
    pub balances: ResourceBundle,
    pub hourly_rates: BTreeMap<ResourceKind, Decimal>,
    pub storage: BTreeMap<ResourceKind, Decimal>,
    pub power_generation: Decimal,
    pub power_consumption: Decimal,
    pub buildings: Vec<BuildingView>,
    pub queue: Vec<QueueView>,
    pub queue_depth: usize,
    pub ships: Vec<ShipView>,
    pub techs: Vec<String>,
}

impl ConstructionEngine {
    /// Describe `state` without changing it. Call [`ConstructionEngine::advance`]
    /// first for up-to-date figures.
    pub fn snapshot(
        &self,
        state: &ColonyState,
        now: DateTime<Utc>,
    ) -> Result<Snapshot, EngineError> {
        let summary = self.production(state)?;
        let balances = state.ledger.balances();
        let buildings = state
            .buildings
            .iter()
            .map(|b| {
                let def = self.catalog().building(b.building_type_id);
                let next_cost = def.and_then(|d| self.next_cost(d, b.level).ok().flatten());
                let can_afford = next_cost.as_ref().is_some_and(|c| balances.covers(c));
                let (upgrading_to, seconds_remaining) = match b.phase(now) {
                    BuildingPhase::Upgrading {
                        target_level,
                        ends_at,
                    } => (Some(target_level), Some((ends_at - now).num_seconds())),
                    BuildingPhase::Idle => (None, None),
                };
                BuildingView {
                    id: b.id,
                    building_type_id: b.building_type_id,
                    name: self.type_name(b.building_type_id),
                    level: b.level,
                    upgrading_to,
                    construction_ends_at: b.construction_ends_at,
                    seconds_remaining,
                    next_cost,
                    can_afford,
                }
            })
            .collect();
        let queue = state
            .queue
            .iter()
            .enumerate()
            .map(|(i, e)| QueueView {
                building_id: e.building_id,
                name: state
                    .building(e.building_id)
                    .map(|b| self.type_name(b.building_type_id))
                    .unwrap_or_default(),
                target_level: e.target_level,
                position: i + 1,
            })
            .collect();
        let ships = state
            .ships
            .iter()
            .map(|s| ShipView {
                ship_type_id: s.ship_type_id,
                name: self
                    .catalog()
                    .ship(s.ship_type_id)
                    .map(|d| d.name.clone())
                    .unwrap_or_default(),
                quantity: s.quantity,
            })
            .collect();
        let techs = state
            .techs
            .iter()
            .filter_map(|id| self.catalog().tech(*id).map(|t| t.name.clone()))
            .collect();

        Ok(Snapshot {
            player_id: state.player_id.clone(),
            version: state.version,
            as_of: now,
            balances: balances.clone(),
            hourly_rates: summary.rates,
            storage: summary.storage,
            power_generation: summary.power_generation,
            power_consumption: summary.power_consumption,
            buildings,
            queue,
            queue_depth: self.queue_depth(state),
            ships,
            techs,
        })
    }
}
